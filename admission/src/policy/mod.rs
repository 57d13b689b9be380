// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Policy documents, in the shape of their Kubernetes custom resources.

use std::str::FromStr;

use attestlib::{KeyType, PublicKey, SignatureAlgorithm};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub mod loader;

pub use loader::{load_policy, parse_policy};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// A trusted signer identity.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationAuthority {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: AttestationAuthoritySpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttestationAuthoritySpec {
    /// `projects/<project>/notes/<note>` under which attestations are stored.
    pub note_reference: String,
    #[serde(default)]
    pub public_keys: Vec<PublicKeySpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeySpec {
    /// `PGP`, `PKIX` or `JWT`.
    pub key_type: String,
    #[serde(default)]
    pub key_id: String,
    /// Base64 encoding of an ASCII-armored keyring, for PGP keys.
    #[serde(default)]
    pub ascii_armored_pgp_public_key: String,
    #[serde(default)]
    pub pkix_public_key: Option<PkixPublicKeySpec>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PkixPublicKeySpec {
    pub public_key_pem: String,
    #[serde(default)]
    pub signature_algorithm: String,
}

impl AttestationAuthority {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Converts the declared keys into verifier keys. Any malformed key
    /// fails the whole authority.
    pub fn public_keys(&self) -> Result<Vec<PublicKey>> {
        self.spec
            .public_keys
            .iter()
            .map(|spec| self.convert_key(spec))
            .collect()
    }

    fn convert_key(&self, spec: &PublicKeySpec) -> Result<PublicKey> {
        let invalid = |reason: String| Error::InvalidAuthorityKey {
            authority: self.name().to_string(),
            reason,
        };

        let key_type = KeyType::from_str(&spec.key_type)
            .map_err(|_| invalid(format!("unsupported key type {:?}", spec.key_type)))?;

        let (signature_algorithm, key_data) = match key_type {
            KeyType::Pgp => {
                let armored = STANDARD
                    .decode(spec.ascii_armored_pgp_public_key.trim())
                    .map_err(|e| invalid(format!("PGP key is not base64: {e}")))?;
                (SignatureAlgorithm::Unspecified, armored)
            }
            KeyType::Pkix | KeyType::Jwt => {
                let pkix = spec
                    .pkix_public_key
                    .as_ref()
                    .ok_or_else(|| invalid(format!("{key_type} key without pkixPublicKey")))?;
                let algorithm = if pkix.signature_algorithm.is_empty() {
                    SignatureAlgorithm::Unspecified
                } else {
                    SignatureAlgorithm::from_str(&pkix.signature_algorithm).map_err(|_| {
                        invalid(format!(
                            "unsupported signature algorithm {:?}",
                            pkix.signature_algorithm
                        ))
                    })?
                };
                (algorithm, pkix.public_key_pem.clone().into_bytes())
            }
        };

        PublicKey::new(key_type, signature_algorithm, key_data, &spec.key_id)
            .map_err(|e| invalid(e.to_string()))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionAllowlistPattern {
    pub name_pattern: String,
}

/// Admits images attested by every listed authority, or matching an
/// allowlist pattern.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenericAttestationPolicy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: GenericAttestationPolicySpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenericAttestationPolicySpec {
    #[serde(default)]
    pub admission_allowlist_patterns: Vec<AdmissionAllowlistPattern>,
    #[serde(default)]
    pub attestation_authority_names: Vec<String>,
}

/// Single-authority attestation requirement combined with a vulnerability
/// threshold.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSecurityPolicy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: ImageSecurityPolicySpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSecurityPolicySpec {
    #[serde(default)]
    pub attestation_authority_name: String,
    #[serde(default)]
    pub private_key_secret_name: String,
    #[serde(default)]
    pub package_vulnerability_requirements: PackageVulnerabilityRequirements,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackageVulnerabilityRequirements {
    #[serde(default)]
    pub maximum_severity: String,
    #[serde(default)]
    pub maximum_fix_unavailable_severity: String,
    #[serde(default, rename = "allowlistCVEs")]
    pub allowlist_cves: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VulnzSigningPolicy {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: VulnzSigningPolicySpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VulnzSigningPolicySpec {
    #[serde(default)]
    pub image_vulnerability_requirements: ImageVulnerabilityRequirements,
}

/// Severity thresholds shared by both vulnerability policies. An empty
/// threshold takes its documented default.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageVulnerabilityRequirements {
    #[serde(default)]
    pub maximum_fixable_severity: String,
    #[serde(default)]
    pub maximum_unfixable_severity: String,
    #[serde(default, rename = "allowlistCVEs")]
    pub allowlist_cves: Vec<String>,
}

impl From<&PackageVulnerabilityRequirements> for ImageVulnerabilityRequirements {
    fn from(reqs: &PackageVulnerabilityRequirements) -> Self {
        Self {
            maximum_fixable_severity: reqs.maximum_severity.clone(),
            maximum_unfixable_severity: reqs.maximum_fix_unavailable_severity.clone(),
            allowlist_cves: reqs.allowlist_cves.clone(),
        }
    }
}
