// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Payload format of a container image attestation.
//!
//! The format follows
//! <https://github.com/containers/image/blob/main/docs/containers-signature.5.md>.

use serde::{Deserialize, Serialize};

use crate::{DigestReference, Error, Result};

/// Value of `critical.type` in payloads created by this crate.
pub const ATOMIC_CONTAINER_SIGNATURE_TYPE: &str = "atomic container signature";

// SigPayload is the JSON envelope that a signature vouches for.
// A verifier only trusts it after the signature around it has been checked.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct SigPayload {
    critical: SigPayloadCritical,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    optional: Option<serde_json::Map<String, serde_json::Value>>,
}

// A JSON object which contains data critical to correctly evaluating the validity of a signature.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
struct SigPayloadCritical {
    identity: PayloadCriticalIdentity,
    image: PayloadCriticalImage,
    r#type: String,
}

// A JSON object which identifies the container image this signature applies to.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
struct PayloadCriticalImage {
    #[serde(rename = "docker-manifest-digest")]
    docker_manifest_digest: String,
}

// A JSON object which identifies the claimed identity of the image.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
struct PayloadCriticalIdentity {
    #[serde(rename = "docker-reference")]
    docker_reference: String,
}

impl SigPayload {
    /// Builds the payload vouching for `reference`.
    pub fn for_image(reference: &DigestReference) -> Self {
        Self {
            critical: SigPayloadCritical {
                identity: PayloadCriticalIdentity {
                    docker_reference: reference.repository().to_string(),
                },
                image: PayloadCriticalImage {
                    docker_manifest_digest: reference.digest().to_string(),
                },
                r#type: ATOMIC_CONTAINER_SIGNATURE_TYPE.to_string(),
            },
            optional: None,
        }
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|source| Error::MalformedPayload { source })
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|source| Error::MalformedPayload { source })
    }

    pub fn docker_reference(&self) -> &str {
        &self.critical.identity.docker_reference
    }

    pub fn manifest_digest(&self) -> &str {
        &self.critical.image.docker_manifest_digest
    }

    /// Checks that the payload names exactly `image_name` and `image_digest`.
    pub fn validate_image(&self, image_name: &str, image_digest: &str) -> Result<()> {
        if self.docker_reference() != image_name {
            return Err(Error::PayloadMismatch {
                expected: image_name.to_string(),
                actual: self.docker_reference().to_string(),
            });
        }

        if self.manifest_digest() != image_digest {
            return Err(Error::PayloadMismatch {
                expected: image_digest.to_string(),
                actual: self.manifest_digest().to_string(),
            });
        }

        Ok(())
    }
}

/// Serialized payload for `image`, which must be a strict digest reference.
pub fn atomic_container_payload(image: &str) -> Result<Vec<u8>> {
    let reference = DigestReference::parse(image)?;
    SigPayload::for_image(&reference).to_vec()
}
