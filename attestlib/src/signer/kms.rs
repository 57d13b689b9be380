// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::str::FromStr;

use async_trait::async_trait;
use log::debug;
use sha2::{Digest, Sha256, Sha384, Sha512};
use strum::{AsRefStr, Display, EnumString};

use super::Signer;
use crate::{Attestation, Error, Result};

/// Prefix of the public key ID of attestations signed through the KMS.
pub const KMS_KEY_ID_PREFIX: &str = "//cloudkms.googleapis.com/v1/";

/// Digest applied to the payload before it is sent to the KMS. Must match
/// the algorithm the key version was created with.
#[derive(AsRefStr, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    #[strum(serialize = "SHA256", ascii_case_insensitive)]
    Sha256,
    #[strum(serialize = "SHA384", ascii_case_insensitive)]
    Sha384,
    #[strum(serialize = "SHA512", ascii_case_insensitive)]
    Sha512,
}

impl DigestAlgorithm {
    pub fn from_name(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| Error::InvalidDigestAlgorithm(name.to_string()))
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Client of a remote asymmetric signing API.
#[async_trait]
pub trait AsymmetricSigner: Send + Sync {
    /// Sign the precomputed `digest` with the key version `key_name` and
    /// return the raw signature bytes.
    async fn asymmetric_sign(
        &self,
        key_name: &str,
        algorithm: DigestAlgorithm,
        digest: &[u8],
    ) -> Result<Vec<u8>>;
}

pub struct KmsSigner {
    client: Box<dyn AsymmetricSigner>,
    key_name: String,
    digest_algorithm: DigestAlgorithm,
}

impl KmsSigner {
    pub fn new(
        client: Box<dyn AsymmetricSigner>,
        key_name: &str,
        digest_algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            client,
            key_name: key_name.to_string(),
            digest_algorithm,
        }
    }

    pub fn key_id(&self) -> String {
        format!("{KMS_KEY_ID_PREFIX}{}", self.key_name)
    }
}

#[async_trait]
impl Signer for KmsSigner {
    async fn create_attestation(&self, payload: &[u8]) -> Result<Attestation> {
        let digest = self.digest_algorithm.digest(payload);
        let signature = self
            .client
            .asymmetric_sign(&self.key_name, self.digest_algorithm, &digest)
            .await
            .map_err(|e| Error::Signing(format!("KMS key {}: {e}", self.key_name)))?;
        debug!(
            "Signed {} digest of payload with KMS key {}",
            self.digest_algorithm, self.key_name
        );

        Ok(Attestation {
            public_key_id: self.key_id(),
            signature,
            serialized_payload: payload.to_vec(),
        })
    }
}
