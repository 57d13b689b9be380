// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! An asymmetric signing backend that keeps its keys on local disk.
//!
//! Key version `<name>` is read from `<root>/<name>.pem`, a PKCS#8 PEM
//! encoded P-256 or P-384 private key. Signatures are DER encoded ECDSA,
//! as returned by cloud KMS services.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use attestlib::{AsymmetricSigner, DigestAlgorithm, Error, Result};
use log::debug;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::pkcs8::DecodePrivateKey;
use tokio::fs;
use zeroize::Zeroizing;

enum EcSigningKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
}

impl EcSigningKey {
    fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::P256(key));
        }
        p384::ecdsa::SigningKey::from_pkcs8_pem(pem)
            .map(Self::P384)
            .map_err(|e| Error::SigningKey(format!("not a P-256 or P-384 PKCS#8 key: {e}")))
    }

    fn sign_prehash(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        match (self, algorithm) {
            (Self::P256(key), DigestAlgorithm::Sha256) => {
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| Error::Signing(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (Self::P384(key), DigestAlgorithm::Sha384) => {
                let signature: p384::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| Error::Signing(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (Self::P256(_), algorithm) => Err(Error::Signing(format!(
                "P-256 keys sign SHA256 digests, got {algorithm}"
            ))),
            (Self::P384(_), algorithm) => Err(Error::Signing(format!(
                "P-384 keys sign SHA384 digests, got {algorithm}"
            ))),
        }
    }
}

pub struct OfflineKms {
    root: PathBuf,
}

impl OfflineKms {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key_name: &str) -> Result<PathBuf> {
        let relative = Path::new(key_name);
        let legal = !key_name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !legal {
            return Err(Error::SigningKey(format!("illegal key name {key_name:?}")));
        }

        Ok(self.root.join(format!("{key_name}.pem")))
    }
}

#[async_trait]
impl AsymmetricSigner for OfflineKms {
    async fn asymmetric_sign(
        &self,
        key_name: &str,
        algorithm: DigestAlgorithm,
        digest: &[u8],
    ) -> Result<Vec<u8>> {
        let path = self.key_path(key_name)?;
        let pem = Zeroizing::new(fs::read_to_string(&path).await.map_err(|e| {
            Error::SigningKey(format!("read key file {}: {e}", path.display()))
        })?);

        let key = EcSigningKey::from_pkcs8_pem(&pem)?;
        debug!("Signing {algorithm} digest with key {key_name}");
        key.sign_prehash(algorithm, digest)
    }
}
