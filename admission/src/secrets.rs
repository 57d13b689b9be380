// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;

use anyhow::{bail, Context};
use async_trait::async_trait;
use attestlib::PgpSigner;
use zeroize::Zeroizing;

/// Key material used to attest images that pass review.
pub struct SigningSecret {
    pub name: String,
    /// ASCII-armored, unencrypted OpenPGP secret key.
    pub private_key: Zeroizing<Vec<u8>>,
}

impl SigningSecret {
    pub fn new(name: &str, private_key: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            private_key: Zeroizing::new(private_key),
        }
    }

    pub fn signer(&self) -> attestlib::Result<PgpSigner> {
        PgpSigner::new(&self.private_key)
    }
}

/// Resolves a signing secret by namespace and name.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn signing_secret(&self, namespace: &str, name: &str) -> anyhow::Result<SigningSecret>;
}

/// Reads secrets mounted as files, at `<root>/<namespace>/<name>`.
pub struct DirSecretResolver {
    root: PathBuf,
}

impl DirSecretResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SecretResolver for DirSecretResolver {
    async fn signing_secret(&self, namespace: &str, name: &str) -> anyhow::Result<SigningSecret> {
        for component in [namespace, name] {
            if component.is_empty() || component.contains('/') || component == ".." {
                bail!("illegal secret path component {component:?}");
            }
        }

        let path = self.root.join(namespace).join(name);
        let private_key = tokio::fs::read(&path)
            .await
            .with_context(|| format!("read secret {}", path.display()))?;
        Ok(SigningSecret::new(name, private_key))
    }
}
