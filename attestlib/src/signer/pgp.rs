// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::io::Write;

use async_trait::async_trait;
use log::debug;
use openpgp::armor::Kind;
use openpgp::crypto::KeyPair;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, LiteralWriter, Message, Signer as MessageSigner};
use openpgp::Cert;
use sequoia_openpgp as openpgp;

use super::Signer;
use crate::key::parse_single_cert;
use crate::{Attestation, Error, Result};

/// Signs payloads with an unencrypted OpenPGP secret key.
///
/// The payload is embedded in an armored inline-signed message, so the
/// resulting attestation has an empty `serialized_payload`.
#[derive(Debug, Clone)]
pub struct PgpSigner {
    cert: Cert,
    key_id: String,
}

impl PgpSigner {
    /// Loads the armored secret key in `secret_key`. The keyring must hold
    /// exactly one certificate with an unencrypted signing-capable key.
    pub fn new(secret_key: &[u8]) -> Result<Self> {
        let cert = parse_single_cert(secret_key)?;
        if !cert.is_tsk() {
            return Err(Error::SigningKey("keyring holds no secret key material".into()));
        }

        let signer = Self {
            key_id: cert.fingerprint().to_hex(),
            cert,
        };
        // Fail early rather than on the first signature.
        signer.signing_keypair()?;
        Ok(signer)
    }

    /// Uppercase hex fingerprint, the same ID a verifier derives from the
    /// public half of the key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn signing_keypair(&self) -> Result<KeyPair> {
        let policy = StandardPolicy::new();
        let key = self
            .cert
            .keys()
            .unencrypted_secret()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_signing()
            .next()
            .ok_or_else(|| {
                Error::SigningKey("no unencrypted, valid signing key in keyring".into())
            })?;

        key.key()
            .clone()
            .into_keypair()
            .map_err(|e| Error::SigningKey(e.to_string()))
    }

    fn sign(&self, payload: &[u8]) -> openpgp::Result<Vec<u8>> {
        let keypair = self.signing_keypair()?;

        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let message = Armorer::new(message).kind(Kind::Message).build()?;
        let message = MessageSigner::new(message, keypair)?.build()?;
        let mut message = LiteralWriter::new(message).build()?;
        message.write_all(payload)?;
        message.finalize()?;

        Ok(sink)
    }
}

#[async_trait]
impl Signer for PgpSigner {
    async fn create_attestation(&self, payload: &[u8]) -> Result<Attestation> {
        let signature = self
            .sign(payload)
            .map_err(|e| Error::Signing(e.to_string()))?;
        debug!("Signed payload with PGP key {}", self.key_id);

        Ok(Attestation {
            public_key_id: self.key_id.clone(),
            signature,
            serialized_payload: Vec::new(),
        })
    }
}
