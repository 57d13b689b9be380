// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Attestation verification.
//!
//! A [`Verifier`] is bound to one digest-pinned image and one set of trusted
//! public keys. An attestation is authentic only when its signature verifies
//! under the key it names and the payload it carries names exactly the bound
//! image.

use std::collections::HashMap;

use log::{debug, warn};

use crate::payload::SigPayload;
use crate::{Attestation, DigestReference, Error, KeyType, PublicKey, Result};

pub mod jwt;
pub mod pgp;
pub mod pkix;

#[derive(Debug, Clone)]
pub struct Verifier {
    image: DigestReference,
    public_keys: HashMap<String, PublicKey>,
}

impl Verifier {
    /// Creates a verifier for `image`, which must be a `repository@digest`
    /// reference.
    ///
    /// Keys are indexed by ID. When two keys share an ID the later one wins.
    pub fn new(image: &str, public_keys: Vec<PublicKey>) -> Result<Self> {
        let image = DigestReference::parse(image)?;

        let mut index = HashMap::with_capacity(public_keys.len());
        for key in public_keys {
            if index.contains_key(&key.id) {
                warn!(
                    "Overwriting public key with ID {:?}: duplicate IDs in the key set",
                    key.id
                );
            }
            index.insert(key.id.clone(), key);
        }

        Ok(Self {
            image,
            public_keys: index,
        })
    }

    pub fn image(&self) -> &DigestReference {
        &self.image
    }

    /// Verifies the signature of `attestation` and checks that its payload
    /// names the image this verifier was built for.
    pub fn verify_attestation(&self, attestation: &Attestation) -> Result<()> {
        let key = self
            .public_keys
            .get(&attestation.public_key_id)
            .ok_or_else(|| Error::NoPublicKey(attestation.public_key_id.clone()))?;

        let payload = match key.key_type {
            KeyType::Pgp => pgp::verify(&key.key_data, &attestation.signature)?,
            KeyType::Pkix => {
                pkix::verify(
                    key.signature_algorithm,
                    &key.key_data,
                    &attestation.signature,
                    &attestation.serialized_payload,
                )?;
                attestation.serialized_payload.clone()
            }
            KeyType::Jwt => {
                jwt::verify(key.signature_algorithm, &key.key_data, &attestation.signature)?
            }
        };

        let payload = SigPayload::from_slice(&payload)?;
        payload.validate_image(self.image.repository(), self.image.digest())?;

        debug!(
            "Attestation by key {:?} verified for image {}",
            attestation.public_key_id, self.image
        );
        Ok(())
    }
}
