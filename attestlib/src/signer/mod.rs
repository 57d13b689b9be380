// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Signing capabilities
//!
//! A [`Signer`] turns a serialized payload into an [`Attestation`] that a
//! [`crate::Verifier`] holding the matching public key will accept.
//!
//! - [`pgp::PgpSigner`] signs with a local, unencrypted OpenPGP secret key.
//! - [`kms::KmsSigner`] delegates to a remote asymmetric signing service.

use async_trait::async_trait;

use crate::{Attestation, Result};

pub mod kms;
pub mod pgp;

#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `payload` and wrap the result as an [`Attestation`].
    async fn create_attestation(&self, payload: &[u8]) -> Result<Attestation>;
}
