// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Container image attestations: creation, public keys and verification.

pub mod attestation;
pub mod error;
pub mod key;
pub mod payload;
pub mod reference;
pub mod signer;
pub mod verifier;

pub use attestation::Attestation;
pub use error::{Error, Result};
pub use key::{KeyType, PublicKey, SignatureAlgorithm};
pub use payload::{atomic_container_payload, SigPayload};
pub use reference::{image_name, is_fully_qualified, DigestReference};
pub use signer::kms::{AsymmetricSigner, DigestAlgorithm, KmsSigner};
pub use signer::pgp::PgpSigner;
pub use signer::Signer;
pub use verifier::Verifier;
