// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid image name {image:?}: {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("keyID {0:?} not formatted as StringOrURI: must either not contain \":\" or be valid URI")]
    InvalidKeyId(String),

    #[error("error reading armored public key: {0}")]
    PgpKeyring(String),

    #[error("expected 1 public key, got {0}")]
    PgpKeyCount(usize),

    #[error("no public key with ID {0:?} found")]
    NoPublicKey(String),

    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("unsupported signature algorithm {0} for {1} keys")]
    UnsupportedAlgorithm(String, String),

    #[error("malformed attestation payload")]
    MalformedPayload {
        #[source]
        source: serde_json::Error,
    },

    #[error("attestation payload does not match image: expected {expected:?}, got {actual:?}")]
    PayloadMismatch { expected: String, actual: String },

    #[error("invalid digest algorithm {0:?}: must be one of SHA256|SHA384|SHA512")]
    InvalidDigestAlgorithm(String),

    #[error("error loading signing key: {0}")]
    SigningKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}
