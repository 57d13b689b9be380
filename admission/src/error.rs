// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

use crate::metadata;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid max severity level: {0}")]
    InvalidMaxSeverity(String),

    #[error("invalid severity level: {0}")]
    InvalidSeverity(String),

    #[error("failed to load policy from {path}")]
    PolicyLoad {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve attestation authority {name:?} in namespace {namespace:?}")]
    AuthorityResolution {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid public key in attestation authority {authority:?}: {reason}")]
    InvalidAuthorityKey { authority: String, reason: String },

    #[error("failed to resolve signing secret {name:?} in namespace {namespace:?}")]
    SecretResolution {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("metadata client request failed")]
    Metadata {
        #[source]
        source: metadata::Error,
    },

    #[error("attestation failed")]
    Attestation {
        #[source]
        source: attestlib::Error,
    },

    #[error("image {image} violates policy {policy:?}: {}", .reasons.join("; "))]
    PolicyViolations {
        image: String,
        policy: String,
        reasons: Vec<String>,
    },

    #[error("image {image} is not attested by any generic attestation policy")]
    NotAttested { image: String },

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("invalid note name {0:?}: must have the form projects/<project>/notes/<note>")]
    InvalidNoteName(String),

    #[error("invalid signer configuration: {0}")]
    Config(String),
}

/// Failures of [`crate::signer::AttestationSigner::sign_image`], one variant
/// per phase.
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("checking existing attestation status failed")]
    CheckExistence {
        #[source]
        source: metadata::Error,
    },

    #[error("deleting existing attestation failed")]
    DeleteExisting {
        #[source]
        source: metadata::Error,
    },

    #[error("creating attestation failed")]
    CreateAttestation {
        #[source]
        source: attestlib::Error,
    },

    #[error("uploading attestation failed")]
    UploadAttestation {
        #[source]
        source: metadata::Error,
    },
}
