// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Admission of container images based on their known vulnerabilities and
//! on attestations by trusted authorities.

pub mod allowlist;
pub mod config;
pub mod error;
pub mod kms;
pub mod metadata;
pub mod policy;
pub mod review;
pub mod secrets;
pub mod severity;
pub mod signer;
pub mod violation;
pub mod vulnz;

pub use config::{run_signer, Cli, ReviewConfig, SignerConfig, SignerMode};
pub use error::{Error, Result, SignerError};
pub use metadata::local::LocalMetadataStore;
pub use metadata::MetadataClient;
pub use review::{AuthorityMap, AuthorityResolver, Reviewer};
pub use secrets::{DirSecretResolver, SecretResolver, SigningSecret};
pub use signer::AttestationSigner;
pub use violation::{LoggingStrategy, MemoryStrategy, Strategy, Violation, ViolationType};
pub use vulnz::{IspValidator, VulnzValidator};
