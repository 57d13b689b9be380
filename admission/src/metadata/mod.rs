// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Metadata store client
//!
//! The review engine and the signer read scan results and attestations
//! from, and write attestations to, a metadata store (a Grafeas-style
//! notes/occurrences API). [`MetadataClient`] is the seam; [`local`]
//! provides a directory-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use attestlib::Attestation;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::policy::AttestationAuthority;

pub mod local;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("timed out after {timeout:?} waiting for vulnerability analysis of {image}")]
    AnalysisTimeout { image: String, timeout: Duration },

    #[error("no attestation occurrence for image {image} under note {note}")]
    OccurrenceNotFound { image: String, note: String },

    #[error("metadata store I/O on {path} failed")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata record {path}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("metadata backend error: {0}")]
    Backend(String),
}

/// A vulnerability found in an image by the scanning backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub cve: String,
    pub severity: String,
    #[serde(default)]
    pub has_fix_available: bool,
}

/// Kind of signature carried by an attestation occurrence.
#[derive(
    AsRefStr, Display, EnumString, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum SignatureType {
    #[strum(serialize = "PGP")]
    #[serde(rename = "PGP")]
    Pgp,
    #[strum(serialize = "GENERIC")]
    #[serde(rename = "GENERIC")]
    Generic,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// `projects/<project>/notes/<note>`
    pub name: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub name: String,
    pub note_name: String,
    pub resource_uri: String,
    pub project: String,
    pub signature_type: SignatureType,
    pub attestation: Attestation,
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Vulnerabilities found in `image`.
    async fn vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>>;

    /// Attestations for `image` stored under the note of `authority`.
    async fn attestations(
        &self,
        image: &str,
        authority: &AttestationAuthority,
    ) -> Result<Vec<Attestation>>;

    /// Stores `attestation` as an occurrence of `note_name` for `image` in
    /// `project`.
    async fn upload_attestation_occurrence(
        &self,
        note_name: &str,
        image: &str,
        attestation: &Attestation,
        project: &str,
        signature_type: SignatureType,
    ) -> Result<Occurrence>;

    /// Removes the attestation occurrences of `image` under the note of
    /// `authority`.
    async fn delete_attestation_occurrence(
        &self,
        image: &str,
        authority: &AttestationAuthority,
    ) -> Result<()>;

    /// Returns the note of `authority`, creating it if it does not exist.
    async fn get_or_create_note(&self, authority: &AttestationAuthority) -> Result<Note>;

    /// Blocks until the scanning backend has finished analysing `image`.
    async fn wait_for_vulnz_analysis(&self, image: &str, timeout: Duration) -> Result<()>;
}
