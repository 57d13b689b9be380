// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! A metadata store kept in a local directory.
//!
//! Records are JSON files named after the SHA-256 of their key:
//!
//! ```text
//! <root>/vulnerabilities/<sha256(image)>.json
//! <root>/notes/<sha256(note)>.json
//! <root>/occurrences/<sha256(note)>/<sha256(image)>.json
//! ```
//!
//! The vulnerability record of an image doubles as the marker that its
//! analysis is finished.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use attestlib::Attestation;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::{Error, MetadataClient, Note, Occurrence, Result, SignatureType, Vulnerability};
use crate::policy::AttestationAuthority;

const VULNERABILITIES_DIR: &str = "vulnerabilities";
const NOTES_DIR: &str = "notes";
const OCCURRENCES_DIR: &str = "occurrences";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LocalMetadataStore {
    root: PathBuf,
    poll_interval: Duration,
    // Serializes read-modify-write cycles on occurrence records.
    write_lock: Mutex<()>,
}

impl LocalMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Records the result of a vulnerability analysis of `image`.
    pub async fn add_vulnerabilities(
        &self,
        image: &str,
        vulnerabilities: &[Vulnerability],
    ) -> Result<()> {
        write_json(&self.vulnerabilities_path(image), &vulnerabilities).await
    }

    fn vulnerabilities_path(&self, image: &str) -> PathBuf {
        self.root.join(VULNERABILITIES_DIR).join(record_name(image))
    }

    fn note_path(&self, note_name: &str) -> PathBuf {
        self.root.join(NOTES_DIR).join(record_name(note_name))
    }

    fn occurrences_path(&self, note_name: &str, image: &str) -> PathBuf {
        self.root
            .join(OCCURRENCES_DIR)
            .join(hash_hex(note_name))
            .join(record_name(image))
    }

    async fn occurrences(&self, note_name: &str, image: &str) -> Result<Vec<Occurrence>> {
        let path = self.occurrences_path(note_name, image);
        Ok(read_json(&path).await?.unwrap_or_default())
    }
}

#[async_trait]
impl MetadataClient for LocalMetadataStore {
    async fn vulnerabilities(&self, image: &str) -> Result<Vec<Vulnerability>> {
        let path = self.vulnerabilities_path(image);
        match read_json(&path).await? {
            Some(vulnerabilities) => Ok(vulnerabilities),
            None => {
                debug!("No vulnerability record for image {image}");
                Ok(Vec::new())
            }
        }
    }

    async fn attestations(
        &self,
        image: &str,
        authority: &AttestationAuthority,
    ) -> Result<Vec<Attestation>> {
        let occurrences = self
            .occurrences(&authority.spec.note_reference, image)
            .await?;
        Ok(occurrences.into_iter().map(|o| o.attestation).collect())
    }

    async fn upload_attestation_occurrence(
        &self,
        note_name: &str,
        image: &str,
        attestation: &Attestation,
        project: &str,
        signature_type: SignatureType,
    ) -> Result<Occurrence> {
        let _guard = self.write_lock.lock().await;

        let mut occurrences = self.occurrences(note_name, image).await?;
        let mut id = Sha256::new();
        id.update(note_name.as_bytes());
        id.update(image.as_bytes());
        id.update(&attestation.signature);
        let occurrence = Occurrence {
            name: format!("projects/{project}/occurrences/{}", hex::encode(id.finalize())),
            note_name: note_name.to_string(),
            resource_uri: format!("https://{image}"),
            project: project.to_string(),
            signature_type,
            attestation: attestation.clone(),
        };

        occurrences.push(occurrence.clone());
        write_json(&self.occurrences_path(note_name, image), &occurrences).await?;
        info!("Stored attestation occurrence {} for image {image}", occurrence.name);
        Ok(occurrence)
    }

    async fn delete_attestation_occurrence(
        &self,
        image: &str,
        authority: &AttestationAuthority,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let note_name = &authority.spec.note_reference;
        let path = self.occurrences_path(note_name, image);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::OccurrenceNotFound {
                image: image.to_string(),
                note: note_name.to_string(),
            }),
            Err(source) => Err(Error::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    async fn get_or_create_note(&self, authority: &AttestationAuthority) -> Result<Note> {
        let note_name = &authority.spec.note_reference;
        let path = self.note_path(note_name);
        if let Some(note) = read_json::<Note>(&path).await? {
            return Ok(note);
        }

        let note = Note {
            name: note_name.to_string(),
            hint: authority.name().to_string(),
        };
        write_json(&path, &note).await?;
        info!("Created note {note_name}");
        Ok(note)
    }

    async fn wait_for_vulnz_analysis(&self, image: &str, timeout: Duration) -> Result<()> {
        let path = self.vulnerabilities_path(image);
        let deadline = Instant::now() + timeout;
        loop {
            let finished = fs::try_exists(&path).await.map_err(|source| Error::Io {
                path: path.display().to_string(),
                source,
            })?;
            if finished {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::AnalysisTimeout {
                    image: image.to_string(),
                    timeout,
                });
            }

            debug!("Vulnerability analysis of {image} is not finished yet");
            sleep(self.poll_interval).await;
        }
    }
}

fn hash_hex(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn record_name(key: &str) -> String {
    format!("{}.json", hash_hex(key))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| Error::Malformed {
            path: path.display().to_string(),
            source,
        })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_error = |source| Error::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let content = serde_json::to_vec_pretty(value).map_err(|source| Error::Malformed {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, content).await.map_err(io_error)
}
