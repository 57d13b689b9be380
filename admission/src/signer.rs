// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Attests images under a fixed note, on behalf of an out-of-cluster signer.

use std::sync::Arc;

use attestlib::{atomic_container_payload, Signer};
use log::{info, warn};

use crate::error::SignerError;
use crate::metadata::{MetadataClient, SignatureType};
use crate::policy::{AttestationAuthority, AttestationAuthoritySpec, ObjectMeta};
use crate::{Error, Result};

/// Name of the authority the signer stores its attestations under.
pub const SIGNING_AUTHORITY_NAME: &str = "signing-aa";

pub struct AttestationSigner {
    client: Arc<dyn MetadataClient>,
    signer: Box<dyn Signer>,
    authority: AttestationAuthority,
    project: String,
    overwrite: bool,
}

impl AttestationSigner {
    /// `note_name` must have the form `projects/<project>/notes/<note>`.
    /// Occurrences are created in `project`.
    pub fn new(
        client: Arc<dyn MetadataClient>,
        signer: Box<dyn Signer>,
        note_name: &str,
        project: &str,
        overwrite: bool,
    ) -> Self {
        let authority = AttestationAuthority {
            metadata: ObjectMeta {
                name: SIGNING_AUTHORITY_NAME.to_string(),
                namespace: String::new(),
            },
            spec: AttestationAuthoritySpec {
                note_reference: note_name.to_string(),
                public_keys: Vec::new(),
            },
        };

        Self {
            client,
            signer,
            authority,
            project: project.to_string(),
            overwrite,
        }
    }

    /// Creates and uploads an attestation for `image`.
    ///
    /// An image that already has attestations under the note is left alone,
    /// unless the signer was built with `overwrite`, in which case they are
    /// deleted first.
    pub async fn sign_image(&self, image: &str) -> std::result::Result<(), SignerError> {
        let existing = self
            .client
            .attestations(image, &self.authority)
            .await
            .map_err(|source| SignerError::CheckExistence { source })?;

        if !existing.is_empty() {
            if !self.overwrite {
                warn!(
                    "Image {image} already has an attestation under note {}, not overwriting.",
                    self.authority.spec.note_reference
                );
                return Ok(());
            }

            info!("Deleting the existing attestation of image {image}.");
            self.client
                .delete_attestation_occurrence(image, &self.authority)
                .await
                .map_err(|source| SignerError::DeleteExisting { source })?;
        }

        let payload = atomic_container_payload(image)
            .map_err(|source| SignerError::CreateAttestation { source })?;
        let attestation = self
            .signer
            .create_attestation(&payload)
            .await
            .map_err(|source| SignerError::CreateAttestation { source })?;

        let note = self
            .client
            .get_or_create_note(&self.authority)
            .await
            .map_err(|source| SignerError::UploadAttestation { source })?;
        self.client
            .upload_attestation_occurrence(
                &note.name,
                image,
                &attestation,
                &self.project,
                SignatureType::Generic,
            )
            .await
            .map_err(|source| SignerError::UploadAttestation { source })?;

        info!("Attested image {image} under note {}.", note.name);
        Ok(())
    }
}

/// Checks that `note_name` has the form `projects/<project>/notes/<note>`.
pub fn check_note_name(note_name: &str) -> Result<()> {
    project_from_note_name(note_name).map(|_| ())
}

/// Project part of a note name of the form `projects/<project>/notes/<note>`.
pub fn project_from_note_name(note_name: &str) -> Result<&str> {
    match note_name.split('/').collect::<Vec<_>>().as_slice() {
        ["projects", project, "notes", note] if !project.is_empty() && !note.is_empty() => {
            Ok(*project)
        }
        _ => Err(Error::InvalidNoteName(note_name.to_string())),
    }
}

/// Project of a registry image such as `gcr.io/<project>/<name>`: the second
/// path component.
pub fn project_from_image(image: &str) -> Option<&str> {
    image.split('/').nth(1).filter(|project| !project.is_empty())
}
