// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Review engine
//!
//! Decides whether images may run, under two kinds of policy:
//!
//! - [`ImageSecurityPolicy`]: a vulnerability threshold plus a single
//!   attestation authority. In webhook mode an attested image passes, and a
//!   clean unattested image gets attested. Periodic audits always report
//!   violations and never attest.
//! - [`GenericAttestationPolicy`]: an image must be attested by every
//!   authority of at least one policy, or match one of its allowlist
//!   patterns.
//!
//! Outcomes are reported through the injected [`Strategy`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use attestlib::{atomic_container_payload, is_fully_qualified, Attestation, Signer, Verifier};
use log::{debug, error, info, warn};

use crate::allowlist::{image_in_gap_allowlist, remove_globally_allowed_images};
use crate::config::ReviewConfig;
use crate::metadata::{MetadataClient, SignatureType};
use crate::policy::{AttestationAuthority, GenericAttestationPolicy, ImageSecurityPolicy};
use crate::secrets::SecretResolver;
use crate::signer::project_from_note_name;
use crate::violation::{Strategy, Violation, ViolationType};
use crate::vulnz::IspValidator;
use crate::{Error, Result};

/// Resolves an attestation authority by namespace and name.
#[async_trait]
pub trait AuthorityResolver: Send + Sync {
    async fn authority(&self, namespace: &str, name: &str) -> anyhow::Result<AttestationAuthority>;
}

/// Serves a fixed set of authorities by name, in every namespace.
#[derive(Default, Debug, Clone)]
pub struct AuthorityMap {
    authorities: HashMap<String, AttestationAuthority>,
}

impl AuthorityMap {
    pub fn new(authorities: impl IntoIterator<Item = AttestationAuthority>) -> Self {
        let mut map = HashMap::new();
        for authority in authorities {
            if let Some(previous) = map.insert(authority.name().to_string(), authority) {
                warn!(
                    "Duplicate attestation authority {:?}, keeping the last definition",
                    previous.name()
                );
            }
        }
        Self { authorities: map }
    }
}

#[async_trait]
impl AuthorityResolver for AuthorityMap {
    async fn authority(
        &self,
        _namespace: &str,
        name: &str,
    ) -> anyhow::Result<AttestationAuthority> {
        self.authorities
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such attestation authority: {name}"))
    }
}

// Attestations fetched during one review, by image and note.
type AttestationCache = HashMap<(String, String), Vec<Attestation>>;

pub struct Reviewer {
    config: ReviewConfig,
    validator: Box<dyn IspValidator>,
    secrets: Box<dyn SecretResolver>,
    authorities: Box<dyn AuthorityResolver>,
    strategy: Arc<dyn Strategy>,
}

impl Reviewer {
    pub fn new(
        config: ReviewConfig,
        validator: Box<dyn IspValidator>,
        secrets: Box<dyn SecretResolver>,
        authorities: Box<dyn AuthorityResolver>,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        Self {
            config,
            validator,
            secrets,
            authorities,
            strategy,
        }
    }

    /// Reviews `images` against every policy in `isps`.
    ///
    /// Returns an error listing every violation of the first image that fails.
    pub async fn review_isp(
        &self,
        images: &[String],
        isps: &[ImageSecurityPolicy],
        client: &dyn MetadataClient,
    ) -> Result<()> {
        let images = remove_globally_allowed_images(images, &self.config.global_allowlist);
        if images.is_empty() {
            return Ok(());
        }

        let mut cache = AttestationCache::new();
        for isp in isps {
            let authority = self.attestation_authority_for_isp(isp).await?;
            for image in &images {
                info!(
                    "Reviewing image {image} against ImageSecurityPolicy {:?}",
                    isp.metadata.name
                );

                let is_attested = match &authority {
                    Some(authority) => {
                        self.is_attested(image, authority, client, &mut cache)
                            .await?
                    }
                    None => false,
                };
                self.strategy.handle_attestation(image, is_attested);

                if is_attested && self.config.is_webhook {
                    info!("Image {image} has a valid attestation, skipping vulnerability checks.");
                    continue;
                }

                let mut violations = self.validator.validate(isp, image, client).await?;
                if !is_fully_qualified(image)
                    && !violations
                        .iter()
                        .any(|v| v.violation_type == ViolationType::UnqualifiedImage)
                {
                    violations.insert(0, Violation::unqualified_image(image));
                }

                if !violations.is_empty() {
                    return Err(self.handle_violations(image, &isp.metadata.name, &violations));
                }

                if !self.config.is_webhook {
                    continue;
                }
                if let Some(authority) = &authority {
                    if let Err(e) = self.add_attestation(image, isp, authority, client).await {
                        error!("Adding attestation for image {image} failed: {e}");
                    }
                }
            }
        }

        Ok(())
    }

    /// Reviews `images` against `gaps`. An image is admitted by the first
    /// policy that allowlists it or whose authorities all attest it.
    pub async fn review_gap(
        &self,
        images: &[String],
        gaps: &[GenericAttestationPolicy],
        client: &dyn MetadataClient,
    ) -> Result<()> {
        if gaps.is_empty() {
            info!("No GenericAttestationPolicy found, admitting all images.");
            return Ok(());
        }

        let images = remove_globally_allowed_images(images, &self.config.global_allowlist);
        let mut cache = AttestationCache::new();
        for image in &images {
            let mut admitted = false;
            let mut is_attested = false;
            let mut violations = Vec::new();

            for gap in gaps {
                if gap.spec.attestation_authority_names.is_empty() {
                    warn!(
                        "GenericAttestationPolicy {:?} lists no attestation authority and cannot admit images.",
                        gap.metadata.name
                    );
                    violations.push(Violation::no_attestation_authority(image, &gap.metadata.name));
                    continue;
                }

                if image_in_gap_allowlist(gap, image) {
                    info!(
                        "Image {image} is allowlisted by GenericAttestationPolicy {:?}.",
                        gap.metadata.name
                    );
                    admitted = true;
                    break;
                }

                let authorities = self.attestation_authorities_for_gap(gap).await?;
                if self
                    .has_all_attestations(image, &authorities, client, &mut cache)
                    .await?
                {
                    info!(
                        "Image {image} is attested by every authority of GenericAttestationPolicy {:?}.",
                        gap.metadata.name
                    );
                    is_attested = true;
                    admitted = true;
                    break;
                }
            }

            self.strategy.handle_attestation(image, is_attested);
            if !admitted {
                if !violations.is_empty() {
                    self.strategy.handle_violations(image, &violations);
                }
                return Err(Error::NotAttested {
                    image: image.clone(),
                });
            }
        }

        Ok(())
    }

    /// Resolves every authority named by `gap`. One unresolvable name fails
    /// the whole policy.
    pub async fn attestation_authorities_for_gap(
        &self,
        gap: &GenericAttestationPolicy,
    ) -> Result<Vec<AttestationAuthority>> {
        let mut authorities = Vec::with_capacity(gap.spec.attestation_authority_names.len());
        for name in &gap.spec.attestation_authority_names {
            authorities.push(self.resolve_authority(&gap.metadata.namespace, name).await?);
        }
        Ok(authorities)
    }

    /// Resolves the authority named by `isp`, if it names one.
    pub async fn attestation_authority_for_isp(
        &self,
        isp: &ImageSecurityPolicy,
    ) -> Result<Option<AttestationAuthority>> {
        let name = &isp.spec.attestation_authority_name;
        if name.is_empty() {
            return Ok(None);
        }
        self.resolve_authority(&isp.metadata.namespace, name)
            .await
            .map(Some)
    }

    async fn resolve_authority(&self, namespace: &str, name: &str) -> Result<AttestationAuthority> {
        self.authorities
            .authority(namespace, name)
            .await
            .map_err(|source| Error::AuthorityResolution {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })
    }

    async fn has_all_attestations(
        &self,
        image: &str,
        authorities: &[AttestationAuthority],
        client: &dyn MetadataClient,
        cache: &mut AttestationCache,
    ) -> Result<bool> {
        if authorities.is_empty() {
            return Ok(false);
        }

        for authority in authorities {
            if !self.is_attested(image, authority, client, cache).await? {
                debug!(
                    "Image {image} has no valid attestation by authority {:?}.",
                    authority.name()
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    // One verifying attestation is enough. Verification failures only mean
    // "not attested by this attestation".
    async fn is_attested(
        &self,
        image: &str,
        authority: &AttestationAuthority,
        client: &dyn MetadataClient,
        cache: &mut AttestationCache,
    ) -> Result<bool> {
        if !is_fully_qualified(image) {
            debug!("Image {image} is not pinned by digest and cannot be attested.");
            return Ok(false);
        }

        let keys = authority.public_keys()?;
        let verifier = match Verifier::new(image, keys) {
            Ok(verifier) => verifier,
            Err(e) => {
                debug!("Cannot verify attestations for image {image}: {e}");
                return Ok(false);
            }
        };

        let cache_key = (image.to_string(), authority.spec.note_reference.clone());
        if !cache.contains_key(&cache_key) {
            let attestations = client
                .attestations(image, authority)
                .await
                .map_err(|source| Error::Metadata { source })?;
            cache.insert(cache_key.clone(), attestations);
        }

        let attestations = cache.get(&cache_key).map(Vec::as_slice).unwrap_or_default();
        for attestation in attestations {
            match verifier.verify_attestation(attestation) {
                Ok(()) => return Ok(true),
                Err(e) => debug!(
                    "Attestation by key {:?} does not verify for image {image}: {e}",
                    attestation.public_key_id
                ),
            }
        }

        Ok(false)
    }

    fn handle_violations(&self, image: &str, policy: &str, violations: &[Violation]) -> Error {
        self.strategy.handle_violations(image, violations);
        Error::PolicyViolations {
            image: image.to_string(),
            policy: policy.to_string(),
            reasons: violations.iter().map(|v| v.reason.clone()).collect(),
        }
    }

    async fn add_attestation(
        &self,
        image: &str,
        isp: &ImageSecurityPolicy,
        authority: &AttestationAuthority,
        client: &dyn MetadataClient,
    ) -> Result<()> {
        let namespace = &isp.metadata.namespace;
        let secret_name = &isp.spec.private_key_secret_name;
        let secret = self
            .secrets
            .signing_secret(namespace, secret_name)
            .await
            .map_err(|source| Error::SecretResolution {
                namespace: namespace.to_string(),
                name: secret_name.to_string(),
                source,
            })?;

        let signer = secret
            .signer()
            .map_err(|source| Error::Attestation { source })?;
        let payload =
            atomic_container_payload(image).map_err(|source| Error::Attestation { source })?;
        let attestation = signer
            .create_attestation(&payload)
            .await
            .map_err(|source| Error::Attestation { source })?;

        let note = client
            .get_or_create_note(authority)
            .await
            .map_err(|source| Error::Metadata { source })?;
        let project = project_from_note_name(&note.name)?;
        client
            .upload_attestation_occurrence(
                &note.name,
                image,
                &attestation,
                project,
                SignatureType::Pgp,
            )
            .await
            .map_err(|source| Error::Metadata { source })?;

        info!("Attested image {image} with authority {:?}.", authority.name());
        Ok(())
    }
}
