// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use admission::metadata::{self, MetadataClient, Note, Occurrence, SignatureType, Vulnerability};
use admission::policy::{AttestationAuthority, AttestationAuthoritySpec, ObjectMeta, PublicKeySpec};
use admission::{SecretResolver, SigningSecret};
use async_trait::async_trait;
use attestlib::{atomic_container_payload, Attestation, PgpSigner, Signer};
use base64::{engine::general_purpose::STANDARD, Engine};
use sequoia_openpgp as openpgp;
use openpgp::cert::CertBuilder;
use openpgp::serialize::SerializeInto;

pub const QUALIFIED_IMAGE: &str = "gcr.io/kritis-test/image@sha256:0000000000000000000000000000000000000000000000000000000000000000";
pub const INT_TEST_IMAGE: &str = "gcr.io/kritis-int-test/java-with-vulnz@sha256:358687cfd3ec8e1dfeb2bf51b5110e4e16f6df71f64fba01986f720b2fcba68a";

/// A PGP key pair minted for one test.
pub struct TestKey {
    pub name: String,
    pub secret: Vec<u8>,
    pub public: Vec<u8>,
    pub fingerprint: String,
}

impl TestKey {
    pub fn generate(name: &str) -> Self {
        let (cert, _) = CertBuilder::new()
            .add_userid(format!("{name}@example.com"))
            .add_signing_subkey()
            .generate()
            .unwrap();

        let secret = cert.as_tsk().armored().to_vec().unwrap();
        let public = cert.armored().to_vec().unwrap();
        let fingerprint = cert.fingerprint().to_hex();

        Self {
            name: name.to_string(),
            secret,
            public,
            fingerprint,
        }
    }

    pub fn signer(&self) -> PgpSigner {
        PgpSigner::new(&self.secret).unwrap()
    }

    pub fn signing_secret(&self) -> SigningSecret {
        SigningSecret::new(&self.name, self.secret.clone())
    }

    pub async fn attest(&self, image: &str) -> Attestation {
        let payload = atomic_container_payload(image).unwrap();
        self.signer().create_attestation(&payload).await.unwrap()
    }
}

pub fn pgp_authority(name: &str, note_reference: &str, key: &TestKey) -> AttestationAuthority {
    AttestationAuthority {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: String::new(),
        },
        spec: AttestationAuthoritySpec {
            note_reference: note_reference.to_string(),
            public_keys: vec![PublicKeySpec {
                key_type: "PGP".into(),
                key_id: key.fingerprint.clone(),
                ascii_armored_pgp_public_key: STANDARD.encode(&key.public),
                pkix_public_key: None,
            }],
        },
    }
}

/// Resolves secrets by name from a fixed set of keys.
pub struct MockSecretResolver {
    keys: HashMap<String, Vec<u8>>,
}

impl MockSecretResolver {
    pub fn new(keys: &[&TestKey]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|k| (k.name.clone(), k.secret.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl SecretResolver for MockSecretResolver {
    async fn signing_secret(&self, _namespace: &str, name: &str) -> anyhow::Result<SigningSecret> {
        self.keys
            .get(name)
            .map(|secret| SigningSecret::new(name, secret.clone()))
            .ok_or_else(|| anyhow::anyhow!("no such secret for {name}"))
    }
}

/// Steps of the metadata client that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Attestations,
    Delete,
    Note,
    Upload,
}

/// An in-memory metadata client that returns the same attestations and
/// vulnerabilities for every image and records what is written to it.
#[derive(Default)]
pub struct MockMetadataClient {
    pub attestations: Mutex<Vec<Attestation>>,
    pub vulnerabilities: Mutex<Vec<Vulnerability>>,
    pub occurrences: Mutex<Vec<Occurrence>>,
    pub deletes: Mutex<usize>,
    pub fail_on: Option<FailOn>,
}

impl MockMetadataClient {
    pub fn new(attestations: Vec<Attestation>) -> Self {
        Self {
            attestations: Mutex::new(attestations),
            ..Default::default()
        }
    }

    pub fn failing(attestations: Vec<Attestation>, fail_on: FailOn) -> Self {
        Self {
            fail_on: Some(fail_on),
            ..Self::new(attestations)
        }
    }

    pub fn occurrences(&self) -> Vec<Occurrence> {
        self.occurrences.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> usize {
        *self.deletes.lock().unwrap()
    }

    fn check(&self, step: FailOn) -> metadata::Result<()> {
        if self.fail_on == Some(step) {
            return Err(metadata::Error::Backend(format!("injected {step:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataClient for MockMetadataClient {
    async fn vulnerabilities(&self, _image: &str) -> metadata::Result<Vec<Vulnerability>> {
        Ok(self.vulnerabilities.lock().unwrap().clone())
    }

    async fn attestations(
        &self,
        _image: &str,
        _authority: &AttestationAuthority,
    ) -> metadata::Result<Vec<Attestation>> {
        self.check(FailOn::Attestations)?;
        Ok(self.attestations.lock().unwrap().clone())
    }

    async fn upload_attestation_occurrence(
        &self,
        note_name: &str,
        image: &str,
        attestation: &Attestation,
        project: &str,
        signature_type: SignatureType,
    ) -> metadata::Result<Occurrence> {
        self.check(FailOn::Upload)?;
        let occurrence = Occurrence {
            name: format!("projects/{project}/occurrences/{}", self.occurrences().len()),
            note_name: note_name.to_string(),
            resource_uri: format!("https://{image}"),
            project: project.to_string(),
            signature_type,
            attestation: attestation.clone(),
        };
        self.occurrences.lock().unwrap().push(occurrence.clone());
        self.attestations.lock().unwrap().push(attestation.clone());
        Ok(occurrence)
    }

    async fn delete_attestation_occurrence(
        &self,
        _image: &str,
        _authority: &AttestationAuthority,
    ) -> metadata::Result<()> {
        self.check(FailOn::Delete)?;
        *self.deletes.lock().unwrap() += 1;
        self.attestations.lock().unwrap().clear();
        Ok(())
    }

    async fn get_or_create_note(&self, authority: &AttestationAuthority) -> metadata::Result<Note> {
        self.check(FailOn::Note)?;
        Ok(Note {
            name: authority.spec.note_reference.clone(),
            hint: authority.name().to_string(),
        })
    }

    async fn wait_for_vulnz_analysis(
        &self,
        _image: &str,
        _timeout: Duration,
    ) -> metadata::Result<()> {
        Ok(())
    }
}
