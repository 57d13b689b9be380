// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use attestlib::{DigestAlgorithm, KmsSigner, PgpSigner, Signer};
use clap::Parser;
use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;
use strum::{Display, EnumString};
use tokio::fs;
use zeroize::Zeroizing;

use crate::allowlist::DEFAULT_GLOBAL_ALLOWLIST;
use crate::kms::OfflineKms;
use crate::metadata::MetadataClient;
use crate::policy::{load_policy, VulnzSigningPolicy};
use crate::signer::{check_note_name, project_from_image, AttestationSigner};
use crate::vulnz::validate_vulnz_signing_policy;
use crate::{Error, Result};

/// Environment variable naming the signer's config file when `--config` is
/// not given.
pub const CONFIG_PATH_ENV: &str = "VULNZ_SIGNER_CONFIG";

pub const DEFAULT_VULNZ_TIMEOUT: &str = "5m";

pub const DEFAULT_METADATA_DIR: &str = "/var/lib/vulnz-signer";

macro_rules! __default_deserialization_value {
    ($name: ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

__default_deserialization_value!(default_is_webhook, bool, true);

__default_deserialization_value!(
    default_global_allowlist,
    Vec<String>,
    DEFAULT_GLOBAL_ALLOWLIST.iter().map(|s| s.to_string()).collect()
);

__default_deserialization_value!(default_vulnz_timeout, String, DEFAULT_VULNZ_TIMEOUT.into());

__default_deserialization_value!(default_metadata_dir, String, DEFAULT_METADATA_DIR.into());

/// Settings of the review engine.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ReviewConfig {
    /// Webhook reviews admit attested images without further checks and
    /// attest clean ones. Periodic audits do neither.
    #[serde(default = "default_is_webhook")]
    pub is_webhook: bool,

    /// Images that are never reviewed.
    #[serde(default = "default_global_allowlist")]
    pub global_allowlist: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            is_webhook: default_is_webhook(),
            global_allowlist: default_global_allowlist(),
        }
    }
}

impl ReviewConfig {
    /// Load `ReviewConfig` from a configuration file. Supported formats are all formats supported by the
    /// `config` crate.
    pub fn from_file(config_path: &str) -> anyhow::Result<Self> {
        let c = Config::builder()
            .add_source(File::with_name(config_path))
            .build()?;

        let res = c.try_deserialize().context("invalid review config")?;
        Ok(res)
    }
}

#[derive(EnumString, Display, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SignerMode {
    /// Check the image against the policy, then sign it.
    #[default]
    CheckAndSign,
    /// Only check the image against the policy.
    CheckOnly,
    /// Sign the image without checking it.
    BypassAndSign,
}

impl SignerMode {
    pub fn checks(&self) -> bool {
        matches!(self, SignerMode::CheckAndSign | SignerMode::CheckOnly)
    }

    pub fn signs(&self) -> bool {
        matches!(self, SignerMode::CheckAndSign | SignerMode::BypassAndSign)
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "vulnz-signer")]
#[command(bin_name = "vulnz-signer")]
#[command(author, version, long_about = None)]
#[command(about = "Checks container images against a vulnerability signing policy and attests them")]
pub struct Cli {
    /// Config file (TOML, YAML or JSON). Flags override its values.
    #[arg(short, long)]
    pub config: Option<String>,

    /// check-and-sign, check-only or bypass-and-sign
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Image to check and sign, pinned by digest
    #[arg(short, long)]
    pub image: Option<String>,

    /// How long to wait for vulnerability analysis, e.g. `5m` or `600s`
    #[arg(long)]
    pub vulnz_timeout: Option<String>,

    /// Path of the VulnzSigningPolicy document
    #[arg(short, long)]
    pub policy: Option<String>,

    /// Note to store the attestation under, `projects/<project>/notes/<note>`
    #[arg(short, long)]
    pub note_name: Option<String>,

    /// Project to store the attestation occurrence in. Defaults to the
    /// image's project.
    #[arg(long)]
    pub attestation_project: Option<String>,

    /// Replace an existing attestation
    #[arg(long)]
    pub overwrite: bool,

    /// Armored PGP secret key to sign with
    #[arg(long)]
    pub pgp_private_key: Option<String>,

    #[arg(long)]
    pub pgp_passphrase: Option<String>,

    /// KMS key version to sign with. Takes precedence over a PGP key.
    #[arg(long)]
    pub kms_key_name: Option<String>,

    /// SHA256, SHA384 or SHA512, matching the KMS key
    #[arg(long)]
    pub kms_digest_alg: Option<String>,

    /// Directory of the file-backed KMS keys
    #[arg(long)]
    pub kms_dir: Option<String>,

    /// Directory of the local metadata store
    #[arg(long)]
    pub metadata_dir: Option<String>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SignerConfig {
    #[serde(default)]
    pub mode: SignerMode,

    #[serde(default)]
    pub image: String,

    #[serde(default = "default_vulnz_timeout")]
    pub vulnz_timeout: String,

    pub policy: Option<String>,

    #[serde(default)]
    pub note_name: String,

    pub attestation_project: Option<String>,

    #[serde(default)]
    pub overwrite: bool,

    pub pgp_private_key: Option<String>,

    pub pgp_passphrase: Option<String>,

    pub kms_key_name: Option<String>,

    pub kms_digest_alg: Option<String>,

    pub kms_dir: Option<String>,

    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            mode: SignerMode::default(),
            image: String::new(),
            vulnz_timeout: default_vulnz_timeout(),
            policy: None,
            note_name: String::new(),
            attestation_project: None,
            overwrite: false,
            pgp_private_key: None,
            pgp_passphrase: None,
            kms_key_name: None,
            kms_digest_alg: None,
            kms_dir: None,
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl SignerConfig {
    /// Builds the configuration from the config file named by `--config` or
    /// by [`CONFIG_PATH_ENV`], overridden by the flags given on the command
    /// line.
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().or_else(|| {
            if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read vulnz-signer's config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        let mut builder = Config::builder()
            .set_default("mode", SignerMode::default().to_string())?
            .set_default("vulnz_timeout", DEFAULT_VULNZ_TIMEOUT)?
            .set_default("metadata_dir", DEFAULT_METADATA_DIR)?;

        if let Some(path) = config_path {
            info!("Use configuration file {path}");
            if !Path::new(&path).exists() {
                bail!("Config file {path} not found.")
            }
            builder = builder.add_source(File::with_name(&path));
        }

        let c = builder
            .set_override_option("mode", cli.mode.clone())?
            .set_override_option("image", cli.image.clone())?
            .set_override_option("vulnz_timeout", cli.vulnz_timeout.clone())?
            .set_override_option("policy", cli.policy.clone())?
            .set_override_option("note_name", cli.note_name.clone())?
            .set_override_option("attestation_project", cli.attestation_project.clone())?
            .set_override_option("overwrite", cli.overwrite.then_some(true))?
            .set_override_option("pgp_private_key", cli.pgp_private_key.clone())?
            .set_override_option("pgp_passphrase", cli.pgp_passphrase.clone())?
            .set_override_option("kms_key_name", cli.kms_key_name.clone())?
            .set_override_option("kms_digest_alg", cli.kms_digest_alg.clone())?
            .set_override_option("kms_dir", cli.kms_dir.clone())?
            .set_override_option("metadata_dir", cli.metadata_dir.clone())?
            .build()?;

        let res = c.try_deserialize().context("invalid signer config")?;
        Ok(res)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Runs one check and/or sign pass over `config.image`.
pub async fn run_signer(config: &SignerConfig, client: Arc<dyn MetadataClient>) -> Result<()> {
    let image = config.image.as_str();
    if image.is_empty() {
        return Err(Error::Config("image is required".into()));
    }

    if config.mode.checks() {
        check_image(config, image, client.as_ref()).await?;
    }

    if !config.mode.signs() {
        return Ok(());
    }

    let signer = signing_capability(config).await?;
    check_note_name(&config.note_name)?;
    let project = match non_empty(&config.attestation_project) {
        Some(project) => project,
        None => project_from_image(image).ok_or_else(|| {
            Error::Config(format!(
                "cannot derive the attestation project from image {image}, set attestation_project"
            ))
        })?,
    };

    AttestationSigner::new(
        client,
        signer,
        &config.note_name,
        project,
        config.overwrite,
    )
    .sign_image(image)
    .await?;
    Ok(())
}

async fn check_image(
    config: &SignerConfig,
    image: &str,
    client: &dyn MetadataClient,
) -> Result<()> {
    let policy_path = non_empty(&config.policy)
        .ok_or_else(|| Error::Config(format!("a policy is required in {} mode", config.mode)))?;
    let policy: VulnzSigningPolicy = load_policy(policy_path).await?;

    let timeout = humantime::parse_duration(&config.vulnz_timeout).map_err(|e| {
        Error::Config(format!("invalid vulnz_timeout {:?}: {e}", config.vulnz_timeout))
    })?;

    info!("Waiting for vulnerability analysis of {image}, for up to {}", config.vulnz_timeout);
    client
        .wait_for_vulnz_analysis(image, timeout)
        .await
        .map_err(|source| Error::Metadata { source })?;
    let vulnerabilities = client
        .vulnerabilities(image)
        .await
        .map_err(|source| Error::Metadata { source })?;

    let violations = validate_vulnz_signing_policy(&policy, image, &vulnerabilities)?;
    if !violations.is_empty() {
        return Err(Error::PolicyViolations {
            image: image.to_string(),
            policy: policy.metadata.name,
            reasons: violations.into_iter().map(|v| v.reason).collect(),
        });
    }

    info!(
        "Image {image} passes VulnzSigningPolicy {:?}",
        policy.metadata.name
    );
    Ok(())
}

async fn signing_capability(config: &SignerConfig) -> Result<Box<dyn Signer>> {
    if let Some(key_name) = non_empty(&config.kms_key_name) {
        let digest_name = non_empty(&config.kms_digest_alg).ok_or_else(|| {
            Error::Config("kms_digest_alg is required when signing with a KMS key".into())
        })?;
        let digest = DigestAlgorithm::from_name(digest_name)
            .map_err(|source| Error::Attestation { source })?;
        let kms_dir = non_empty(&config.kms_dir).ok_or_else(|| {
            Error::Config("kms_dir is required when signing with a KMS key".into())
        })?;

        info!("Signing with KMS key {key_name}");
        let kms = OfflineKms::new(kms_dir);
        return Ok(Box::new(KmsSigner::new(Box::new(kms), key_name, digest)));
    }

    if let Some(path) = non_empty(&config.pgp_private_key) {
        if non_empty(&config.pgp_passphrase).is_some() {
            return Err(Error::Config(
                "passphrase-protected PGP keys are not supported".into(),
            ));
        }

        let key = Zeroizing::new(
            fs::read(path)
                .await
                .map_err(|e| Error::Config(format!("read PGP private key {path}: {e}")))?,
        );
        let signer = PgpSigner::new(&key).map_err(|source| Error::Attestation { source })?;
        info!("Signing with PGP key {}", signer.key_id());
        return Ok(Box::new(signer));
    }

    Err(Error::Config(
        "either kms_key_name or pgp_private_key must be provided".into(),
    ))
}
