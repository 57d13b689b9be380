// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::sync::Arc;

use admission::{run_signer, Cli, LocalMetadataStore, SignerConfig};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = SignerConfig::new(&cli).context("failed to initialize vulnz-signer config")?;

    let store = LocalMetadataStore::new(&config.metadata_dir);
    run_signer(&config, Arc::new(store))
        .await
        .with_context(|| format!("vulnz-signer failed for image {}", config.image))?;

    info!("Done.");
    Ok(())
}
