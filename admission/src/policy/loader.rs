// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::Path;

use anyhow::Context;
use log::debug;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Parses a policy document. JSON is accepted as a subset of YAML.
pub fn parse_policy<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    serde_yaml::from_str(content).context("parse policy document")
}

/// Reads and parses the policy document at `path`.
pub async fn load_policy<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let load_error = |source| Error::PolicyLoad {
        path: path.display().to_string(),
        source,
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))
        .map_err(load_error)?;

    let policy = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .context("parse JSON policy document")
            .map_err(load_error)?,
        _ => parse_policy(&content).map_err(load_error)?,
    };

    debug!("Loaded policy document {}", path.display());
    Ok(policy)
}
