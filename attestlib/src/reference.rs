// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Digest-pinned image references.
//!
//! Attestations are always bound to a content digest, never to a tag, so
//! everything in this crate that names an image goes through
//! [`DigestReference`].

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// An image reference of the form `repository@algorithm:hex`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestReference {
    repository: String,
    digest: String,
}

impl DigestReference {
    /// Parses `image` strictly: the reference must carry a digest and must
    /// not carry a tag.
    pub fn parse(image: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidImage {
            image: image.to_string(),
            reason: reason.to_string(),
        };

        let (repository, digest) = image
            .split_once('@')
            .ok_or_else(|| invalid("image is not pinned by digest"))?;

        validate_repository(repository).map_err(invalid)?;
        validate_digest(digest).map_err(invalid)?;

        Ok(Self {
            repository: repository.to_string(),
            digest: digest.to_string(),
        })
    }

    /// Repository part of the reference, e.g. `gcr.io/project/image`.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Digest part of the reference, e.g. `sha256:0a19...`.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl FromStr for DigestReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DigestReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

/// Whether `image` is pinned by content digest.
pub fn is_fully_qualified(image: &str) -> bool {
    DigestReference::parse(image).is_ok()
}

/// Returns the name of `image` with any tag and digest removed.
///
/// A `:` inside the first path component is a registry port, not a tag.
pub fn image_name(image: &str) -> &str {
    let name = match image.split_once('@') {
        Some((name, _)) => name,
        None => image,
    };

    let last_component_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[last_component_start..].find(':') {
        Some(i) => &name[..last_component_start + i],
        None => name,
    }
}

fn validate_repository(repository: &str) -> std::result::Result<(), &'static str> {
    if repository.is_empty() {
        return Err("empty repository");
    }

    let components: Vec<&str> = repository.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        if component.is_empty() {
            return Err("empty path component in repository");
        }

        let is_registry = i == 0 && components.len() > 1;
        if is_registry {
            if !component
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
            {
                return Err("invalid registry host");
            }
            continue;
        }

        if component.contains(':') {
            return Err("tagged references are not allowed, use a digest");
        }

        if !component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        {
            return Err("invalid character in repository path");
        }
    }

    Ok(())
}

fn validate_digest(digest: &str) -> std::result::Result<(), &'static str> {
    let (algorithm, hex) = digest
        .split_once(':')
        .ok_or("digest must have the form algorithm:hex")?;

    if algorithm.is_empty()
        || !algorithm.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-')
        })
    {
        return Err("invalid digest algorithm");
    }

    if hex.is_empty()
        || !hex
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, 'a'..='f'))
    {
        return Err("digest value must be non-empty lowercase hex");
    }

    Ok(())
}
