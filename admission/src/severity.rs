// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Vulnerability severities and policy thresholds.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::{Error, Result};

/// Threshold that passes every vulnerability.
pub const ALLOW_ALL: &str = "ALLOW_ALL";

/// Threshold that fails every vulnerability.
pub const BLOCK_ALL: &str = "BLOCK_ALL";

/// Severity of a found vulnerability, in ascending rank.
#[derive(EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[strum(serialize = "SEVERITY_UNSPECIFIED")]
    Unspecified,
    #[strum(serialize = "MINIMAL")]
    Minimal,
    #[strum(serialize = "LOW")]
    Low,
    #[strum(serialize = "MEDIUM")]
    Medium,
    #[strum(serialize = "HIGH")]
    High,
    #[strum(serialize = "CRITICAL")]
    Critical,
}

/// Whether a vulnerability of `severity` passes a policy threshold of
/// `max_severity`.
///
/// `BLOCK_ALL` and `ALLOW_ALL` decide without looking at `severity`.
pub fn severity_within_threshold(max_severity: &str, severity: &str) -> Result<bool> {
    match max_severity {
        BLOCK_ALL => return Ok(false),
        ALLOW_ALL => return Ok(true),
        _ => (),
    }

    let max = Severity::from_str(max_severity)
        .map_err(|_| Error::InvalidMaxSeverity(max_severity.to_string()))?;
    let severity =
        Severity::from_str(severity).map_err(|_| Error::InvalidSeverity(severity.to_string()))?;

    Ok(severity <= max)
}
