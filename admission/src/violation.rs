// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Policy violations and the strategies that record review outcomes.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{info, warn};
use strum::{Display, EnumString};

use crate::metadata::Vulnerability;

#[derive(EnumString, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationType {
    #[strum(to_string = "unqualified image")]
    UnqualifiedImage,
    #[strum(to_string = "fixable vulnerability above threshold")]
    FixableSeverity,
    #[strum(to_string = "unfixable vulnerability above threshold")]
    UnfixableSeverity,
    #[strum(to_string = "no attestation authority")]
    NoAttestationAuthority,
}

/// One reason an image does not satisfy a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub reason: String,
    pub vulnerability: Option<Vulnerability>,
}

impl Violation {
    pub fn unqualified_image(image: &str) -> Self {
        Self {
            violation_type: ViolationType::UnqualifiedImage,
            reason: format!(
                "{image} is not a fully qualified image: it must be pinned by digest, e.g. gcr.io/project/image@sha256:<digest>"
            ),
            vulnerability: None,
        }
    }

    pub fn fixable_severity(image: &str, vulnerability: Vulnerability, threshold: &str) -> Self {
        Self {
            violation_type: ViolationType::FixableSeverity,
            reason: format!(
                "found fixable {} vulnerability {} in {image}, which exceeds the maximum fixable severity {threshold}",
                vulnerability.severity, vulnerability.cve
            ),
            vulnerability: Some(vulnerability),
        }
    }

    pub fn unfixable_severity(image: &str, vulnerability: Vulnerability, threshold: &str) -> Self {
        Self {
            violation_type: ViolationType::UnfixableSeverity,
            reason: format!(
                "found unfixable {} vulnerability {} in {image}, which exceeds the maximum unfixable severity {threshold}",
                vulnerability.severity, vulnerability.cve
            ),
            vulnerability: Some(vulnerability),
        }
    }

    pub fn no_attestation_authority(image: &str, policy: &str) -> Self {
        Self {
            violation_type: ViolationType::NoAttestationAuthority,
            reason: format!(
                "policy {policy:?} names no attestation authority able to attest {image}"
            ),
            vulnerability: None,
        }
    }
}

/// Records review outcomes. Webhook reviews and periodic audits use
/// different strategies over the same engine.
pub trait Strategy: Send + Sync {
    fn handle_violations(&self, image: &str, violations: &[Violation]);

    fn handle_attestation(&self, image: &str, is_attested: bool);
}

/// Keeps outcomes in memory, keyed by image.
#[derive(Default, Debug)]
pub struct MemoryStrategy {
    violations: Mutex<HashMap<String, Vec<Violation>>>,
    attestations: Mutex<HashMap<String, bool>>,
}

impl MemoryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images with handled violations.
    pub fn violations(&self) -> HashMap<String, Vec<Violation>> {
        self.violations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Whether `image` was recorded as attested.
    pub fn is_attested(&self, image: &str) -> bool {
        let attestations = self
            .attestations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        attestations.get(image).copied().unwrap_or(false)
    }
}

impl Strategy for MemoryStrategy {
    fn handle_violations(&self, image: &str, violations: &[Violation]) {
        let mut map = self
            .violations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(image.to_string(), violations.to_vec());
    }

    fn handle_attestation(&self, image: &str, is_attested: bool) {
        let mut map = self
            .attestations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(image.to_string(), is_attested);
    }
}

/// Reports outcomes through the log.
#[derive(Default, Debug, Clone, Copy)]
pub struct LoggingStrategy;

impl Strategy for LoggingStrategy {
    fn handle_violations(&self, image: &str, violations: &[Violation]) {
        warn!("Found {} violations in image {image}:", violations.len());
        for violation in violations {
            warn!("{}: {}", violation.violation_type, violation.reason);
        }
    }

    fn handle_attestation(&self, image: &str, is_attested: bool) {
        if is_attested {
            info!("Image {image} has a valid attestation.");
        } else {
            info!("Image {image} has no valid attestation.");
        }
    }
}
