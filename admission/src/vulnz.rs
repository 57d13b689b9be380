// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Vulnerability policy evaluation.

use std::collections::HashSet;

use async_trait::async_trait;
use attestlib::is_fully_qualified;
use log::info;

use crate::metadata::{MetadataClient, Vulnerability};
use crate::policy::{ImageSecurityPolicy, ImageVulnerabilityRequirements, VulnzSigningPolicy};
use crate::severity::{severity_within_threshold, ALLOW_ALL};
use crate::violation::Violation;
use crate::{Error, Result};

const DEFAULT_MAX_FIXABLE_SEVERITY: &str = "CRITICAL";
const DEFAULT_MAX_UNFIXABLE_SEVERITY: &str = ALLOW_ALL;

/// Evaluates `vulnerabilities` of `image` against `requirements`.
///
/// An image that is not pinned by digest yields a single unqualified-image
/// violation and nothing else. Violations keep the order of
/// `vulnerabilities`.
pub fn evaluate(
    requirements: &ImageVulnerabilityRequirements,
    image: &str,
    vulnerabilities: &[Vulnerability],
) -> Result<Vec<Violation>> {
    if !is_fully_qualified(image) {
        return Ok(vec![Violation::unqualified_image(image)]);
    }

    let max_fixable = if requirements.maximum_fixable_severity.is_empty() {
        info!("maximumFixableSeverity is unset, default to {DEFAULT_MAX_FIXABLE_SEVERITY}.");
        DEFAULT_MAX_FIXABLE_SEVERITY
    } else {
        requirements.maximum_fixable_severity.as_str()
    };

    let max_unfixable = if requirements.maximum_unfixable_severity.is_empty() {
        info!("maximumUnfixableSeverity is unset, default to {DEFAULT_MAX_UNFIXABLE_SEVERITY}.");
        DEFAULT_MAX_UNFIXABLE_SEVERITY
    } else {
        requirements.maximum_unfixable_severity.as_str()
    };

    let allowlist: HashSet<&str> = requirements
        .allowlist_cves
        .iter()
        .map(String::as_str)
        .collect();

    let mut violations = Vec::new();
    for vulnerability in vulnerabilities {
        if allowlist.contains(vulnerability.cve.as_str()) {
            continue;
        }

        // Operators may tolerate more when no fix is available.
        let threshold = if vulnerability.has_fix_available {
            max_fixable
        } else {
            max_unfixable
        };
        if severity_within_threshold(threshold, &vulnerability.severity)? {
            continue;
        }

        let violation = if vulnerability.has_fix_available {
            Violation::fixable_severity(image, vulnerability.clone(), threshold)
        } else {
            Violation::unfixable_severity(image, vulnerability.clone(), threshold)
        };
        violations.push(violation);
    }

    Ok(violations)
}

pub fn validate_vulnz_signing_policy(
    policy: &VulnzSigningPolicy,
    image: &str,
    vulnerabilities: &[Vulnerability],
) -> Result<Vec<Violation>> {
    evaluate(
        &policy.spec.image_vulnerability_requirements,
        image,
        vulnerabilities,
    )
}

/// Decides which vulnerability violations an image has under an
/// [`ImageSecurityPolicy`]. Injected into the review engine.
#[async_trait]
pub trait IspValidator: Send + Sync {
    async fn validate(
        &self,
        isp: &ImageSecurityPolicy,
        image: &str,
        client: &dyn MetadataClient,
    ) -> Result<Vec<Violation>>;
}

/// Fetches the image's vulnerabilities and evaluates the policy's package
/// vulnerability requirements.
#[derive(Default, Debug, Clone, Copy)]
pub struct VulnzValidator;

#[async_trait]
impl IspValidator for VulnzValidator {
    async fn validate(
        &self,
        isp: &ImageSecurityPolicy,
        image: &str,
        client: &dyn MetadataClient,
    ) -> Result<Vec<Violation>> {
        if !is_fully_qualified(image) {
            return Ok(vec![Violation::unqualified_image(image)]);
        }

        let vulnerabilities = client
            .vulnerabilities(image)
            .await
            .map_err(|source| Error::Metadata { source })?;
        let requirements =
            ImageVulnerabilityRequirements::from(&isp.spec.package_vulnerability_requirements);
        evaluate(&requirements, image, &vulnerabilities)
    }
}
