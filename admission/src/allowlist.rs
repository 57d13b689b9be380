// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Image allowlists.

use attestlib::image_name;
use log::info;

use crate::policy::GenericAttestationPolicy;

/// System images that every review admits.
pub const DEFAULT_GLOBAL_ALLOWLIST: [&str; 5] = [
    "gcr.io/kritis-project/kritis-server",
    "gcr.io/kritis-project/preinstall",
    "gcr.io/kritis-project/postinstall",
    "gcr.io/kritis-project/predelete",
    "us.gcr.io/grafeas/grafeas-server",
];

/// Whether `image`, with any tag or digest removed, is in `allowlist`.
pub fn image_in_global_allowlist(image: &str, allowlist: &[String]) -> bool {
    let name = image_name(image);
    allowlist.iter().any(|allowed| allowed == name)
}

/// Drops images in `allowlist`, keeping the order of the rest.
pub fn remove_globally_allowed_images(images: &[String], allowlist: &[String]) -> Vec<String> {
    images
        .iter()
        .filter(|image| {
            let allowed = image_in_global_allowlist(image, allowlist);
            if allowed {
                info!("{image} is in the global allowlist, skipping review.");
            }
            !allowed
        })
        .cloned()
        .collect()
}

/// Whether `image` matches `pattern`.
///
/// A pattern matches exactly, or, when it ends with `*`, any suffix
/// without a `/`, or, when it ends with `**`, any suffix at all.
pub fn pattern_matches(pattern: &str, image: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("**") {
        return image.starts_with(prefix);
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return image
            .strip_prefix(prefix)
            .map(|rest| !rest.contains('/'))
            .unwrap_or(false);
    }

    pattern == image
}

/// Whether `image` matches one of the admission allowlist patterns of `gap`.
pub fn image_in_gap_allowlist(gap: &GenericAttestationPolicy, image: &str) -> bool {
    gap.spec
        .admission_allowlist_patterns
        .iter()
        .any(|pattern| pattern_matches(&pattern.name_pattern, image))
}
