// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

mod common;

use std::sync::Arc;

use admission::metadata::{MetadataClient, SignatureType};
use admission::policy::{
    AdmissionAllowlistPattern, AttestationAuthority, GenericAttestationPolicy,
    GenericAttestationPolicySpec, ImageSecurityPolicy, ImageSecurityPolicySpec, ObjectMeta,
    PublicKeySpec,
};
use admission::{
    AuthorityMap, Error, IspValidator, LoggingStrategy, MemoryStrategy, ReviewConfig, Reviewer,
    Violation, ViolationType,
};
use async_trait::async_trait;
use attestlib::Attestation;
use common::*;
use rstest::rstest;

const ALLOWED_IMAGE: &str = "allowed_image_name";
const UNQUALIFIED_IMAGE: &str = "image:tag";

/// Every image is clean, except that `QUALIFIED_IMAGE` has one vulnerability
/// and `image:tag` is unqualified.
struct MockValidator;

#[async_trait]
impl IspValidator for MockValidator {
    async fn validate(
        &self,
        _isp: &ImageSecurityPolicy,
        image: &str,
        _client: &dyn MetadataClient,
    ) -> admission::Result<Vec<Violation>> {
        let violations = match image {
            QUALIFIED_IMAGE => vec![Violation {
                violation_type: ViolationType::FixableSeverity,
                reason: format!("found vulnerability in {image}"),
                vulnerability: None,
            }],
            UNQUALIFIED_IMAGE => vec![Violation::unqualified_image(image)],
            _ => Vec::new(),
        };
        Ok(violations)
    }
}

fn reviewer(
    is_webhook: bool,
    authorities: Vec<AttestationAuthority>,
    secrets: MockSecretResolver,
    strategy: Arc<MemoryStrategy>,
) -> Reviewer {
    let config = ReviewConfig {
        is_webhook,
        ..Default::default()
    };
    Reviewer::new(
        config,
        Box::new(MockValidator),
        Box::new(secrets),
        Box::new(AuthorityMap::new(authorities)),
        strategy,
    )
}

fn gap(namespace: &str, patterns: &[&str], authorities: &[&str]) -> GenericAttestationPolicy {
    GenericAttestationPolicy {
        metadata: ObjectMeta {
            name: format!("{namespace}-gap"),
            namespace: namespace.to_string(),
        },
        spec: GenericAttestationPolicySpec {
            admission_allowlist_patterns: patterns
                .iter()
                .map(|p| AdmissionAllowlistPattern {
                    name_pattern: p.to_string(),
                })
                .collect(),
            attestation_authority_names: authorities.iter().map(|a| a.to_string()).collect(),
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum Gaps {
    /// A single policy with attestor `test`, allowlisting `allowed_image_name`.
    One,
    /// `One`, plus a policy with attestor `test2`.
    Two,
    /// A single policy requiring both `test` and `test2`.
    TwoAuthorities,
    /// A single policy without attestors, allowlisting `allowed_image_name`.
    WithoutAuthority,
    Empty,
}

impl Gaps {
    fn policies(self) -> Vec<GenericAttestationPolicy> {
        let one = gap("foo", &[ALLOWED_IMAGE], &["test"]);
        match self {
            Gaps::One => vec![one],
            Gaps::Two => vec![one, gap("bar", &[], &["test2"])],
            Gaps::TwoAuthorities => vec![gap("foo", &[], &["test", "test2"])],
            Gaps::WithoutAuthority => vec![gap("foo", &[ALLOWED_IMAGE], &[])],
            Gaps::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Atts {
    None,
    /// `QUALIFIED_IMAGE` attested by `test`.
    OneValid,
    /// `QUALIFIED_IMAGE` attested by `test` and `test2`.
    TwoValid,
    /// Another image attested by `test`.
    Invalid,
}

async fn gap_attestations(atts: Atts, key: &TestKey, key2: &TestKey) -> Vec<Attestation> {
    match atts {
        Atts::None => Vec::new(),
        Atts::OneValid => vec![key.attest(QUALIFIED_IMAGE).await],
        Atts::TwoValid => vec![
            key.attest(QUALIFIED_IMAGE).await,
            key2.attest(QUALIFIED_IMAGE).await,
        ],
        Atts::Invalid => vec![key.attest(INT_TEST_IMAGE).await],
    }
}

#[rstest]
#[case::valid_image_with_attestation(QUALIFIED_IMAGE, Gaps::One, Atts::OneValid, true, false)]
#[case::image_without_attestation(QUALIFIED_IMAGE, Gaps::One, Atts::None, false, true)]
#[case::gap_without_attestor(QUALIFIED_IMAGE, Gaps::WithoutAuthority, Atts::None, false, true)]
#[case::gap_without_attestor_allowlisted_image(ALLOWED_IMAGE, Gaps::WithoutAuthority, Atts::None, false, true)]
#[case::allowlisted_image(ALLOWED_IMAGE, Gaps::One, Atts::None, false, false)]
#[case::image_allowlisted_in_one_policy(ALLOWED_IMAGE, Gaps::Two, Atts::None, false, false)]
#[case::image_without_policies(QUALIFIED_IMAGE, Gaps::Empty, Atts::None, false, false)]
#[case::image_with_invalid_attestation(QUALIFIED_IMAGE, Gaps::One, Atts::Invalid, false, true)]
#[case::image_complies_with_one_policy_of_two(QUALIFIED_IMAGE, Gaps::Two, Atts::OneValid, true, false)]
#[case::image_in_global_allowlist("us.gcr.io/grafeas/grafeas-server:0.1.0", Gaps::Two, Atts::None, false, false)]
#[case::attested_by_one_attestor_of_two(QUALIFIED_IMAGE, Gaps::TwoAuthorities, Atts::OneValid, false, true)]
#[case::attested_by_two_attestors_of_two(QUALIFIED_IMAGE, Gaps::TwoAuthorities, Atts::TwoValid, true, false)]
#[tokio::test]
async fn test_review_gap(
    #[case] image: &str,
    #[case] gaps: Gaps,
    #[case] atts: Atts,
    #[case] has_required_attestations: bool,
    #[case] should_err: bool,
) {
    let key = TestKey::generate("sec");
    let key2 = TestKey::generate("sec2");
    let authorities = vec![
        pgp_authority("test", "projects/test-1/notes/note-1", &key),
        pgp_authority("test2", "projects/test-1/notes/note-2", &key2),
    ];
    let client = MockMetadataClient::new(gap_attestations(atts, &key, &key2).await);
    let strategy = Arc::new(MemoryStrategy::new());
    let reviewer = reviewer(
        true,
        authorities,
        MockSecretResolver::new(&[&key, &key2]),
        strategy.clone(),
    );

    let res = reviewer
        .review_gap(&[image.to_string()], &gaps.policies(), &client)
        .await;
    assert_eq!(res.is_err(), should_err, "{res:?}");
    if should_err {
        assert!(matches!(res, Err(Error::NotAttested { .. })));
    }
    assert_eq!(strategy.is_attested(image), has_required_attestations);
    assert!(client.occurrences().is_empty());
}

#[tokio::test]
async fn test_review_gap_without_attestor_records_violation() {
    let strategy = Arc::new(MemoryStrategy::new());
    let reviewer = reviewer(
        true,
        Vec::new(),
        MockSecretResolver::new(&[]),
        strategy.clone(),
    );
    let client = MockMetadataClient::default();

    let res = reviewer
        .review_gap(&[ALLOWED_IMAGE.to_string()], &Gaps::WithoutAuthority.policies(), &client)
        .await;
    assert!(res.is_err());

    let violations = strategy.violations();
    let handled = violations.get(ALLOWED_IMAGE).unwrap();
    assert_eq!(handled.len(), 1);
    assert_eq!(
        handled[0].violation_type,
        ViolationType::NoAttestationAuthority
    );
}

#[tokio::test]
async fn test_review_gap_unknown_authority_aborts() {
    let reviewer = reviewer(
        true,
        Vec::new(),
        MockSecretResolver::new(&[]),
        Arc::new(MemoryStrategy::new()),
    );
    let client = MockMetadataClient::default();

    let res = reviewer
        .review_gap(&[QUALIFIED_IMAGE.to_string()], &Gaps::One.policies(), &client)
        .await;
    assert!(matches!(res, Err(Error::AuthorityResolution { .. })));
}

fn isps() -> Vec<ImageSecurityPolicy> {
    vec![ImageSecurityPolicy {
        metadata: ObjectMeta {
            name: "isp".into(),
            namespace: "foo".into(),
        },
        spec: ImageSecurityPolicySpec {
            attestation_authority_name: "test".into(),
            private_key_secret_name: "test".into(),
            ..Default::default()
        },
    }]
}

#[rstest]
#[case::vulnz_with_attestation_webhook(QUALIFIED_IMAGE, true, true, 0, true, false, false)]
#[case::vulnz_without_attestation_webhook(QUALIFIED_IMAGE, true, false, 1, false, false, true)]
#[case::no_vulnz_without_attestation_webhook_attests(INT_TEST_IMAGE, true, false, 0, false, true, false)]
#[case::vulnz_with_attestation_cron(QUALIFIED_IMAGE, false, true, 1, true, false, true)]
#[case::vulnz_without_attestation_cron(QUALIFIED_IMAGE, false, false, 1, false, false, true)]
#[case::no_vulnz_without_attestation_cron(INT_TEST_IMAGE, false, false, 0, false, false, false)]
#[case::no_vulnz_with_attestation_cron(INT_TEST_IMAGE, false, true, 0, true, false, false)]
#[case::unqualified_image_cron(UNQUALIFIED_IMAGE, false, false, 1, false, false, true)]
#[case::unqualified_image_webhook(UNQUALIFIED_IMAGE, true, false, 1, false, false, true)]
#[case::image_in_global_allowlist("gcr.io/kritis-project/preinstall", true, false, 0, false, false, false)]
#[tokio::test]
async fn test_review_isp(
    #[case] image: &str,
    #[case] is_webhook: bool,
    #[case] has_attestation: bool,
    #[case] handled_violations: usize,
    #[case] is_attested: bool,
    #[case] should_attest_image: bool,
    #[case] should_err: bool,
) {
    let key = TestKey::generate("test");
    let attestations = if has_attestation {
        vec![key.attest(image).await]
    } else {
        Vec::new()
    };
    let client = MockMetadataClient::new(attestations);
    let strategy = Arc::new(MemoryStrategy::new());
    let reviewer = reviewer(
        is_webhook,
        vec![pgp_authority("test", "projects/test-1/notes/note-1", &key)],
        MockSecretResolver::new(&[&key]),
        strategy.clone(),
    );

    let res = reviewer
        .review_isp(&[image.to_string()], &isps(), &client)
        .await;
    assert_eq!(res.is_err(), should_err, "{res:?}");
    if should_err {
        assert!(matches!(res, Err(Error::PolicyViolations { .. })));
    }
    assert_eq!(strategy.violations().len(), handled_violations);
    assert_eq!(strategy.is_attested(image), is_attested);

    let occurrences = client.occurrences();
    assert_eq!(!occurrences.is_empty(), should_attest_image);
    if should_attest_image {
        let occurrence = &occurrences[0];
        assert_eq!(occurrence.note_name, "projects/test-1/notes/note-1");
        assert_eq!(occurrence.project, "test-1");
        assert_eq!(occurrence.signature_type, SignatureType::Pgp);
        assert_eq!(occurrence.attestation.public_key_id, key.fingerprint);
    }
}

#[tokio::test]
async fn test_review_isp_error_lists_reasons() {
    let key = TestKey::generate("test");
    let client = MockMetadataClient::default();
    let reviewer = reviewer(
        true,
        vec![pgp_authority("test", "projects/test-1/notes/note-1", &key)],
        MockSecretResolver::new(&[&key]),
        Arc::new(MemoryStrategy::new()),
    );

    let err = reviewer
        .review_isp(&[UNQUALIFIED_IMAGE.to_string()], &isps(), &client)
        .await
        .unwrap_err();
    match &err {
        Error::PolicyViolations { image, reasons, .. } => {
            assert_eq!(image, UNQUALIFIED_IMAGE);
            assert_eq!(reasons.len(), 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("is not a fully qualified image"));
}

#[tokio::test]
async fn test_review_isp_attestation_failure_is_not_fatal() {
    let key = TestKey::generate("test");
    let client = MockMetadataClient::failing(Vec::new(), FailOn::Upload);
    let strategy = Arc::new(MemoryStrategy::new());
    let reviewer = reviewer(
        true,
        vec![pgp_authority("test", "projects/test-1/notes/note-1", &key)],
        // No secret for the policy's key.
        MockSecretResolver::new(&[]),
        strategy.clone(),
    );

    reviewer
        .review_isp(&[INT_TEST_IMAGE.to_string()], &isps(), &client)
        .await
        .unwrap();
    assert!(client.occurrences().is_empty());
    assert!(strategy.violations().is_empty());
}

#[tokio::test]
async fn test_review_isp_metadata_failure_aborts() {
    let key = TestKey::generate("test");
    let client = MockMetadataClient::failing(Vec::new(), FailOn::Attestations);
    let reviewer = reviewer(
        true,
        vec![pgp_authority("test", "projects/test-1/notes/note-1", &key)],
        MockSecretResolver::new(&[&key]),
        Arc::new(MemoryStrategy::new()),
    );

    let res = reviewer
        .review_isp(&[INT_TEST_IMAGE.to_string()], &isps(), &client)
        .await;
    assert!(matches!(res, Err(Error::Metadata { .. })));
}

#[tokio::test]
async fn test_review_isp_invalid_authority_key_aborts() {
    let mut authority = AttestationAuthority::default();
    authority.metadata.name = "test".into();
    authority.spec.note_reference = "projects/test-1/notes/note-1".into();
    authority.spec.public_keys = vec![PublicKeySpec {
        key_type: "SSH".into(),
        ..Default::default()
    }];
    let client = MockMetadataClient::default();
    let reviewer = reviewer(
        true,
        vec![authority],
        MockSecretResolver::new(&[]),
        Arc::new(MemoryStrategy::new()),
    );

    let res = reviewer
        .review_isp(&[INT_TEST_IMAGE.to_string()], &isps(), &client)
        .await;
    assert!(matches!(res, Err(Error::InvalidAuthorityKey { .. })));
}

#[tokio::test]
async fn test_periodic_audit_with_logging_strategy() {
    let key = TestKey::generate("test");
    let client = MockMetadataClient::new(vec![key.attest(QUALIFIED_IMAGE).await]);
    let reviewer = Reviewer::new(
        ReviewConfig {
            is_webhook: false,
            ..Default::default()
        },
        Box::new(MockValidator),
        Box::new(MockSecretResolver::new(&[&key])),
        Box::new(AuthorityMap::new(vec![pgp_authority(
            "test",
            "projects/test-1/notes/note-1",
            &key,
        )])),
        Arc::new(LoggingStrategy),
    );

    // Audits report violations even for attested images.
    let images = [INT_TEST_IMAGE.to_string(), QUALIFIED_IMAGE.to_string()];
    let res = reviewer.review_isp(&images, &isps(), &client).await;
    assert!(matches!(
        res,
        Err(Error::PolicyViolations { ref image, .. }) if image == QUALIFIED_IMAGE
    ));
    assert!(client.occurrences().is_empty());
}

fn lookup_authorities() -> Vec<AttestationAuthority> {
    ["a1", "a2"]
        .iter()
        .map(|name| {
            let mut authority = AttestationAuthority::default();
            authority.metadata.name = name.to_string();
            authority.spec.note_reference = "projects/test-1/notes/note-1".into();
            authority.spec.public_keys = vec![PublicKeySpec {
                key_type: "PGP".into(),
                ascii_armored_pgp_public_key: "testdata".into(),
                ..Default::default()
            }];
            authority
        })
        .collect()
}

#[rstest]
#[case::correct_authorities(&["a1", "a2"], false, 2)]
#[case::one_incorrect_authority(&["a1", "err"], true, 0)]
#[case::empty_list(&[], false, 0)]
#[tokio::test]
async fn test_attestation_authorities_for_gap(
    #[case] names: &[&str],
    #[case] should_err: bool,
    #[case] expected_len: usize,
) {
    let reviewer = reviewer(
        true,
        lookup_authorities(),
        MockSecretResolver::new(&[]),
        Arc::new(MemoryStrategy::new()),
    );

    let res = reviewer
        .attestation_authorities_for_gap(&gap("foo", &[], names))
        .await;
    assert_eq!(res.is_err(), should_err);
    assert_eq!(res.map(|a| a.len()).unwrap_or_default(), expected_len);
}

#[rstest]
#[case::correct_authority("a1", false, true)]
#[case::incorrect_authority("err", true, false)]
#[case::empty_name("", false, false)]
#[tokio::test]
async fn test_attestation_authority_for_isp(
    #[case] name: &str,
    #[case] should_err: bool,
    #[case] returns_authority: bool,
) {
    let reviewer = reviewer(
        true,
        lookup_authorities(),
        MockSecretResolver::new(&[]),
        Arc::new(MemoryStrategy::new()),
    );
    let isp = ImageSecurityPolicy {
        spec: ImageSecurityPolicySpec {
            attestation_authority_name: name.to_string(),
            private_key_secret_name: "test".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    let res = reviewer.attestation_authority_for_isp(&isp).await;
    assert_eq!(res.is_err(), should_err);
    assert_eq!(
        res.ok().flatten().is_some(),
        returns_authority
    );
}
