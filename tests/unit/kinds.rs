//! Unit tests for kind resolution

use vap_engine::target_kinds;

use super::common::*;

#[test]
fn test_kinds_for_mixed_rules() {
    let policy = PolicyBuilder::new("p")
        .with_rule(&[""], &["v1"], &["pods", "pods/status"])
        .with_rule(&["apps"], &["v1"], &["deployments", "deployments/scale"])
        .build();

    assert_eq!(
        target_kinds(&policy),
        vec![
            "v1/Pod",
            "v1/Pod/status",
            "apps/v1/Deployment",
            "apps/v1/Deployment/scale",
        ]
    );
}

#[test]
fn test_kinds_without_rules() {
    let policy = PolicyBuilder::new("p").build();
    assert!(target_kinds(&policy).is_empty());

    let policy = PolicyBuilder::new("p").without_match_constraints().build();
    assert!(target_kinds(&policy).is_empty());
}
