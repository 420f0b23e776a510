//! Unit tests for definition and binding matching
//!
//! Note: Selector and rule internals are tested in src/admission/*.rs

use kube::core::{DynamicObject, GroupVersionResource};
use vap_engine::admission::Matcher;
use vap_engine::policy::v1beta1::MatchPolicyType;
use vap_engine::policy::{convert_binding, convert_policy};
use vap_engine::{AdmissionAttributes, Error};

use super::common::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn deployment_attrs(resource: &DynamicObject) -> AdmissionAttributes {
    AdmissionAttributes::for_create(resource, GroupVersionResource::gvr("apps", "v1", "deployments"))
        .unwrap()
}

async fn definition_matches(
    cluster: &FakeCluster,
    builder: PolicyBuilder,
    resource: &DynamicObject,
) -> vap_engine::Result<bool> {
    let policy = convert_policy(&builder.build());
    Matcher::new(cluster, cluster)
        .definition_matches(&deployment_attrs(resource), &policy)
        .await
}

// =============================================================================
// Definition Matching
// =============================================================================

#[tokio::test]
async fn test_resource_rule_match() {
    let cluster = FakeCluster::new();
    let resource = create_deployment("web", "default", 1);

    let matched = definition_matches(
        &cluster,
        PolicyBuilder::new("p").with_rule(&["apps"], &["v1"], &["deployments"]),
        &resource,
    )
    .await
    .unwrap();
    assert!(matched);

    let matched = definition_matches(
        &cluster,
        PolicyBuilder::new("p").with_rule(&[""], &["v1"], &["pods"]),
        &resource,
    )
    .await
    .unwrap();
    assert!(!matched);
}

#[tokio::test]
async fn test_exclude_rules_win() {
    let cluster = FakeCluster::new();
    let resource = create_deployment("web", "default", 1);

    let matched = definition_matches(
        &cluster,
        PolicyBuilder::new("p")
            .with_rule(&["*"], &["*"], &["*"])
            .with_exclude_rule(&["apps"], &["v1"], &["deployments"]),
        &resource,
    )
    .await
    .unwrap();
    assert!(!matched);
}

#[tokio::test]
async fn test_object_selector() {
    let cluster = FakeCluster::new();
    let builder = || {
        PolicyBuilder::new("p")
            .with_rule(&["apps"], &["v1"], &["deployments"])
            .with_object_selector(&[("tier", "frontend")])
    };

    let labelled = create_deployment_with_labels("web", "default", 1, &[("tier", "frontend")]);
    assert!(definition_matches(&cluster, builder(), &labelled).await.unwrap());

    let unlabelled = create_deployment("web", "default", 1);
    assert!(!definition_matches(&cluster, builder(), &unlabelled).await.unwrap());
}

#[tokio::test]
async fn test_rule_mismatch_wins_over_namespace_error() {
    // The namespace does not exist, but the rules exclude the request first
    let cluster = FakeCluster::new();
    let resource = create_deployment("web", "missing", 1);

    let matched = definition_matches(
        &cluster,
        PolicyBuilder::new("p")
            .with_rule(&[""], &["v1"], &["pods"])
            .with_namespace_selector(&[("env", "production")]),
        &resource,
    )
    .await
    .unwrap();
    assert!(!matched);

    let err = definition_matches(
        &cluster,
        PolicyBuilder::new("p")
            .with_rule(&["apps"], &["v1"], &["deployments"])
            .with_namespace_selector(&[("env", "production")]),
        &resource,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NamespaceLookup { .. }));
}

#[tokio::test]
async fn test_empty_namespace_selector_skips_lookup() {
    let cluster = FakeCluster::new();
    let resource = create_deployment("web", "anywhere", 1);

    let matched = definition_matches(
        &cluster,
        PolicyBuilder::new("p").with_rule(&["apps"], &["v1"], &["deployments"]),
        &resource,
    )
    .await
    .unwrap();
    assert!(matched);
    assert_eq!(cluster.namespace_lookups(), 0);
}

#[tokio::test]
async fn test_equivalent_match_policy() {
    let cluster = FakeCluster::new()
        .with_equivalent(GroupVersionResource::gvr("extensions", "v1beta1", "deployments"));
    let resource = create_deployment("web", "default", 1);
    let builder = || PolicyBuilder::new("p").with_rule(&["extensions"], &["v1beta1"], &["deployments"]);

    assert!(definition_matches(&cluster, builder(), &resource).await.unwrap());

    let mut policy = convert_policy(&builder().build());
    if let Some(constraints) = policy.spec.match_constraints.as_mut() {
        constraints.match_policy = Some(MatchPolicyType::Exact);
    }
    let matched = Matcher::new(&cluster, &cluster)
        .definition_matches(&deployment_attrs(&resource), &policy)
        .await
        .unwrap();
    assert!(!matched);
}

// =============================================================================
// Binding Matching
// =============================================================================

#[tokio::test]
async fn test_binding_without_match_resources_matches() {
    let cluster = FakeCluster::new();
    let attrs = deployment_attrs(&create_deployment("web", "default", 1));
    let binding = convert_binding(&create_binding("all", "p"));

    assert!(Matcher::new(&cluster, &cluster)
        .binding_matches(&attrs, &binding)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_binding_namespace_selector() {
    let cluster = FakeCluster::new()
        .with_namespace("prod", &[("env", "production")])
        .with_namespace("dev", &[("env", "development")]);
    let binding = convert_binding(&create_binding_for_namespaces(
        "prod-only",
        "p",
        &[("env", "production")],
    ));
    let matcher = Matcher::new(&cluster, &cluster);

    let prod = deployment_attrs(&create_deployment("web", "prod", 1));
    assert!(matcher.binding_matches(&prod, &binding).await.unwrap());

    let dev = deployment_attrs(&create_deployment("web", "dev", 1));
    assert!(!matcher.binding_matches(&dev, &binding).await.unwrap());
    assert_eq!(cluster.namespace_lookups(), 2);
}
