//! Unit tests for policy revision conversion
//!
//! Note: Field-level round trips are tested in src/policy/conversion.rs

use vap_engine::policy::v1alpha1::FailurePolicyType;
use vap_engine::policy::{convert_binding, convert_policy, v1beta1};

use super::common::*;

#[test]
fn test_policy_conversion_preserves_semantics() {
    let policy = PolicyBuilder::replica_limit("replica-limit")
        .with_namespace_selector(&[("env", "production")])
        .with_match_condition("labelled", "has(object.metadata.labels)")
        .with_variable("replicas", "object.spec.replicas")
        .with_audit_annotation("replicas", "string(object.spec.replicas)")
        .with_failure_policy(FailurePolicyType::Ignore)
        .build();

    let converted = convert_policy(&policy);

    assert_eq!(converted.name(), "replica-limit");
    assert_eq!(converted.failure_policy(), v1beta1::FailurePolicyType::Ignore);
    assert_eq!(converted.spec.validations[0].expression, "object.spec.replicas <= 5");
    assert_eq!(converted.spec.match_conditions[0].name, "labelled");
    assert_eq!(converted.spec.variables[0].name, "replicas");
    assert_eq!(converted.spec.audit_annotations[0].key, "replicas");

    let constraints = converted.spec.match_constraints.unwrap();
    assert_eq!(constraints.resource_rules[0].resources, vec!["deployments"]);
    assert_eq!(
        constraints.resource_rules[0].operations,
        vec![v1beta1::OperationType::Create]
    );
    assert_eq!(constraints.match_policy(), v1beta1::MatchPolicyType::Equivalent);
    assert!(constraints.namespace_selector.is_some());
}

#[test]
fn test_binding_conversion() {
    let binding = create_binding_for_namespaces("prod", "replica-limit", &[("env", "production")]);
    let converted = convert_binding(&binding);

    assert_eq!(converted.name(), "prod");
    assert_eq!(converted.spec.policy_name, "replica-limit");
    let resources = converted.spec.match_resources.unwrap();
    assert_eq!(
        resources
            .namespace_selector
            .unwrap()
            .match_labels
            .unwrap()
            .get("env")
            .map(String::as_str),
        Some("production")
    );
}
