//! Resource rule matching
//!
//! Rules:
//! - Operation, group, version and resource must each match (`*` matches all)
//! - `pods/status` selects a subresource; `pods/*` and `*/status` are wildcards
//! - Scope restricts to cluster-scoped or namespaced requests
//! - A non-empty `resourceNames` list restricts matching to those names

use kube::core::GroupVersionResource;
use kube::core::admission::Operation;

use super::AdmissionAttributes;
use crate::cluster::Discovery;
use crate::policy::v1beta1::{MatchPolicyType, NamedRuleWithOperations, OperationType, ScopeType};

const WILDCARD: &str = "*";

/// Whether `gvr` is the core `namespaces` resource
pub fn is_namespace_resource(gvr: &GroupVersionResource) -> bool {
    gvr.group.is_empty() && gvr.version == "v1" && gvr.resource == "namespaces"
}

/// Check whether any rule selects the request
///
/// Rules are first matched against the request's own resource. With the
/// `Equivalent` policy, each equivalent resource reported by discovery is
/// then tried in its place.
pub fn matches_resource_rules(
    rules: &[NamedRuleWithOperations],
    match_policy: MatchPolicyType,
    attrs: &AdmissionAttributes,
    discovery: &dyn Discovery,
) -> bool {
    if rules
        .iter()
        .any(|rule| named_rule_matches(rule, attrs, attrs.resource()))
    {
        return true;
    }

    if match_policy == MatchPolicyType::Exact {
        return false;
    }

    let equivalents = discovery.equivalent_resources(attrs.resource());
    rules.iter().any(|rule| {
        equivalents
            .iter()
            .filter(|gvr| *gvr != attrs.resource())
            .any(|gvr| named_rule_matches(rule, attrs, gvr))
    })
}

fn named_rule_matches(
    rule: &NamedRuleWithOperations,
    attrs: &AdmissionAttributes,
    gvr: &GroupVersionResource,
) -> bool {
    if !(operation_matches(rule, attrs.operation())
        && list_matches(&rule.api_groups, &gvr.group)
        && list_matches(&rule.api_versions, &gvr.version)
        && resource_matches(rule, &gvr.resource, attrs.subresource())
        && scope_matches(rule, attrs.namespace(), gvr))
    {
        return false;
    }

    // An object created via generateName has no name yet, so it only matches rules without resourceNames
    rule.resource_names.is_empty() || rule.resource_names.iter().any(|n| n == attrs.name())
}

fn operation_matches(rule: &NamedRuleWithOperations, operation: &Operation) -> bool {
    let requested = match operation {
        Operation::Create => OperationType::Create,
        Operation::Update => OperationType::Update,
        Operation::Delete => OperationType::Delete,
        Operation::Connect => OperationType::Connect,
    };
    rule.operations
        .iter()
        .any(|op| *op == OperationType::All || *op == requested)
}

fn list_matches(allowed: &[String], value: &str) -> bool {
    allowed.iter().any(|a| a == WILDCARD || a == value)
}

fn resource_matches(rule: &NamedRuleWithOperations, resource: &str, subresource: &str) -> bool {
    rule.resources.iter().any(|entry| {
        let (res, sub) = entry.split_once('/').unwrap_or((entry.as_str(), ""));
        (res == WILDCARD || res == resource) && (sub == WILDCARD || sub == subresource)
    })
}

fn scope_matches(rule: &NamedRuleWithOperations, namespace: &str, gvr: &GroupVersionResource) -> bool {
    // Namespace objects are cluster-scoped even though their requests carry a namespace
    match rule.scope {
        None | Some(ScopeType::All) => true,
        Some(ScopeType::Namespaced) => !is_namespace_resource(gvr) && !namespace.is_empty(),
        Some(ScopeType::Cluster) => is_namespace_resource(gvr) || namespace.is_empty(),
    }
}
