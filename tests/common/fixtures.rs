//! Test fixtures and builders for policies, bindings and resources
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let policy = PolicyBuilder::new("replica-limit")
//!     .with_rule(&["apps"], &["v1"], &["deployments"])
//!     .with_validation("object.spec.replicas <= 5", "replicas must be no greater than 5")
//!     .build();
//! let resource = create_deployment("web", "default", 3);
//! let cluster = FakeCluster::new().with_namespace("default", &[("env", "prod")]);
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::{DynamicObject, GroupVersionKind, GroupVersionResource, ObjectMeta, TypeMeta};
use serde_json::json;
use vap_engine::cluster::{Discovery, NamespaceLister};
use vap_engine::policy::v1alpha1::{
    AuditAnnotation, FailurePolicyType, MatchCondition, MatchResources, NamedRuleWithOperations,
    OperationType, ParamKind, Validation, ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding,
    ValidatingAdmissionPolicyBindingSpec, ValidatingAdmissionPolicySpec, Variable,
};
use vap_engine::{Error, Result};

// =============================================================================
// Tracing
// =============================================================================

/// Route engine logs to the test output; `RUST_LOG` overrides the default
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vap_engine=debug"));
    // Another test may already have installed a subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Resources
// =============================================================================

/// Create a Deployment with the given replica count
pub fn create_deployment(name: &str, namespace: &str, replicas: i64) -> DynamicObject {
    create_deployment_with_labels(name, namespace, replicas, &[])
}

pub fn create_deployment_with_labels(
    name: &str,
    namespace: &str,
    replicas: i64,
    labels: &[(&str, &str)],
) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: (!labels.is_empty()).then(|| to_map(labels)),
            ..Default::default()
        },
        data: json!({
            "spec": {
                "replicas": replicas,
                "template": { "spec": { "containers": [{ "name": "app", "image": "nginx" }] } }
            }
        }),
    }
}

/// Create a core Pod
pub fn create_pod(name: &str, namespace: &str) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: json!({ "spec": { "containers": [{ "name": "app", "image": "nginx:latest" }] } }),
    }
}

pub fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn label_selector(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(to_map(pairs)),
        match_expressions: None,
    }
}

/// A CREATE rule for the given groups, versions and resources
pub fn create_rule(groups: &[&str], versions: &[&str], resources: &[&str]) -> NamedRuleWithOperations {
    NamedRuleWithOperations {
        operations: vec![OperationType::Create],
        api_groups: groups.iter().map(|s| s.to_string()).collect(),
        api_versions: versions.iter().map(|s| s.to_string()).collect(),
        resources: resources.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

// =============================================================================
// Policy Builder
// =============================================================================

/// Builder for v1alpha1 ValidatingAdmissionPolicy fixtures
///
/// A policy built without any rule has match constraints with no resource
/// rules, so it matches nothing.
pub struct PolicyBuilder {
    name: String,
    spec: ValidatingAdmissionPolicySpec,
}

impl PolicyBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spec: ValidatingAdmissionPolicySpec {
                match_constraints: Some(MatchResources::default()),
                ..Default::default()
            },
        }
    }

    /// A policy on `apps/v1/deployments` limiting replicas to 5
    pub fn replica_limit(name: &str) -> Self {
        Self::new(name)
            .with_rule(&["apps"], &["v1"], &["deployments"])
            .with_validation("object.spec.replicas <= 5", "replicas must be no greater than 5")
    }

    pub fn with_rule(mut self, groups: &[&str], versions: &[&str], resources: &[&str]) -> Self {
        self.constraints().resource_rules.push(create_rule(groups, versions, resources));
        self
    }

    pub fn with_exclude_rule(mut self, groups: &[&str], versions: &[&str], resources: &[&str]) -> Self {
        self.constraints()
            .exclude_resource_rules
            .push(create_rule(groups, versions, resources));
        self
    }

    pub fn with_namespace_selector(mut self, pairs: &[(&str, &str)]) -> Self {
        self.constraints().namespace_selector = Some(label_selector(pairs));
        self
    }

    pub fn with_object_selector(mut self, pairs: &[(&str, &str)]) -> Self {
        self.constraints().object_selector = Some(label_selector(pairs));
        self
    }

    pub fn without_match_constraints(mut self) -> Self {
        self.spec.match_constraints = None;
        self
    }

    pub fn with_validation(mut self, expression: &str, message: &str) -> Self {
        self.spec.validations.push(Validation {
            expression: expression.to_string(),
            message: message.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn with_message_expression(mut self, expression: &str, message_expression: &str) -> Self {
        self.spec.validations.push(Validation {
            expression: expression.to_string(),
            message_expression: message_expression.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn with_match_condition(mut self, name: &str, expression: &str) -> Self {
        self.spec.match_conditions.push(MatchCondition {
            name: name.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    pub fn with_variable(mut self, name: &str, expression: &str) -> Self {
        self.spec.variables.push(Variable {
            name: name.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    pub fn with_audit_annotation(mut self, key: &str, value_expression: &str) -> Self {
        self.spec.audit_annotations.push(AuditAnnotation {
            key: key.to_string(),
            value_expression: value_expression.to_string(),
        });
        self
    }

    pub fn with_param_kind(mut self, api_version: &str, kind: &str) -> Self {
        self.spec.param_kind = Some(ParamKind {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicyType) -> Self {
        self.spec.failure_policy = Some(failure_policy);
        self
    }

    pub fn build(self) -> ValidatingAdmissionPolicy {
        ValidatingAdmissionPolicy {
            metadata: ObjectMeta {
                name: Some(self.name),
                ..Default::default()
            },
            spec: self.spec,
        }
    }

    fn constraints(&mut self) -> &mut MatchResources {
        self.spec.match_constraints.get_or_insert_with(MatchResources::default)
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// A binding without match resources; it matches whatever its policy matches
pub fn create_binding(name: &str, policy_name: &str) -> ValidatingAdmissionPolicyBinding {
    ValidatingAdmissionPolicyBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: ValidatingAdmissionPolicyBindingSpec {
            policy_name: policy_name.to_string(),
            ..Default::default()
        },
    }
}

/// A binding restricted to namespaces carrying the given labels
pub fn create_binding_for_namespaces(
    name: &str,
    policy_name: &str,
    pairs: &[(&str, &str)],
) -> ValidatingAdmissionPolicyBinding {
    let mut binding = create_binding(name, policy_name);
    binding.spec.match_resources = Some(MatchResources {
        namespace_selector: Some(label_selector(pairs)),
        resource_rules: vec![create_rule(&["*"], &["*"], &["*"])],
        ..Default::default()
    });
    binding
}

// =============================================================================
// Fake Cluster
// =============================================================================

/// In-memory discovery and namespace lookups
///
/// Knows the GVRs of Deployments and Pods by default.
pub struct FakeCluster {
    resources: Vec<(GroupVersionKind, GroupVersionResource)>,
    equivalents: Vec<GroupVersionResource>,
    namespaces: BTreeMap<String, BTreeMap<String, String>>,
    namespace_lookups: AtomicUsize,
    discovery_calls: AtomicUsize,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            resources: vec![
                (
                    GroupVersionKind::gvk("apps", "v1", "Deployment"),
                    GroupVersionResource::gvr("apps", "v1", "deployments"),
                ),
                (
                    GroupVersionKind::gvk("", "v1", "Pod"),
                    GroupVersionResource::gvr("", "v1", "pods"),
                ),
            ],
            equivalents: Vec::new(),
            namespaces: BTreeMap::new(),
            namespace_lookups: AtomicUsize::new(0),
            discovery_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_namespace(mut self, name: &str, labels: &[(&str, &str)]) -> Self {
        self.namespaces.insert(name.to_string(), to_map(labels));
        self
    }

    /// Report `gvr` as equivalent to every resource
    pub fn with_equivalent(mut self, gvr: GroupVersionResource) -> Self {
        self.equivalents.push(gvr);
        self
    }

    pub fn namespace_lookups(&self) -> usize {
        self.namespace_lookups.load(Ordering::SeqCst)
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }
}

impl Discovery for FakeCluster {
    fn resolve_gvr<'a>(&'a self, gvk: &'a GroupVersionKind) -> BoxFuture<'a, Result<GroupVersionResource>> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let found = self
            .resources
            .iter()
            .find(|(known, _)| known == gvk)
            .map(|(_, gvr)| gvr.clone())
            .ok_or_else(|| Error::Discovery(format!("no resource serves {}/{}", gvk.api_version(), gvk.kind)));
        Box::pin(async move { found })
    }

    fn equivalent_resources(&self, _gvr: &GroupVersionResource) -> Vec<GroupVersionResource> {
        self.equivalents.clone()
    }
}

impl NamespaceLister for FakeCluster {
    fn get_namespace<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Namespace>> {
        self.namespace_lookups.fetch_add(1, Ordering::SeqCst);
        let found = self
            .namespaces
            .get(name)
            .map(|labels| Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    labels: Some(labels.clone()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .ok_or_else(|| Error::Discovery(format!("namespace {} not found", name)));
        Box::pin(async move { found })
    }
}
