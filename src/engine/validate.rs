//! Evaluate one policy, with its bindings, against one resource

use std::collections::BTreeMap;

use chrono::Utc;
use kube::core::{DynamicObject, GroupVersionResource};
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info};

use super::response::{EngineResponse, ExecutionStats, PolicyResponse, RuleResponse, aggregate};
use crate::admission::{AdmissionAttributes, Matcher, resource_gvk};
use crate::cluster::{ClusterAccess, within_deadline};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::policy::{
    PolicyData, ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding, convert_binding,
    convert_policy,
};
use crate::validator::Validator;

/// Evaluate `policy_data` against `resource`
///
/// With cluster access, the policy applies only if its match constraints
/// select the resource; the first matching binding is then evaluated, and
/// if bindings exist but none matches the response has no rules. Without
/// cluster access the policy is evaluated unconditionally and unbound.
///
/// Expression failures are reported in the response; lookup, matching and
/// compilation failures are returned as errors.
pub async fn validate(
    policy_data: &PolicyData,
    resource: &DynamicObject,
    cluster: ClusterAccess<'_>,
    config: &EngineConfig,
) -> Result<EngineResponse> {
    let policy = policy_data.definition();
    let span = debug_span!(
        "validate",
        policy = %policy.name(),
        resource = %resource.metadata.name.as_deref().unwrap_or_default(),
    );
    validate_inner(policy_data, resource, cluster, config)
        .instrument(span)
        .await
}

async fn validate_inner(
    policy_data: &PolicyData,
    resource: &DynamicObject,
    cluster: ClusterAccess<'_>,
    config: &EngineConfig,
) -> Result<EngineResponse> {
    let policy = policy_data.definition();
    let deadline = config.timeout.map(|timeout| Instant::now() + timeout);

    let (discovery, namespaces) = match cluster {
        ClusterAccess::Connected { discovery, namespaces } => (discovery, namespaces),
        ClusterAccess::Disconnected => {
            let attrs = AdmissionAttributes::for_create(resource, GroupVersionResource::gvr("", "", ""))?;
            debug!(resource = %attrs.resource_path(), "No cluster access, evaluating unconditionally");
            return validate_resource(policy, None, resource, &attrs, config, deadline);
        }
    };

    let gvk = resource_gvk(resource)?;
    let gvr = within_deadline(deadline, "discovery", discovery.resolve_gvr(&gvk)).await?;
    let attrs = AdmissionAttributes::for_create(resource, gvr)?;

    let matcher = Matcher::new(discovery, namespaces).with_deadline(deadline);
    let converted = convert_policy(policy);
    if !matcher.definition_matches(&attrs, &converted).await? {
        debug!(resource = %attrs.resource_path(), "Policy does not match resource");
        return Ok(EngineResponse::new(resource.clone(), policy.clone()));
    }

    let bindings = policy_data.bindings();
    if bindings.is_empty() {
        debug!(resource = %attrs.resource_path(), "Validating resource");
        return validate_resource(policy, None, resource, &attrs, config, deadline);
    }

    for (index, binding) in bindings.iter().enumerate() {
        if !matcher.binding_matches(&attrs, &convert_binding(binding)).await? {
            continue;
        }
        debug!(
            resource = %attrs.resource_path(),
            binding = %binding.name(),
            index,
            "Validating resource with binding"
        );
        return validate_resource(policy, Some(binding), resource, &attrs, config, deadline);
    }

    debug!(resource = %attrs.resource_path(), "No binding matches resource");
    Ok(EngineResponse::new(resource.clone(), policy.clone()))
}

fn validate_resource(
    policy: &ValidatingAdmissionPolicy,
    binding: Option<&ValidatingAdmissionPolicyBinding>,
    resource: &DynamicObject,
    attrs: &AdmissionAttributes,
    config: &EngineConfig,
    deadline: Option<Instant>,
) -> Result<EngineResponse> {
    let start = Utc::now();

    let validator = Validator::compile(&convert_policy(policy))?;
    let result = validator.validate(attrs, config.cost_budget, deadline)?;
    let outcome = aggregate(&result.decisions);

    info!(
        status = ?outcome.status,
        decisions = result.decisions.len(),
        "Policy evaluated"
    );

    let properties: BTreeMap<String, String> = result
        .audit_annotations
        .into_iter()
        .map(|annotation| (annotation.key, annotation.value))
        .collect();
    let mut rule = RuleResponse::new(policy.name(), outcome).with_properties(properties);
    if let Some(binding) = binding {
        rule = rule.with_binding(binding.clone());
    }

    let mut policy_response = PolicyResponse::default();
    policy_response.add(ExecutionStats::new(start, Utc::now()), rule);

    Ok(EngineResponse::new(resource.clone(), policy.clone()).with_policy_response(policy_response))
}
