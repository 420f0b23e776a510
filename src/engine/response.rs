//! Engine response types
//!
//! An evaluation yields one [`EngineResponse`] per resource. Its
//! [`PolicyResponse`] holds at most one rule: the folded outcome of every
//! decision the validator produced.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use kube::core::DynamicObject;
use serde::Serialize;

use crate::policy::{ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding};
use crate::validator::{DecisionAction, DecisionEvaluation, PolicyDecision};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pass,
    Fail,
    Error,
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RuleType {
    #[default]
    Validation,
}

/// Status and message folded from a list of decisions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleOutcome {
    pub status: RuleStatus,
    pub message: String,
}

/// Fold decisions in order: the first error wins, then the first deny
pub fn aggregate(decisions: &[PolicyDecision]) -> RuleOutcome {
    decisions
        .iter()
        .find_map(|decision| match (decision.evaluation, decision.action) {
            (DecisionEvaluation::Error, _) => Some(RuleOutcome {
                status: RuleStatus::Error,
                message: decision.message.clone(),
            }),
            (_, DecisionAction::Deny) => Some(RuleOutcome {
                status: RuleStatus::Fail,
                message: decision.message.clone(),
            }),
            _ => None,
        })
        .unwrap_or(RuleOutcome {
            status: RuleStatus::Pass,
            message: String::new(),
        })
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleResponse {
    pub name: String,
    pub rule_type: RuleType,
    pub status: RuleStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<ValidatingAdmissionPolicyBinding>,
    /// Audit annotations that evaluated to strings
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl RuleResponse {
    pub fn new(name: &str, outcome: RuleOutcome) -> Self {
        Self {
            name: name.to_string(),
            rule_type: RuleType::Validation,
            status: outcome.status,
            message: outcome.message,
            binding: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_binding(mut self, binding: ValidatingAdmissionPolicyBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExecutionStats {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn processing_time(&self) -> TimeDelta {
        self.end - self.start
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ExecutionStats>,
    pub rules: Vec<RuleResponse>,
}

impl PolicyResponse {
    pub fn add(&mut self, stats: ExecutionStats, rule: RuleResponse) {
        self.stats = Some(stats);
        self.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Result of evaluating one policy against one resource
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub resource: DynamicObject,
    pub policy: ValidatingAdmissionPolicy,
    pub policy_response: PolicyResponse,
}

impl EngineResponse {
    /// A response with no rules, as returned when the policy does not apply
    pub fn new(resource: DynamicObject, policy: ValidatingAdmissionPolicy) -> Self {
        Self {
            resource,
            policy,
            policy_response: PolicyResponse::default(),
        }
    }

    pub fn with_policy_response(mut self, policy_response: PolicyResponse) -> Self {
        self.policy_response = policy_response;
        self
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    /// The single rule response, if the policy was evaluated
    pub fn rule(&self) -> Option<&RuleResponse> {
        self.policy_response.rules.first()
    }

    pub fn is_empty(&self) -> bool {
        self.policy_response.is_empty()
    }

    /// True if no rule failed or errored
    pub fn is_successful(&self) -> bool {
        self.policy_response
            .rules
            .iter()
            .all(|rule| rule.status == RuleStatus::Pass)
    }

    pub fn is_failed(&self) -> bool {
        self.has_status(RuleStatus::Fail)
    }

    pub fn is_error(&self) -> bool {
        self.has_status(RuleStatus::Error)
    }

    fn has_status(&self, status: RuleStatus) -> bool {
        self.policy_response.rules.iter().any(|rule| rule.status == status)
    }
}
