//! Policy rule evaluation
//!
//! A `Validator` holds the compiled expressions of one policy and produces
//! one `PolicyDecision` per evaluated rule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cel_interpreter::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::admission::AdmissionAttributes;
use crate::cel::{
    Activation, CompiledAuditAnnotation, CompiledExpression, CompiledMatchCondition,
    CompiledValidation, CompiledVariable, Compiler, OptionalVariableDeclarations,
};
use crate::error::Result;
use crate::policy::v1beta1::{FailurePolicyType, ValidatingAdmissionPolicy};

pub const DEFAULT_DENY_REASON: &str = "Invalid";
pub const COST_BUDGET_EXCEEDED_MESSAGE: &str =
    "validation failed due to running out of cost budget, no further validation rules will be run";
pub const DEADLINE_EXCEEDED_MESSAGE: &str = "evaluation deadline exceeded";

/// What the admission request should do as a result of a rule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionAction {
    Admit,
    Deny,
}

/// How a rule evaluated, independent of the resulting action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionEvaluation {
    Admit,
    Deny,
    Error,
}

/// Outcome of one evaluated rule
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyDecision {
    pub action: DecisionAction,
    pub evaluation: DecisionEvaluation,
    pub message: String,
    pub reason: Option<String>,
    pub elapsed: Duration,
}

impl PolicyDecision {
    fn admit(elapsed: Duration) -> Self {
        Self {
            action: DecisionAction::Admit,
            evaluation: DecisionEvaluation::Admit,
            message: String::new(),
            reason: None,
            elapsed,
        }
    }

    fn deny(message: String, reason: Option<String>, elapsed: Duration) -> Self {
        Self {
            action: DecisionAction::Deny,
            evaluation: DecisionEvaluation::Deny,
            message,
            reason: Some(reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_string())),
            elapsed,
        }
    }

    fn error(failure_policy: FailurePolicyType, message: String, elapsed: Duration) -> Self {
        let action = match failure_policy {
            FailurePolicyType::Fail => DecisionAction::Deny,
            FailurePolicyType::Ignore => DecisionAction::Admit,
        };
        Self {
            action,
            evaluation: DecisionEvaluation::Error,
            message,
            reason: None,
            elapsed,
        }
    }
}

/// An audit annotation that evaluated to a string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditAnnotationValue {
    pub key: String,
    pub value: String,
}

/// Decisions and audit annotations produced by one `validate` call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidateResult {
    pub decisions: Vec<PolicyDecision>,
    pub audit_annotations: Vec<AuditAnnotationValue>,
}

impl ValidateResult {
    /// True when match conditions excluded the request
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty() && self.audit_annotations.is_empty()
    }
}

/// Why evaluation stopped early
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exhausted {
    Cost,
    Deadline,
}

impl Exhausted {
    fn message(self) -> &'static str {
        match self {
            Exhausted::Cost => COST_BUDGET_EXCEEDED_MESSAGE,
            Exhausted::Deadline => DEADLINE_EXCEEDED_MESSAGE,
        }
    }
}

/// Remaining cost and the evaluation deadline
struct Budget {
    remaining: u64,
    deadline: Option<Instant>,
    exhausted: Option<Exhausted>,
}

impl Budget {
    fn new(remaining: u64, deadline: Option<Instant>) -> Self {
        Self {
            remaining,
            deadline,
            exhausted: None,
        }
    }

    /// Charge for one execution of `expression`. Once exhausted, stays exhausted.
    fn charge(&mut self, expression: &CompiledExpression) -> std::result::Result<(), Exhausted> {
        if let Some(exhausted) = self.exhausted {
            return Err(exhausted);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.exhausted = Some(Exhausted::Deadline);
            return Err(Exhausted::Deadline);
        }
        match self.remaining.checked_sub(expression.cost()) {
            Some(remaining) => {
                self.remaining = remaining;
                Ok(())
            }
            None => {
                self.remaining = 0;
                self.exhausted = Some(Exhausted::Cost);
                Err(Exhausted::Cost)
            }
        }
    }
}

enum MatchOutcome {
    Matched,
    NotMatched,
    Failed(String),
}

/// Compiled form of a policy, ready to evaluate requests
#[derive(Debug)]
pub struct Validator {
    failure_policy: FailurePolicyType,
    match_conditions: Vec<CompiledMatchCondition>,
    variables: Vec<CompiledVariable>,
    validations: Vec<CompiledValidation>,
    messages: Vec<Option<CompiledExpression>>,
    audit_annotations: Vec<CompiledAuditAnnotation>,
}

impl Validator {
    /// Compile every expression of `policy`, failing on the first error
    pub fn compile(policy: &ValidatingAdmissionPolicy) -> Result<Self> {
        let spec = &policy.spec;
        let compiler = Compiler::new(
            &spec.validations,
            &spec.audit_annotations,
            &spec.match_conditions,
            &spec.variables,
        )?;
        let opts = OptionalVariableDeclarations {
            has_params: spec.param_kind.is_some(),
            has_authorizer: false,
        };

        Ok(Self {
            failure_policy: policy.failure_policy(),
            variables: compiler.compile_variables(opts)?,
            match_conditions: compiler.compile_match_expressions(opts)?,
            validations: compiler.compile_validate_expressions(opts)?,
            messages: compiler.compile_message_expressions(opts)?,
            audit_annotations: compiler.compile_audit_annotations_expressions(opts)?,
        })
    }

    pub fn failure_policy(&self) -> FailurePolicyType {
        self.failure_policy
    }

    /// Evaluate the policy against `attrs`
    ///
    /// Returns an empty result when a match condition excludes the request.
    pub fn validate(
        &self,
        attrs: &AdmissionAttributes,
        cost_budget: u64,
        deadline: Option<Instant>,
    ) -> Result<ValidateResult> {
        let activation = Activation::from_attributes(attrs)?;
        let mut budget = Budget::new(cost_budget, deadline);
        let variables = self.evaluate_variables(&activation, &mut budget);

        let start = Instant::now();
        match self.evaluate_match_conditions(&activation, &variables, &mut budget) {
            MatchOutcome::Matched => {}
            MatchOutcome::NotMatched => {
                debug!(resource = %attrs.resource_path(), "Match conditions excluded request");
                return Ok(ValidateResult::default());
            }
            MatchOutcome::Failed(message) => {
                if self.failure_policy == FailurePolicyType::Ignore {
                    debug!(error = %message, "Ignoring match condition error");
                    return Ok(ValidateResult::default());
                }
                return Ok(ValidateResult {
                    decisions: vec![PolicyDecision::error(
                        self.failure_policy,
                        message,
                        start.elapsed(),
                    )],
                    audit_annotations: Vec::new(),
                });
            }
        }

        let mut result = ValidateResult::default();
        for (index, validation) in self.validations.iter().enumerate() {
            let message_expression = self.messages.get(index).and_then(Option::as_ref);
            let decision =
                self.evaluate_validation(validation, message_expression, &activation, &variables, &mut budget);
            result.decisions.push(decision);
        }

        self.evaluate_audit_annotations(&activation, &variables, &mut budget, &mut result);

        Ok(result)
    }

    fn evaluate_variables(
        &self,
        activation: &Activation,
        budget: &mut Budget,
    ) -> HashMap<Arc<String>, Value> {
        let mut variables = HashMap::new();
        for variable in &self.variables {
            if budget.charge(&variable.expression).is_err() {
                break;
            }
            let context = activation.context(&variables);
            match variable.expression.evaluate(&context) {
                Ok(value) => {
                    variables.insert(Arc::new(variable.name.clone()), value);
                }
                Err(error) => {
                    debug!(variable = %variable.name, %error, "Variable failed to evaluate");
                }
            }
        }
        variables
    }

    fn evaluate_match_conditions(
        &self,
        activation: &Activation,
        variables: &HashMap<Arc<String>, Value>,
        budget: &mut Budget,
    ) -> MatchOutcome {
        if self.match_conditions.is_empty() {
            return MatchOutcome::Matched;
        }

        let context = activation.context(variables);
        let mut errors = Vec::new();
        for condition in &self.match_conditions {
            if let Err(exhausted) = budget.charge(&condition.expression) {
                errors.push(exhausted.message().to_string());
                break;
            }
            match condition.expression.evaluate_bool(&context) {
                Ok(true) => {}
                Ok(false) => return MatchOutcome::NotMatched,
                Err(error) => errors.push(format!("matchCondition {:?}: {}", condition.name, error)),
            }
        }

        if errors.is_empty() {
            MatchOutcome::Matched
        } else {
            MatchOutcome::Failed(errors.join("; "))
        }
    }

    fn evaluate_validation(
        &self,
        validation: &CompiledValidation,
        message_expression: Option<&CompiledExpression>,
        activation: &Activation,
        variables: &HashMap<Arc<String>, Value>,
        budget: &mut Budget,
    ) -> PolicyDecision {
        let start = Instant::now();
        if let Err(exhausted) = budget.charge(&validation.expression) {
            return PolicyDecision::error(self.failure_policy, exhausted.message().to_string(), start.elapsed());
        }

        let context = activation.context(variables);
        match validation.expression.evaluate_bool(&context) {
            Err(error) => PolicyDecision::error(self.failure_policy, error, start.elapsed()),
            Ok(true) => PolicyDecision::admit(start.elapsed()),
            Ok(false) => {
                let message = match message_expression {
                    Some(expression) => {
                        if let Err(exhausted) = budget.charge(expression) {
                            return PolicyDecision::error(
                                self.failure_policy,
                                exhausted.message().to_string(),
                                start.elapsed(),
                            );
                        }
                        evaluate_message(expression, &context)
                    }
                    None => None,
                };
                let message = message.unwrap_or_else(|| static_message(validation));
                PolicyDecision::deny(message, validation.reason.clone(), start.elapsed())
            }
        }
    }

    fn evaluate_audit_annotations(
        &self,
        activation: &Activation,
        variables: &HashMap<Arc<String>, Value>,
        budget: &mut Budget,
        result: &mut ValidateResult,
    ) {
        if self.audit_annotations.is_empty() {
            return;
        }

        let context = activation.context(variables);
        for annotation in &self.audit_annotations {
            let start = Instant::now();
            if let Err(exhausted) = budget.charge(&annotation.value) {
                result.decisions.push(PolicyDecision::error(
                    self.failure_policy,
                    exhausted.message().to_string(),
                    start.elapsed(),
                ));
                continue;
            }
            match annotation.value.evaluate(&context) {
                Ok(Value::String(value)) => {
                    if !value.is_empty() {
                        result.audit_annotations.push(AuditAnnotationValue {
                            key: annotation.key.clone(),
                            value: value.to_string(),
                        });
                    }
                }
                Ok(Value::Null) => {}
                Ok(other) => result.decisions.push(PolicyDecision::error(
                    self.failure_policy,
                    format!(
                        "valueExpression {:?} for audit annotation {:?} must evaluate to a string or null, got '{:?}'",
                        annotation.value.source(),
                        annotation.key,
                        other
                    ),
                    start.elapsed(),
                )),
                Err(error) => result.decisions.push(PolicyDecision::error(
                    self.failure_policy,
                    error,
                    start.elapsed(),
                )),
            }
        }
    }
}

/// A messageExpression result, if it produced a usable message
fn evaluate_message(expression: &CompiledExpression, context: &cel_interpreter::Context<'_>) -> Option<String> {
    match expression.evaluate(context) {
        Ok(Value::String(message)) => {
            let message = message.trim();
            if message.is_empty() || message.contains('\n') {
                None
            } else {
                Some(message.to_string())
            }
        }
        Ok(other) => {
            warn!(expression = %expression.source(), value = ?other, "messageExpression did not return a string");
            None
        }
        Err(error) => {
            warn!(%error, "messageExpression failed, using static message");
            None
        }
    }
}

fn static_message(validation: &CompiledValidation) -> String {
    if validation.message.is_empty() {
        format!("failed expression: {}", validation.expression.source().trim())
    } else {
        validation.message.clone()
    }
}
