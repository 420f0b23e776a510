//! Compilation of policy expressions
//!
//! Each expression category compiles separately so failures can be
//! attributed to the field that declared them.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cel_interpreter::{Context, Program, Value};

use super::activation::{AUTHORIZER, PARAMS};
use crate::error::{Error, Result};
use crate::policy::v1beta1::{AuditAnnotation, MatchCondition, Validation, Variable};

/// The policy field an expression was declared in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpressionKind {
    Validation,
    MessageExpression,
    AuditAnnotation,
    MatchCondition,
    Variable,
}

impl fmt::Display for ExpressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpressionKind::Validation => "validation",
            ExpressionKind::MessageExpression => "messageExpression",
            ExpressionKind::AuditAnnotation => "auditAnnotation",
            ExpressionKind::MatchCondition => "matchCondition",
            ExpressionKind::Variable => "variable",
        };
        f.write_str(name)
    }
}

/// Optional top-level variables an expression may reference
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptionalVariableDeclarations {
    /// `params` is declared (the policy has a `paramKind`)
    pub has_params: bool,
    /// `authorizer` is declared
    pub has_authorizer: bool,
}

/// A parsed expression ready for evaluation
#[derive(Clone, Debug)]
pub struct CompiledExpression {
    kind: ExpressionKind,
    index: usize,
    source: String,
    program: Arc<Program>,
    cost: u64,
}

impl CompiledExpression {
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Static cost charged against the evaluation budget per execution
    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn evaluate(&self, context: &Context<'_>) -> std::result::Result<Value, String> {
        self.program.execute(context).map_err(|e| {
            format!(
                "{} {} ({:?}) failed to evaluate: {}",
                self.kind, self.index, self.source, e
            )
        })
    }

    /// Evaluate, requiring a boolean result
    pub fn evaluate_bool(&self, context: &Context<'_>) -> std::result::Result<bool, String> {
        match self.evaluate(context)? {
            Value::Bool(b) => Ok(b),
            other => Err(format!(
                "{} {} ({:?}) did not evaluate to a boolean, got '{:?}' instead",
                self.kind, self.index, self.source, other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompiledValidation {
    pub expression: CompiledExpression,
    pub message: String,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CompiledAuditAnnotation {
    pub key: String,
    pub value: CompiledExpression,
}

#[derive(Clone, Debug)]
pub struct CompiledMatchCondition {
    pub name: String,
    pub expression: CompiledExpression,
}

#[derive(Clone, Debug)]
pub struct CompiledVariable {
    pub name: String,
    pub expression: CompiledExpression,
}

/// Compiles the expressions declared by one policy
#[derive(Debug)]
pub struct Compiler<'a> {
    validations: &'a [Validation],
    audit_annotations: &'a [AuditAnnotation],
    match_conditions: &'a [MatchCondition],
    variables: &'a [Variable],
}

impl<'a> Compiler<'a> {
    /// Create a compiler, checking that variable names are usable
    pub fn new(
        validations: &'a [Validation],
        audit_annotations: &'a [AuditAnnotation],
        match_conditions: &'a [MatchCondition],
        variables: &'a [Variable],
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for (index, variable) in variables.iter().enumerate() {
            let message = if variable.name.is_empty() {
                Some("variable name must not be empty".to_string())
            } else if !seen.insert(variable.name.as_str()) {
                Some(format!("duplicate variable name {:?}", variable.name))
            } else {
                None
            };
            if let Some(message) = message {
                return Err(Error::Compilation {
                    kind: ExpressionKind::Variable,
                    index,
                    expression: variable.expression.clone(),
                    message,
                });
            }
        }

        Ok(Self {
            validations,
            audit_annotations,
            match_conditions,
            variables,
        })
    }

    pub fn compile_variables(&self, opts: OptionalVariableDeclarations) -> Result<Vec<CompiledVariable>> {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| {
                Ok(CompiledVariable {
                    name: variable.name.clone(),
                    expression: compile(ExpressionKind::Variable, index, &variable.expression, opts)?,
                })
            })
            .collect()
    }

    pub fn compile_validate_expressions(
        &self,
        opts: OptionalVariableDeclarations,
    ) -> Result<Vec<CompiledValidation>> {
        self.validations
            .iter()
            .enumerate()
            .map(|(index, validation)| {
                Ok(CompiledValidation {
                    expression: compile(ExpressionKind::Validation, index, &validation.expression, opts)?,
                    message: validation.message.clone(),
                    reason: validation.reason.clone(),
                })
            })
            .collect()
    }

    /// One entry per validation; `None` where no messageExpression is set
    pub fn compile_message_expressions(
        &self,
        opts: OptionalVariableDeclarations,
    ) -> Result<Vec<Option<CompiledExpression>>> {
        self.validations
            .iter()
            .enumerate()
            .map(|(index, validation)| {
                if validation.message_expression.trim().is_empty() {
                    return Ok(None);
                }
                compile(
                    ExpressionKind::MessageExpression,
                    index,
                    &validation.message_expression,
                    opts,
                )
                .map(Some)
            })
            .collect()
    }

    pub fn compile_audit_annotations_expressions(
        &self,
        opts: OptionalVariableDeclarations,
    ) -> Result<Vec<CompiledAuditAnnotation>> {
        self.audit_annotations
            .iter()
            .enumerate()
            .map(|(index, annotation)| {
                Ok(CompiledAuditAnnotation {
                    key: annotation.key.clone(),
                    value: compile(
                        ExpressionKind::AuditAnnotation,
                        index,
                        &annotation.value_expression,
                        opts,
                    )?,
                })
            })
            .collect()
    }

    pub fn compile_match_expressions(
        &self,
        opts: OptionalVariableDeclarations,
    ) -> Result<Vec<CompiledMatchCondition>> {
        self.match_conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| {
                Ok(CompiledMatchCondition {
                    name: condition.name.clone(),
                    expression: compile(ExpressionKind::MatchCondition, index, &condition.expression, opts)?,
                })
            })
            .collect()
    }
}

fn compile(
    kind: ExpressionKind,
    index: usize,
    source: &str,
    opts: OptionalVariableDeclarations,
) -> Result<CompiledExpression> {
    let compilation_error = |message: String| Error::Compilation {
        kind,
        index,
        expression: source.to_string(),
        message,
    };

    if source.trim().is_empty() {
        return Err(compilation_error("expression must not be empty".to_string()));
    }

    // The parser panics on some truncated inputs instead of returning an error
    let program = panic::catch_unwind(AssertUnwindSafe(|| Program::compile(source)))
        .map_err(|_| compilation_error("failed to parse expression".to_string()))?
        .map_err(|e| compilation_error(e.to_string()))?;

    let references = program.references();
    if !opts.has_params && references.has_variable(PARAMS) {
        return Err(compilation_error(
            "undeclared reference to 'params' (the policy has no paramKind)".to_string(),
        ));
    }
    if !opts.has_authorizer && references.has_variable(AUTHORIZER) {
        return Err(compilation_error(
            "undeclared reference to 'authorizer'".to_string(),
        ));
    }

    // One unit for the expression plus one per referenced identifier and function
    let cost = 1 + references.variables().len() as u64 + references.functions().len() as u64;

    Ok(CompiledExpression {
        kind,
        index,
        source: source.to_string(),
        program: Arc::new(program),
        cost,
    })
}
