//! CEL expression support for policy evaluation
//!
//! Policies declare their rules as CEL expressions. This module compiles
//! them with `cel-interpreter` and builds the values they are evaluated
//! against:
//!
//! - `object`: the resource under admission
//! - `oldObject`: always null (CREATE requests only)
//! - `request`: kind, resource, name, namespace, operation and dry-run flag
//! - `params`: null; declared only for policies with a `paramKind`
//! - `namespaceObject`: null
//! - `variables`: the policy's variables, evaluated in declaration order

pub mod activation;
pub mod compiler;

pub use activation::{Activation, json_to_value};
pub use compiler::{
    CompiledAuditAnnotation, CompiledExpression, CompiledMatchCondition, CompiledValidation,
    CompiledVariable, Compiler, ExpressionKind, OptionalVariableDeclarations,
};
