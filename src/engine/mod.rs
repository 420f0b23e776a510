//! Policy evaluation engine
//!
//! Ties matching, compilation and validation together into a single
//! [`validate`] call per resource.

pub mod kinds;
pub mod response;
mod validate;

pub use kinds::target_kinds;
pub use response::{
    EngineResponse, ExecutionStats, PolicyResponse, RuleOutcome, RuleResponse, RuleStatus, RuleType,
    aggregate,
};
pub use validate::validate;
