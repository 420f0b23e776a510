//! Error types for policy evaluation
//!
//! Only failures that prevent an evaluation from being performed surface here.
//! Expression runtime failures are reported as `Error` rule outcomes instead.

use thiserror::Error;

use crate::cel::ExpressionKind;

/// Error variants are named after the stage that failed so callers can tell
/// "could not evaluate" apart from "policy denied".
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Failed to get namespace {namespace}: {message}")]
    NamespaceLookup { namespace: String, message: String },

    #[error("Matching error: {0}")]
    Matching(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Compilation error in {kind} {index} ({expression:?}): {message}")]
    Compilation {
        kind: ExpressionKind,
        index: usize,
        expression: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

impl Error {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            _ => false,
        }
    }

    /// Check if this error came from compiling a policy expression
    pub fn is_compilation(&self) -> bool {
        matches!(self, Error::Compilation { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
