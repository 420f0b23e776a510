//! Offline evaluation of Kubernetes ValidatingAdmissionPolicies
//!
//! Given a policy, its bindings and a resource, decide whether the resource
//! would be admitted, the way the API server would on CREATE.

pub mod admission;
pub mod cel;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod validator;

pub use admission::AdmissionAttributes;
pub use cluster::{ClusterAccess, Discovery, KubeCluster, NamespaceLister};
pub use config::EngineConfig;
pub use engine::{EngineResponse, RuleStatus, target_kinds, validate};
pub use error::{Error, Result};
pub use policy::{PolicyData, ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding};
pub use validator::{PolicyDecision, ValidateResult, Validator};
