//! Admission request modelling and match evaluation
//!
//! Matching runs in three stages, mirroring the API server:
//! - Namespace and object label selectors
//! - Exclude rules, then resource rules
//! - Deferred selector errors, surfaced only when everything else matched

mod attributes;
pub mod matching;
pub mod rules;
pub mod selector;

pub use attributes::{AdmissionAttributes, resource_gvk};
pub use matching::Matcher;
pub use selector::Selector;
