//! ValidatingAdmissionPolicy API types
//!
//! Policies are loaded as [`v1alpha1`] objects and converted to [`v1beta1`]
//! for matching and evaluation.

pub mod conversion;
pub mod v1alpha1;
pub mod v1beta1;

pub use conversion::{convert_binding, convert_policy};
pub use v1alpha1::{ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding};

/// A policy definition together with the bindings that reference it
///
/// Binding order is significant: the first binding whose match resources
/// select a resource is the one evaluated.
#[derive(Clone, Debug, Default)]
pub struct PolicyData {
    definition: ValidatingAdmissionPolicy,
    bindings: Vec<ValidatingAdmissionPolicyBinding>,
}

impl PolicyData {
    pub fn new(
        definition: ValidatingAdmissionPolicy,
        bindings: Vec<ValidatingAdmissionPolicyBinding>,
    ) -> Self {
        Self {
            definition,
            bindings,
        }
    }

    pub fn definition(&self) -> &ValidatingAdmissionPolicy {
        &self.definition
    }

    pub fn bindings(&self) -> &[ValidatingAdmissionPolicyBinding] {
        &self.bindings
    }

    pub fn add_binding(&mut self, binding: ValidatingAdmissionPolicyBinding) {
        self.bindings.push(binding);
    }
}
