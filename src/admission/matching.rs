//! Policy and binding matching
//!
//! Decides whether a policy definition, and then which of its bindings,
//! selects an admission request.

use tokio::time::Instant;
use tracing::debug;

use super::rules::{is_namespace_resource, matches_resource_rules};
use super::selector::Selector;
use super::AdmissionAttributes;
use crate::cluster::{Discovery, NamespaceLister, within_deadline};
use crate::error::{Error, Result};
use crate::policy::v1beta1::{
    MatchResources, ValidatingAdmissionPolicy, ValidatingAdmissionPolicyBinding,
};

/// Evaluates match resources against admission attributes
pub struct Matcher<'a> {
    discovery: &'a dyn Discovery,
    namespaces: &'a dyn NamespaceLister,
    deadline: Option<Instant>,
}

impl<'a> Matcher<'a> {
    pub fn new(discovery: &'a dyn Discovery, namespaces: &'a dyn NamespaceLister) -> Self {
        Self {
            discovery,
            namespaces,
            deadline: None,
        }
    }

    /// Fail namespace lookups that have not completed by `deadline`
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Check the policy's match constraints
    ///
    /// A policy without match constraints is malformed and yields an error.
    pub async fn definition_matches(
        &self,
        attrs: &AdmissionAttributes,
        policy: &ValidatingAdmissionPolicy,
    ) -> Result<bool> {
        let constraints = policy.spec.match_constraints.as_ref().ok_or_else(|| {
            Error::Matching(format!(
                "policy {} contained no match constraints, a required field",
                policy.name()
            ))
        })?;
        self.matches(attrs, constraints).await
    }

    /// Check a binding's match resources; a binding without them matches
    /// every request its policy matches
    pub async fn binding_matches(
        &self,
        attrs: &AdmissionAttributes,
        binding: &ValidatingAdmissionPolicyBinding,
    ) -> Result<bool> {
        match &binding.spec.match_resources {
            Some(criteria) => self.matches(attrs, criteria).await,
            None => Ok(true),
        }
    }

    async fn matches(&self, attrs: &AdmissionAttributes, criteria: &MatchResources) -> Result<bool> {
        // A definite mismatch wins over a selector error, so errors are
        // only surfaced once everything else has matched.
        let namespace_match = self.matches_namespace_selector(attrs, criteria).await;
        if matches!(namespace_match, Ok(false)) {
            debug!(namespace = %attrs.namespace(), "Namespace selector did not match");
            return Ok(false);
        }

        let object_match = matches_object_selector(attrs, criteria);
        if matches!(object_match, Ok(false)) {
            debug!("Object selector did not match");
            return Ok(false);
        }

        let match_policy = criteria.match_policy();
        if matches_resource_rules(
            &criteria.exclude_resource_rules,
            match_policy,
            attrs,
            self.discovery,
        ) {
            debug!("Request excluded by resource rules");
            return Ok(false);
        }

        if !matches_resource_rules(&criteria.resource_rules, match_policy, attrs, self.discovery) {
            return Ok(false);
        }

        namespace_match?;
        object_match?;
        Ok(true)
    }

    async fn matches_namespace_selector(
        &self,
        attrs: &AdmissionAttributes,
        criteria: &MatchResources,
    ) -> Result<bool> {
        let namespace = attrs.namespace();
        let is_namespace = is_namespace_resource(attrs.resource());

        // Cluster-scoped resources are not subject to namespace selection
        if namespace.is_empty() && !is_namespace {
            return Ok(true);
        }

        let selector = Selector::parse(criteria.namespace_selector.as_ref())?;
        if selector.is_empty() {
            return Ok(true);
        }

        // A namespace being created carries its own labels
        let labels = if is_namespace {
            attrs.object_labels()
        } else {
            let ns = within_deadline(
                self.deadline,
                "namespace lookup",
                self.namespaces.get_namespace(namespace),
            )
            .await
            .map_err(|e| match e {
                Error::Timeout(_) => e,
                other => Error::NamespaceLookup {
                    namespace: namespace.to_string(),
                    message: other.to_string(),
                },
            })?;
            ns.metadata.labels.unwrap_or_default()
        };

        Ok(selector.matches(&labels))
    }
}

fn matches_object_selector(attrs: &AdmissionAttributes, criteria: &MatchResources) -> Result<bool> {
    let selector = Selector::parse(criteria.object_selector.as_ref())?;
    if selector.is_empty() {
        return Ok(true);
    }
    Ok(selector.matches(&attrs.object_labels()))
}
