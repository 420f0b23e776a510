//! Kinds targeted by a policy's resource rules

use crate::policy::ValidatingAdmissionPolicy;

/// List the kinds a policy's resource rules select, as
/// `[group/]version/Kind[/subresource]`
///
/// Only the first group and first version of each rule are used. A rule
/// without `apiGroups` targets the core group; a rule without
/// `apiVersions` has no addressable kinds and is skipped.
pub fn target_kinds(policy: &ValidatingAdmissionPolicy) -> Vec<String> {
    let Some(constraints) = policy.spec.match_constraints.as_ref() else {
        return Vec::new();
    };

    let mut kinds = Vec::new();
    for rule in &constraints.resource_rules {
        let group = rule.api_groups.first().map(String::as_str).unwrap_or_default();
        let Some(version) = rule.api_versions.first() else {
            continue;
        };

        for resource in &rule.resources {
            let mut parts = Vec::with_capacity(4);
            if !group.is_empty() {
                parts.push(group.to_string());
            }
            parts.push(version.clone());
            match resource.split_once('/') {
                Some((parent, subresource)) => {
                    let subresource = subresource.split('/').next().unwrap_or_default();
                    parts.push(kind_from_resource(parent));
                    parts.push(subresource.to_string());
                }
                None => parts.push(kind_from_resource(resource)),
            }
            kinds.push(parts.join("/"));
        }
    }
    kinds
}

/// `deployments` -> `Deployment`
fn kind_from_resource(resource: &str) -> String {
    let title = title_case(resource);
    match title.strip_suffix('s') {
        Some(kind) => kind.to_string(),
        None => title,
    }
}

/// Upper-case the first letter of every word, leaving the rest untouched
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut word_start = true;
    for c in value.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !c.is_alphanumeric();
    }
    out
}
