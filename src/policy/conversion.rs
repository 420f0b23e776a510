//! Conversion between the v1alpha1 and v1beta1 policy revisions
//!
//! Both revisions carry the same fields, so every conversion is total and
//! lossless. Each field is mapped explicitly; adding a field to one revision
//! without the other fails to compile here.

use super::{v1alpha1 as alpha, v1beta1 as beta};

/// Convert a v1alpha1 policy to the v1beta1 revision used for matching
pub fn convert_policy(policy: &alpha::ValidatingAdmissionPolicy) -> beta::ValidatingAdmissionPolicy {
    policy.clone().into()
}

/// Convert a v1alpha1 binding to the v1beta1 revision used for matching
pub fn convert_binding(
    binding: &alpha::ValidatingAdmissionPolicyBinding,
) -> beta::ValidatingAdmissionPolicyBinding {
    binding.clone().into()
}

/// Implements `From` in both directions for enums whose variants are
/// identical across revisions
macro_rules! convert_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl From<alpha::$name> for beta::$name {
            fn from(value: alpha::$name) -> Self {
                match value {
                    $(alpha::$name::$variant => beta::$name::$variant,)+
                }
            }
        }

        impl From<beta::$name> for alpha::$name {
            fn from(value: beta::$name) -> Self {
                match value {
                    $(beta::$name::$variant => alpha::$name::$variant,)+
                }
            }
        }
    };
}

convert_enum!(OperationType { All, Create, Update, Delete, Connect });
convert_enum!(ScopeType { All, Cluster, Namespaced });
convert_enum!(MatchPolicyType { Exact, Equivalent });
convert_enum!(FailurePolicyType { Ignore, Fail });
convert_enum!(ParameterNotFoundActionType { Allow, Deny });
convert_enum!(ValidationAction { Deny, Warn, Audit });

/// Implements `From` in both directions for structs whose fields are
/// identical across revisions. `nested` fields are converted with `into`,
/// `into` fields element-wise through `Option`/`Vec`, the rest are moved.
macro_rules! convert_struct {
    ($name:ident { plain: [$($plain:ident),*], into: [$($conv:ident),*] }) => {
        convert_struct!($name { plain: [$($plain),*], nested: [], into: [$($conv),*] });
    };
    ($name:ident { plain: [$($plain:ident),*], nested: [$($nested:ident),*], into: [$($conv:ident),*] }) => {
        impl From<alpha::$name> for beta::$name {
            fn from(value: alpha::$name) -> Self {
                beta::$name {
                    $($plain: value.$plain,)*
                    $($nested: value.$nested.into(),)*
                    $($conv: ConvertField::convert_field(value.$conv),)*
                }
            }
        }

        impl From<beta::$name> for alpha::$name {
            fn from(value: beta::$name) -> Self {
                alpha::$name {
                    $($plain: value.$plain,)*
                    $($nested: value.$nested.into(),)*
                    $($conv: ConvertField::convert_field(value.$conv),)*
                }
            }
        }
    };
}

/// Field-level conversion lifting `From` through `Option` and `Vec`
trait ConvertField<T> {
    fn convert_field(self) -> T;
}

impl<A, B: From<A>> ConvertField<Option<B>> for Option<A> {
    fn convert_field(self) -> Option<B> {
        self.map(B::from)
    }
}

impl<A, B: From<A>> ConvertField<Vec<B>> for Vec<A> {
    fn convert_field(self) -> Vec<B> {
        self.into_iter().map(B::from).collect()
    }
}

convert_struct!(ValidatingAdmissionPolicy { plain: [metadata], nested: [spec], into: [] });
convert_struct!(ValidatingAdmissionPolicySpec {
    plain: [],
    into: [
        param_kind,
        match_constraints,
        validations,
        failure_policy,
        audit_annotations,
        match_conditions,
        variables
    ]
});
convert_struct!(ParamKind { plain: [api_version, kind], into: [] });
convert_struct!(MatchResources {
    plain: [namespace_selector, object_selector],
    into: [resource_rules, exclude_resource_rules, match_policy]
});
convert_struct!(NamedRuleWithOperations {
    plain: [resource_names, api_groups, api_versions, resources],
    into: [operations, scope]
});
convert_struct!(Validation { plain: [expression, message, reason, message_expression], into: [] });
convert_struct!(AuditAnnotation { plain: [key, value_expression], into: [] });
convert_struct!(MatchCondition { plain: [name, expression], into: [] });
convert_struct!(Variable { plain: [name, expression], into: [] });
convert_struct!(ValidatingAdmissionPolicyBinding { plain: [metadata], nested: [spec], into: [] });
convert_struct!(ValidatingAdmissionPolicyBindingSpec {
    plain: [policy_name],
    into: [param_ref, match_resources, validation_actions]
});
convert_struct!(ParamRef {
    plain: [name, namespace, selector],
    into: [parameter_not_found_action]
});
