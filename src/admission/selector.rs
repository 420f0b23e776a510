//! Label selector evaluation for namespace and object selectors

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            Operator::In => labels.get(&self.key).is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => labels.get(&self.key).is_none_or(|v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// A parsed label selector. All requirements must hold for a match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse a selector, rejecting malformed requirements
    ///
    /// `None` parses to the empty selector, which matches everything.
    pub fn parse(selector: Option<&LabelSelector>) -> Result<Self> {
        let Some(selector) = selector else {
            return Ok(Self::default());
        };

        let mut requirements = Vec::new();

        for (key, value) in selector.match_labels.iter().flatten() {
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::In,
                values: BTreeSet::from([value.clone()]),
            });
        }

        for expr in selector.match_expressions.iter().flatten() {
            let values: BTreeSet<String> = expr.values.iter().flatten().cloned().collect();
            let operator = match expr.operator.as_str() {
                "In" => Operator::In,
                "NotIn" => Operator::NotIn,
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => {
                    return Err(Error::Matching(format!(
                        "{:?} is not a valid label selector operator",
                        other
                    )));
                }
            };

            match operator {
                Operator::In | Operator::NotIn if values.is_empty() => {
                    return Err(Error::Matching(format!(
                        "values must be non-empty for operator {:?} on key {:?}",
                        expr.operator, expr.key
                    )));
                }
                Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                    return Err(Error::Matching(format!(
                        "values must be empty for operator {:?} on key {:?}",
                        expr.operator, expr.key
                    )));
                }
                _ => {}
            }

            if expr.key.is_empty() {
                return Err(Error::Matching("label selector key must not be empty".to_string()));
            }

            requirements.push(Requirement {
                key: expr.key.clone(),
                operator,
                values,
            });
        }

        Ok(Self { requirements })
    }

    /// An empty selector selects everything
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}
