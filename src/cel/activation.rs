//! Values visible to policy expressions
//!
//! JSON documents are converted to CEL values up front, once per evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::objects::Map;
use cel_interpreter::{Context, Value};
use kube::core::admission::Operation;
use serde_json::json;

use crate::admission::AdmissionAttributes;
use crate::error::Result;

pub const OBJECT: &str = "object";
pub const OLD_OBJECT: &str = "oldObject";
pub const REQUEST: &str = "request";
pub const PARAMS: &str = "params";
pub const NAMESPACE_OBJECT: &str = "namespaceObject";
pub const VARIABLES: &str = "variables";
pub const AUTHORIZER: &str = "authorizer";

/// Top-level bindings of one evaluation
#[derive(Clone, Debug)]
pub struct Activation {
    object: Value,
    old_object: Value,
    request: Value,
    params: Value,
    namespace_object: Value,
}

impl Activation {
    /// Build the activation for a CREATE request without params
    ///
    /// `oldObject`, `params` and `namespaceObject` are null.
    pub fn from_attributes(attrs: &AdmissionAttributes) -> Result<Self> {
        let object = json_to_value(&attrs.object_value()?);
        let request = json_to_value(&request_info(attrs));

        Ok(Self {
            object,
            old_object: Value::Null,
            request,
            params: Value::Null,
            namespace_object: Value::Null,
        })
    }

    /// Create an evaluation context exposing this activation and the
    /// variables evaluated so far
    pub fn context(&self, variables: &HashMap<Arc<String>, Value>) -> Context<'static> {
        let mut context = Context::default();
        context.add_variable_from_value(OBJECT, self.object.clone());
        context.add_variable_from_value(OLD_OBJECT, self.old_object.clone());
        context.add_variable_from_value(REQUEST, self.request.clone());
        context.add_variable_from_value(PARAMS, self.params.clone());
        context.add_variable_from_value(NAMESPACE_OBJECT, self.namespace_object.clone());
        context.add_variable_from_value(VARIABLES, Value::Map(Map::from(variables.clone())));
        context
    }
}

fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// The `request` variable, shaped like an AdmissionRequest
fn request_info(attrs: &AdmissionAttributes) -> serde_json::Value {
    let kind = attrs.kind();
    let resource = attrs.resource();
    json!({
        "kind": {
            "group": kind.group,
            "version": kind.version,
            "kind": kind.kind,
        },
        "resource": {
            "group": resource.group,
            "version": resource.version,
            "resource": resource.resource,
        },
        "subResource": attrs.subresource(),
        "name": attrs.name(),
        "namespace": attrs.namespace(),
        "operation": operation_name(attrs.operation()),
        "userInfo": {},
        "dryRun": attrs.dry_run(),
    })
}

/// Convert a JSON document to a CEL value
///
/// Integers that fit `i64` become `Int` so they compare naturally with
/// integer literals; larger ones become `UInt`.
pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::Float)
            }
        }
        serde_json::Value::String(s) => Value::String(Arc::new(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(Arc::new(items.iter().map(json_to_value).collect()))
        }
        serde_json::Value::Object(fields) => {
            let map: HashMap<Arc<String>, Value> = fields
                .iter()
                .map(|(k, v)| (Arc::new(k.clone()), json_to_value(v)))
                .collect();
            Value::Map(Map::from(map))
        }
    }
}
