//! Admission request attributes built from a resource under evaluation

use std::collections::BTreeMap;

use kube::core::admission::Operation;
use kube::core::{DynamicObject, GroupVersion, GroupVersionKind, GroupVersionResource};

use crate::error::{Error, Result};

/// The attributes of a simulated admission request
///
/// The object is an owned copy, so matching and evaluation never observe
/// changes made by the caller to the original resource.
#[derive(Clone, Debug)]
pub struct AdmissionAttributes {
    object: DynamicObject,
    kind: GroupVersionKind,
    resource: GroupVersionResource,
    namespace: String,
    name: String,
    subresource: String,
    operation: Operation,
    dry_run: bool,
}

impl AdmissionAttributes {
    /// Build CREATE attributes for `resource`, addressed by `gvr`
    pub fn for_create(resource: &DynamicObject, gvr: GroupVersionResource) -> Result<Self> {
        let kind = resource_gvk(resource)?;
        Ok(Self {
            object: resource.clone(),
            kind,
            resource: gvr,
            namespace: resource.metadata.namespace.clone().unwrap_or_default(),
            name: resource.metadata.name.clone().unwrap_or_default(),
            subresource: String::new(),
            operation: Operation::Create,
            dry_run: false,
        })
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    pub fn kind(&self) -> &GroupVersionKind {
        &self.kind
    }

    pub fn resource(&self) -> &GroupVersionResource {
        &self.resource
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subresource(&self) -> &str {
        &self.subresource
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Labels of the object under admission
    pub fn object_labels(&self) -> BTreeMap<String, String> {
        self.object.metadata.labels.clone().unwrap_or_default()
    }

    /// The object serialized as it would appear on the wire
    pub fn object_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.object)
            .map_err(|e| Error::InvalidResource(format!("failed to serialize object: {}", e)))
    }

    /// `namespace/Kind/name`, used to identify the resource in logs
    pub fn resource_path(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.kind.kind, self.name)
    }
}

/// Read the group/version/kind from a resource's type metadata
pub fn resource_gvk(resource: &DynamicObject) -> Result<GroupVersionKind> {
    let types = resource
        .types
        .as_ref()
        .ok_or_else(|| Error::InvalidResource("resource has no apiVersion/kind".to_string()))?;

    if types.kind.is_empty() {
        return Err(Error::InvalidResource("resource has an empty kind".to_string()));
    }

    let gv: GroupVersion = types.api_version.parse().map_err(|e| {
        Error::InvalidResource(format!("invalid apiVersion {:?}: {}", types.api_version, e))
    })?;

    Ok(GroupVersionKind::gvk(&gv.group, &gv.version, &types.kind))
}
