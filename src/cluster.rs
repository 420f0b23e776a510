//! Cluster collaborators used during matching
//!
//! Discovery and namespace lookup are the only cluster reads an evaluation
//! performs. Both are traits so evaluation can run against a live cluster
//! through [`KubeCluster`] or against in-memory fixtures.

use std::future::Future;

use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Namespace;
use kube::core::{GroupVersionKind, GroupVersionResource};
use kube::{Api, Client};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Maps a kind to the resource that serves it
pub trait Discovery: Send + Sync {
    fn resolve_gvr<'a>(
        &'a self,
        gvk: &'a GroupVersionKind,
    ) -> BoxFuture<'a, Result<GroupVersionResource>>;

    /// Other group/version/resources serving the same objects as `gvr`
    /// (e.g. `extensions/v1beta1/deployments` for `apps/v1/deployments`).
    /// Consulted only for the `Equivalent` match policy.
    fn equivalent_resources(&self, _gvr: &GroupVersionResource) -> Vec<GroupVersionResource> {
        Vec::new()
    }
}

/// Looks up namespace objects by name
pub trait NamespaceLister: Send + Sync {
    fn get_namespace<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Namespace>>;
}

/// Whether an evaluation can reach the cluster
///
/// Without cluster access, no matching is performed and the policy is
/// evaluated unconditionally against the resource.
#[derive(Clone, Copy)]
pub enum ClusterAccess<'a> {
    Connected {
        discovery: &'a dyn Discovery,
        namespaces: &'a dyn NamespaceLister,
    },
    Disconnected,
}

impl<'a> ClusterAccess<'a> {
    /// Use one collaborator for both discovery and namespace lookups
    pub fn connected<C>(cluster: &'a C) -> Self
    where
        C: Discovery + NamespaceLister,
    {
        ClusterAccess::Connected {
            discovery: cluster,
            namespaces: cluster,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ClusterAccess::Connected { .. })
    }
}

impl std::fmt::Debug for ClusterAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterAccess::Connected { .. } => f.write_str("Connected"),
            ClusterAccess::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Collaborators backed by a Kubernetes API client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Discovery for KubeCluster {
    fn resolve_gvr<'a>(
        &'a self,
        gvk: &'a GroupVersionKind,
    ) -> BoxFuture<'a, Result<GroupVersionResource>> {
        Box::pin(async move {
            let (resource, _capabilities) = kube::discovery::pinned_kind(&self.client, gvk).await?;
            debug!(
                group = %resource.group,
                version = %resource.version,
                plural = %resource.plural,
                "Resolved resource for kind {}",
                gvk.kind
            );
            Ok(GroupVersionResource::gvr(
                &resource.group,
                &resource.version,
                &resource.plural,
            ))
        })
    }
}

impl NamespaceLister for KubeCluster {
    fn get_namespace<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Namespace>> {
        Box::pin(async move {
            let namespaces: Api<Namespace> = Api::all(self.client.clone());
            Ok(namespaces.get(name).await?)
        })
    }
}

/// Await a collaborator call, failing with [`Error::Timeout`] once `deadline`
/// passes
pub(crate) async fn within_deadline<T>(
    deadline: Option<Instant>,
    stage: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .map_err(|_| Error::Timeout(stage))?,
        None => call.await,
    }
}
