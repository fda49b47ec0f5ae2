//! The control-plane boundary.
//!
//! Workflows only talk to the cluster through [`ControlPlane`], so they can
//! run against the real API server ([`KubeControlPlane`]) or against the
//! in-memory implementation used by tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch as KubePatch, PatchParams, PostParams},
    core::{DynamicObject, ObjectMeta},
    discovery::{self, Scope},
    Client, ResourceExt,
};

use crate::errors::ClientError;
use crate::types::{timestamp, NamespaceSnapshot, ResourceKind};

/// Name of the core ("legacy") API group.
pub const CORE_GROUP: &str = "";

/// Remote operations the workflows need from the cluster.
///
/// Kind enumeration is split into `list_groups` and `list_group_kinds` so
/// that a failure in one API group can be skipped by the caller.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Names of every API group served, the core group included as `""`.
    async fn list_groups(&self) -> Result<Vec<String>, ClientError>;

    /// Resource kinds of the preferred version of one API group.
    async fn list_group_kinds(&self, group: &str) -> Result<Vec<ResourceKind>, ClientError>;

    async fn list_namespaces(&self) -> Result<Vec<NamespaceSnapshot>, ClientError>;

    async fn get_namespace(&self, name: &str) -> Result<NamespaceSnapshot, ClientError>;

    /// Create the namespace, succeeding if it already exists.
    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError>;

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, ClientError>;

    async fn get_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ClientError>;

    /// Apply a strategic merge patch.
    async fn patch_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &[u8],
    ) -> Result<DynamicObject, ClientError>;

    async fn update_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;

    /// Create an object. An existing object is reported as
    /// [`ClientError::AlreadyExists`].
    async fn create_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;

    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError>;
}

/// [`ControlPlane`] backed by a kube client.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, kind: &ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

/// Map API status codes onto the recoverable error kinds.
fn classify(err: kube::Error, what: String) -> ClientError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            ClientError::AlreadyExists(what)
        }
        kube::Error::Api(ref resp) if resp.code == 404 => ClientError::NotFound(what),
        other => ClientError::Kube(other),
    }
}

fn snapshot(ns: &Namespace) -> NamespaceSnapshot {
    let phase_terminating = ns
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .is_some_and(|phase| phase == "Terminating");
    let deletion_timestamp = ns.metadata.deletion_timestamp.as_ref().and_then(timestamp);

    NamespaceSnapshot {
        name: ns.name_any(),
        is_terminating: ns.metadata.deletion_timestamp.is_some() || phase_terminating,
        deletion_timestamp,
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_groups(&self) -> Result<Vec<String>, ClientError> {
        let groups = self.client.list_api_groups().await?;
        let mut names = vec![CORE_GROUP.to_string()];
        names.extend(groups.groups.into_iter().map(|g| g.name));
        Ok(names)
    }

    async fn list_group_kinds(&self, group: &str) -> Result<Vec<ResourceKind>, ClientError> {
        let api_group = discovery::oneshot::group(&self.client, group).await?;

        let kinds = api_group
            .recommended_resources()
            .into_iter()
            .map(|(ar, caps)| ResourceKind {
                group: ar.group,
                version: ar.version,
                plural: ar.plural,
                kind: ar.kind,
                namespaced: matches!(caps.scope, Scope::Namespaced),
                verbs: caps.operations.into_iter().collect(),
            })
            .collect();
        Ok(kinds)
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceSnapshot>, ClientError> {
        let list = self.namespaces().list(&ListParams::default()).await?;
        Ok(list.items.iter().map(snapshot).collect())
    }

    async fn get_namespace(&self, name: &str) -> Result<NamespaceSnapshot, ClientError> {
        let ns = self
            .namespaces()
            .get(name)
            .await
            .map_err(|e| classify(e, format!("namespace {name}")))?;
        Ok(snapshot(&ns))
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError> {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match self.namespaces().create(&PostParams::default(), &ns).await {
            Ok(_) => Ok(()),
            Err(e) => match classify(e, format!("namespace {name}")) {
                ClientError::AlreadyExists(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        let list = self
            .dynamic_api(kind, namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn get_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ClientError> {
        self.dynamic_api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, format!("{} {namespace}/{name}", kind.kind)))
    }

    async fn patch_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &[u8],
    ) -> Result<DynamicObject, ClientError> {
        let body: serde_json::Value = serde_json::from_slice(patch)?;
        self.dynamic_api(kind, namespace)
            .patch(name, &PatchParams::default(), &KubePatch::Strategic(body))
            .await
            .map_err(|e| classify(e, format!("{} {namespace}/{name}", kind.kind)))
    }

    async fn update_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        self.dynamic_api(kind, namespace)
            .replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| classify(e, format!("{} {namespace}/{name}", kind.kind)))
    }

    async fn create_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        self.dynamic_api(kind, namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify(e, format!("{} {namespace}/{}", kind.kind, object.name_any())))
    }

    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        self.dynamic_api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, format!("{} {namespace}/{name}", kind.kind)))?;
        Ok(())
    }
}
