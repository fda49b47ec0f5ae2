use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;

const VERB_LIST: &str = "list";

/// A resource type exposed by the control plane, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: BTreeSet<String>,
}

impl ResourceKind {
    pub fn new<G, V, P, K>(group: G, version: V, plural: P, kind: K) -> Self
    where
        G: Into<String>,
        V: Into<String>,
        P: Into<String>,
        K: Into<String>,
    {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            kind: kind.into(),
            namespaced: true,
            verbs: BTreeSet::new(),
        }
    }

    pub fn with_verbs<I, S>(mut self, verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.verbs = verbs.into_iter().map(Into::into).collect();
        self
    }

    pub fn cluster_scoped(mut self) -> Self {
        self.namespaced = false;
        self
    }

    /// `apiVersion` string, `v1` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn can_list(&self) -> bool {
        self.verbs.contains(VERB_LIST)
    }

    /// The kube `ApiResource` used to address this kind dynamically.
    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }

    pub fn config_maps() -> Self {
        Self::new("", "v1", "configmaps", "ConfigMap")
            .with_verbs(["create", "delete", "get", "list", "patch", "update"])
    }

    pub fn pods() -> Self {
        Self::new("", "v1", "pods", "Pod")
            .with_verbs(["create", "delete", "get", "list", "patch", "update"])
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.plural)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.plural)
        }
    }
}

/// Point-in-time view of a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub is_terminating: bool,
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl NamespaceSnapshot {
    pub fn active<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            is_terminating: false,
            deletion_timestamp: None,
        }
    }

    pub fn terminating<S: Into<String>>(name: S, since: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            is_terminating: true,
            deletion_timestamp: Some(since),
        }
    }
}

/// One object read from the cluster together with the kind it was listed as.
///
/// List responses usually omit `apiVersion`/`kind` on items, so the kind is
/// carried alongside the object.
#[derive(Debug, Clone)]
pub struct LiveObject {
    pub resource: ResourceKind,
    pub object: DynamicObject,
}

impl LiveObject {
    pub fn new(resource: ResourceKind, object: DynamicObject) -> Self {
        Self { resource, object }
    }

    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    pub fn name(&self) -> String {
        self.object.name_any()
    }

    pub fn namespace(&self) -> String {
        self.object.namespace().unwrap_or_default()
    }

    pub fn finalizers(&self) -> &[String] {
        self.object.finalizers()
    }

    pub fn deletion_timestamp(&self) -> Option<DateTime<Utc>> {
        self.object
            .metadata
            .deletion_timestamp
            .as_ref()
            .and_then(timestamp)
    }

    /// Marked for deletion but held back by at least one finalizer.
    pub fn is_blocked_by_finalizers(&self) -> bool {
        self.object.metadata.deletion_timestamp.is_some() && !self.finalizers().is_empty()
    }
}

/// Convert an API timestamp through its RFC 3339 wire form.
pub fn timestamp(time: &Time) -> Option<DateTime<Utc>> {
    let wire = serde_json::to_value(time).ok()?;
    wire.as_str()?.parse::<DateTime<Utc>>().ok()
}

/// Operation performed by a load generation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

/// A single unit of load generation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub operation: Operation,
}
