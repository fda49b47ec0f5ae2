//! In-memory [`ControlPlane`] that records every call.
//!
//! Used by the test suites to drive the workflows without a cluster.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::{core::DynamicObject, ResourceExt};
use serde_json::Value;

use crate::cluster::control_plane::ControlPlane;
use crate::errors::ClientError;
use crate::ops::patch::apply_merge_patch;
use crate::types::{NamespaceSnapshot, ResourceKind};

/// A recorded control-plane call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListGroups,
    ListGroupKinds(String),
    ListNamespaces,
    GetNamespace(String),
    EnsureNamespace(String),
    List { plural: String, namespace: String },
    Get { plural: String, namespace: String, name: String },
    Patch { plural: String, namespace: String, name: String, patch: Value },
    Update { plural: String, namespace: String, name: String, object: Value },
    Create { plural: String, namespace: String, name: String },
    Delete { plural: String, namespace: String, name: String },
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    kinds: BTreeMap<String, Vec<ResourceKind>>,
    broken_groups: HashSet<String>,
    namespaces: Vec<NamespaceSnapshot>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    broken_lists: HashSet<(String, String)>,
    rejected_writes: HashSet<String>,
    broken_reads: HashSet<String>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct MemoryControlPlane {
    state: Mutex<State>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `kind` as part of its API group.
    pub fn with_kind(self, kind: ResourceKind) -> Self {
        self.lock().kinds.entry(kind.group.clone()).or_default().push(kind);
        self
    }

    /// Make discovery of `group` fail.
    pub fn with_broken_group<S: Into<String>>(self, group: S) -> Self {
        let group = group.into();
        self.lock().kinds.entry(group.clone()).or_default();
        self.lock().broken_groups.insert(group);
        self
    }

    pub fn with_namespace(self, namespace: NamespaceSnapshot) -> Self {
        self.lock().namespaces.push(namespace);
        self
    }

    /// Store an object under `kind`, keyed by its metadata namespace and name.
    pub fn with_object(self, kind: &ResourceKind, object: DynamicObject) -> Self {
        let key = (
            kind.plural.clone(),
            object.namespace().unwrap_or_default(),
            object.name_any(),
        );
        self.lock().objects.insert(key, object);
        self
    }

    /// Make listing `plural` in `namespace` fail.
    pub fn with_broken_list<P: Into<String>, N: Into<String>>(self, plural: P, namespace: N) -> Self {
        self.lock().broken_lists.insert((plural.into(), namespace.into()));
        self
    }

    /// Reject every write to objects with this name.
    pub fn with_rejected_writes<S: Into<String>>(self, name: S) -> Self {
        self.lock().rejected_writes.insert(name.into());
        self
    }

    /// Fail every get of objects with this name.
    pub fn with_broken_reads<S: Into<String>>(self, name: S) -> Self {
        self.lock().broken_reads.insert(name.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn object(&self, plural: &str, namespace: &str, name: &str) -> Option<DynamicObject> {
        let key = (plural.to_string(), namespace.to_string(), name.to_string());
        self.lock().objects.get(&key).cloned()
    }

    pub fn object_count(&self, plural: &str) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|(p, _, _)| p == plural)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // a panicking test thread must not hide the calls recorded so far
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    fn check_write(&self, name: &str) -> Result<(), ClientError> {
        if self.lock().rejected_writes.contains(name) {
            return Err(ClientError::rejected(500, "InternalError", format!("write to {name} rejected")));
        }
        Ok(())
    }
}

fn key(kind: &ResourceKind, namespace: &str, name: &str) -> ObjectKey {
    (kind.plural.clone(), namespace.to_string(), name.to_string())
}

fn describe(kind: &ResourceKind, namespace: &str, name: &str) -> String {
    format!("{} {namespace}/{name}", kind.kind)
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn list_groups(&self) -> Result<Vec<String>, ClientError> {
        self.record(Call::ListGroups);
        Ok(self.lock().kinds.keys().cloned().collect())
    }

    async fn list_group_kinds(&self, group: &str) -> Result<Vec<ResourceKind>, ClientError> {
        self.record(Call::ListGroupKinds(group.to_string()));
        let state = self.lock();
        if state.broken_groups.contains(group) {
            return Err(ClientError::rejected(503, "ServiceUnavailable", format!("group {group:?} unavailable")));
        }
        Ok(state.kinds.get(group).cloned().unwrap_or_default())
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceSnapshot>, ClientError> {
        self.record(Call::ListNamespaces);
        Ok(self.lock().namespaces.clone())
    }

    async fn get_namespace(&self, name: &str) -> Result<NamespaceSnapshot, ClientError> {
        self.record(Call::GetNamespace(name.to_string()));
        self.lock()
            .namespaces
            .iter()
            .find(|ns| ns.name == name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("namespace {name}")))
    }

    async fn ensure_namespace(&self, name: &str) -> Result<(), ClientError> {
        self.record(Call::EnsureNamespace(name.to_string()));
        let mut state = self.lock();
        if !state.namespaces.iter().any(|ns| ns.name == name) {
            state.namespaces.push(NamespaceSnapshot::active(name));
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        kind: &ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, ClientError> {
        self.record(Call::List {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
        });
        let state = self.lock();
        if state.broken_lists.contains(&(kind.plural.clone(), namespace.to_string())) {
            return Err(ClientError::rejected(
                403,
                "Forbidden",
                format!("cannot list {} in {namespace}", kind.plural),
            ));
        }
        Ok(state
            .objects
            .iter()
            .filter(|((plural, ns, _), _)| *plural == kind.plural && ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, ClientError> {
        self.record(Call::Get {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let state = self.lock();
        if state.broken_reads.contains(name) {
            return Err(ClientError::rejected(500, "InternalError", format!("read of {name} failed")));
        }
        state
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(describe(kind, namespace, name)))
    }

    async fn patch_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: &[u8],
    ) -> Result<DynamicObject, ClientError> {
        let patch: Value = serde_json::from_slice(patch)?;
        self.record(Call::Patch {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            patch: patch.clone(),
        });
        self.check_write(name)?;

        let mut state = self.lock();
        let stored = state
            .objects
            .get_mut(&key(kind, namespace, name))
            .ok_or_else(|| ClientError::NotFound(describe(kind, namespace, name)))?;
        let mut doc = serde_json::to_value(&*stored)?;
        apply_merge_patch(&mut doc, &patch);
        *stored = serde_json::from_value(doc)?;
        Ok(stored.clone())
    }

    async fn update_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        self.record(Call::Update {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            object: serde_json::to_value(object)?,
        });
        self.check_write(name)?;

        let mut state = self.lock();
        let stored = state
            .objects
            .get_mut(&key(kind, namespace, name))
            .ok_or_else(|| ClientError::NotFound(describe(kind, namespace, name)))?;
        *stored = object.clone();
        Ok(stored.clone())
    }

    async fn create_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        let name = object.name_any();
        self.record(Call::Create {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
            name: name.clone(),
        });
        self.check_write(&name)?;

        let mut state = self.lock();
        let key = key(kind, namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(describe(kind, namespace, &name)));
        }
        let mut created = object.clone();
        created.metadata.namespace = Some(namespace.to_string());
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn delete_object(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        self.record(Call::Delete {
            plural: kind.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self.check_write(name)?;

        self.lock()
            .objects
            .remove(&key(kind, namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(describe(kind, namespace, name)))
    }
}
