//! Rolling restarts of workload controllers.
//!
//! A restart is requested by stamping an annotation into the pod template,
//! which changes the template hash and makes the controller roll its pods.
//! Only a minimal patch is sent, so unrelated concurrent edits survive.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;

use crate::cluster::{tree, walker, ControlPlane};
use crate::configuration::RestartConfig;
use crate::errors::{AppError, PatchError, RemoteWriteError, WriteOp};
use crate::ops::patch::{create_two_way_merge_patch, Patch};
use crate::types::{LiveObject, ResourceKind};

pub const RESTARTED_AT_ANNOTATION: &str = "ktoolhu/restartedAt";

const POD_TEMPLATE_METADATA: &[&str] = &["spec", "template", "metadata"];

/// Workload controllers that own a pod template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 3] = [
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.as_str() == kind)
    }

    pub fn resource_kind(&self) -> ResourceKind {
        let plural = match self {
            WorkloadKind::Deployment => "deployments",
            WorkloadKind::DaemonSet => "daemonsets",
            WorkloadKind::StatefulSet => "statefulsets",
        };
        ResourceKind::new("apps", "v1", plural, self.as_str())
            .with_verbs(["get", "list", "patch", "update", "watch"])
    }

    pub fn resource_kinds() -> Vec<ResourceKind> {
        Self::ALL.iter().map(WorkloadKind::resource_kind).collect()
    }
}

/// Capability of carrying a pod template.
///
/// Implementors expose their serialized form; the patch generator finds the
/// template metadata through [`HasPodTemplate::template_metadata_path`].
pub trait HasPodTemplate {
    fn workload_kind(&self) -> WorkloadKind;

    fn object_name(&self) -> String;

    fn to_document(&self) -> serde_json::Result<Value>;

    fn template_metadata_path(&self) -> &'static [&'static str] {
        POD_TEMPLATE_METADATA
    }
}

macro_rules! typed_workload {
    ($ty:ty, $kind:expr) => {
        impl HasPodTemplate for $ty {
            fn workload_kind(&self) -> WorkloadKind {
                $kind
            }

            fn object_name(&self) -> String {
                self.name_any()
            }

            fn to_document(&self) -> serde_json::Result<Value> {
                serde_json::to_value(self)
            }
        }
    };
}

typed_workload!(Deployment, WorkloadKind::Deployment);
typed_workload!(DaemonSet, WorkloadKind::DaemonSet);
typed_workload!(StatefulSet, WorkloadKind::StatefulSet);

/// A workload read through the dynamic API.
#[derive(Debug, Clone)]
pub struct RestartTarget {
    kind: WorkloadKind,
    object: DynamicObject,
}

impl RestartTarget {
    pub fn new(kind: WorkloadKind, object: DynamicObject) -> Self {
        Self { kind, object }
    }

    pub fn from_live(live: LiveObject) -> Result<Self, PatchError> {
        let kind = WorkloadKind::from_kind(live.kind())
            .ok_or_else(|| PatchError::UnsupportedKind(live.kind().to_string()))?;
        Ok(Self::new(kind, live.object))
    }
}

impl HasPodTemplate for RestartTarget {
    fn workload_kind(&self) -> WorkloadKind {
        self.kind
    }

    fn object_name(&self) -> String {
        self.object.name_any()
    }

    fn to_document(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.object)
    }
}

/// Generate a restart patch stamped with the current time.
pub fn generate_patch<T: HasPodTemplate + ?Sized>(target: &T) -> Result<Patch, PatchError> {
    generate_patch_at(target, Utc::now())
}

/// Generate a restart patch stamped with `now`.
///
/// The returned patch sets exactly one annotation on the pod template. An
/// existing marker is always overwritten.
pub fn generate_patch_at<T: HasPodTemplate + ?Sized>(
    target: &T,
    now: DateTime<Utc>,
) -> Result<Patch, PatchError> {
    let kind = target.workload_kind().as_str().to_string();
    let name = target.object_name();
    let serialization = |source| PatchError::Serialization {
        kind: kind.clone(),
        name: name.clone(),
        source,
    };

    let original = target.to_document().map_err(serialization)?;
    let mut modified = original.clone();

    let metadata = tree::lookup_map_mut(&mut modified, target.template_metadata_path())
        .map_err(|source| PatchError::MissingTemplate {
            kind: kind.clone(),
            name: name.clone(),
            source,
        })?;
    let annotations = tree::child_map_or_insert(metadata, "annotations").map_err(|source| {
        PatchError::MissingTemplate {
            kind: kind.clone(),
            name: name.clone(),
            source,
        }
    })?;
    annotations.insert(
        RESTARTED_AT_ANNOTATION.to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );

    let patch = create_two_way_merge_patch(&original, &modified);
    let bytes = serde_json::to_vec(&patch).map_err(serialization)?;
    Ok(Patch::from(bytes))
}

/// Outcome of a restart run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestartSummary {
    pub restarted: usize,
    pub failed: usize,
}

/// Restart every Deployment, DaemonSet and StatefulSet in the configured
/// namespace, or in all namespaces when none (or an empty one) is given.
///
/// Each workload is patched independently; a failure is reported and the
/// batch continues.
pub async fn restart_all(
    control_plane: &dyn ControlPlane,
    config: &RestartConfig,
    out: &mut dyn Write,
) -> Result<RestartSummary, AppError> {
    let scope = config.namespace.as_deref().filter(|ns| !ns.is_empty());
    if let Some(namespace) = scope {
        control_plane
            .get_namespace(namespace)
            .await
            .map_err(|source| AppError::namespace(namespace, source))?;
    }

    let kinds = WorkloadKind::resource_kinds();
    let mut workloads = walker::walk(control_plane, scope, &kinds).await?;
    let mut summary = RestartSummary::default();

    while let Some(live) = workloads.next().await {
        let namespace = live.namespace();
        let name = live.name();
        let resource = live.resource.clone();
        writeln!(
            out,
            "Namespace {namespace}, restarting {} {name}",
            resource.kind.to_lowercase()
        )?;

        let patch = match RestartTarget::from_live(live).and_then(|t| generate_patch(&t)) {
            Ok(patch) => patch,
            Err(why) => {
                tracing::error!("Failed to create patch to restart {}: {}", name, why);
                writeln!(out, "Failed to create patch to restart {name}: {why}")?;
                summary.failed += 1;
                continue;
            }
        };

        match control_plane
            .patch_object(&resource, &namespace, &name, patch.as_bytes())
            .await
        {
            Ok(_) => summary.restarted += 1,
            Err(source) => {
                let why = RemoteWriteError::new(WriteOp::Patch, &resource.kind, &namespace, &name, source);
                tracing::error!("{}: {}", why, why.source);
                writeln!(out, "Failed to patch: {why}: {}", why.source)?;
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Restart finished: {} restarted, {} failed",
        summary.restarted,
        summary.failed
    );
    Ok(summary)
}
