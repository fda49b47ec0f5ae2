use std::io::Write;

use futures::StreamExt;

use crate::cluster::{tree, walker, ControlPlane};
use crate::configuration::EvictedConfig;
use crate::errors::{AppError, RemoteWriteError, WriteOp};
use crate::types::{LiveObject, ResourceKind};

const EVICTED_REASON: &str = "Evicted";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictedSummary {
    pub found: usize,
    pub deleted: usize,
}

/// Pods the node agent evicted keep `status.reason: Evicted` until removed.
pub fn is_evicted(pod: &LiveObject) -> bool {
    tree::lookup_str(&pod.object.data, &["status", "reason"]) == Some(EVICTED_REASON)
}

fn message(pod: &LiveObject) -> &str {
    tree::lookup_str(&pod.object.data, &["status", "message"]).unwrap_or_default()
}

/// List evicted pods in every namespace, deleting them with `--delete`.
///
/// A failed delete ends the run.
pub async fn run(
    control_plane: &dyn ControlPlane,
    config: &EvictedConfig,
    out: &mut dyn Write,
) -> Result<EvictedSummary, AppError> {
    let kinds = [ResourceKind::pods()];
    let mut pods = walker::walk(control_plane, None, &kinds).await?;
    let mut summary = EvictedSummary::default();

    while let Some(pod) = pods.next().await {
        if !is_evicted(&pod) {
            continue;
        }

        summary.found += 1;
        let namespace = pod.namespace();
        let name = pod.name();
        writeln!(out, "Ns: {namespace}, pod: {name}, message: {}", message(&pod))?;

        if config.delete {
            control_plane
                .delete_object(&pod.resource, &namespace, &name)
                .await
                .map_err(|source| RemoteWriteError::new(WriteOp::Delete, pod.kind(), &namespace, &name, source))?;
            tracing::info!("Deleted evicted pod {}/{}", namespace, name);
            summary.deleted += 1;
        }
    }

    tracing::info!(found = summary.found, deleted = summary.deleted, "Evicted pod scan finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{Call, MemoryControlPlane};
    use crate::types::NamespaceSnapshot;
    use assert_matches::assert_matches;
    use kube::core::DynamicObject;
    use serde_json::json;

    fn pod(ns: &str, name: &str, reason: Option<&str>) -> DynamicObject {
        let mut status = json!({"phase": "Failed"});
        if let Some(reason) = reason {
            status["reason"] = json!(reason);
            status["message"] = json!("The node was low on resource: memory.");
        }
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": ns},
            "status": status
        }))
        .unwrap()
    }

    fn cluster() -> MemoryControlPlane {
        let pods = ResourceKind::pods();
        MemoryControlPlane::new()
            .with_namespace(NamespaceSnapshot::active("a"))
            .with_namespace(NamespaceSnapshot::active("b"))
            .with_object(&pods, pod("a", "evicted-1", Some("Evicted")))
            .with_object(&pods, pod("a", "crashed", Some("OOMKilled")))
            .with_object(&pods, pod("b", "evicted-2", Some("Evicted")))
            .with_object(&pods, pod("b", "running", None))
    }

    #[tokio::test]
    async fn reports_evicted_pods_only() {
        let cp = cluster();
        let mut out = Vec::new();
        let summary = run(&cp, &EvictedConfig::default(), &mut out).await.unwrap();

        assert_eq!(summary, EvictedSummary { found: 2, deleted: 0 });
        let report = String::from_utf8(out).unwrap();
        assert_eq!(
            report,
            "Ns: a, pod: evicted-1, message: The node was low on resource: memory.\n\
             Ns: b, pod: evicted-2, message: The node was low on resource: memory.\n"
        );
        assert!(!cp.calls().iter().any(|c| matches!(c, Call::Delete { .. })));
    }

    #[tokio::test]
    async fn delete_mode_removes_them() {
        let cp = cluster();
        let summary = run(&cp, &EvictedConfig { delete: true }, &mut Vec::new()).await.unwrap();

        assert_eq!(summary.deleted, 2);
        assert!(cp.object("pods", "a", "evicted-1").is_none());
        assert!(cp.object("pods", "b", "evicted-2").is_none());
        assert!(cp.object("pods", "a", "crashed").is_some());
    }

    #[tokio::test]
    async fn failed_delete_is_fatal() {
        let cp = cluster().with_rejected_writes("evicted-1");
        let result = run(&cp, &EvictedConfig { delete: true }, &mut Vec::new()).await;

        assert_matches!(result, Err(AppError::Write(why)) if why.op == WriteOp::Delete);
        assert!(cp.object("pods", "b", "evicted-2").is_some());
    }
}
