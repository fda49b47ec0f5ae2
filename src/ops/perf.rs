//! Load generation against the object store with ConfigMaps.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::core::{DynamicObject, ObjectMeta};

use crate::cluster::ControlPlane;
use crate::configuration::PerfConfig;
use crate::errors::{AppError, RemoteWriteError, WriteOp};
use crate::ops::bounded::run_bounded;
use crate::types::{Operation, ResourceKind, WorkItem};
use crate::APP_NAME;

const DATA_KEY: &str = "data";

/// Counters of one load generation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PerfReport {
    pub created: usize,
    pub already_existed: usize,
    pub create_failed: usize,
    pub updated: usize,
    pub update_failed: usize,
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    already_existed: AtomicUsize,
    create_failed: AtomicUsize,
    updated: AtomicUsize,
    update_failed: AtomicUsize,
}

impl Counters {
    fn report(&self) -> PerfReport {
        PerfReport {
            created: self.created.load(Ordering::Relaxed),
            already_existed: self.already_existed.load(Ordering::Relaxed),
            create_failed: self.create_failed.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            update_failed: self.update_failed.load(Ordering::Relaxed),
        }
    }
}

pub fn object_name(index: usize) -> String {
    format!("{APP_NAME}-{index}")
}

/// Build the ConfigMap written by work item `index` under `name`.
pub fn build_config_map(name: &str, index: usize, padding: &str) -> serde_json::Result<DynamicObject> {
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), APP_NAME.to_string())])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(DATA_KEY.to_string(), format!("{index}{padding}"))])),
        ..Default::default()
    };
    serde_json::from_value(serde_json::to_value(&config_map)?)
}

/// Shared state of one phase.
struct Phase {
    control_plane: Arc<dyn ControlPlane>,
    kind: ResourceKind,
    namespace: String,
    padding: String,
    create: usize,
    counters: Arc<Counters>,
}

impl Phase {
    async fn execute(&self, item: WorkItem) {
        let name = match item.operation {
            Operation::Create => object_name(item.index),
            Operation::Update => object_name(item.index % self.create),
        };

        let (op, failed) = match item.operation {
            Operation::Create => (WriteOp::Create, &self.counters.create_failed),
            Operation::Update => (WriteOp::Update, &self.counters.update_failed),
        };

        let object = match build_config_map(&name, item.index, &self.padding) {
            Ok(object) => object,
            Err(why) => {
                tracing::error!("Failed to build configmap {}: {}", name, why);
                failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let result = match item.operation {
            Operation::Create => {
                self.control_plane
                    .create_object(&self.kind, &self.namespace, &object)
                    .await
            }
            Operation::Update => {
                self.control_plane
                    .update_object(&self.kind, &self.namespace, &name, &object)
                    .await
            }
        };

        match result {
            Ok(_) if op == WriteOp::Create => {
                self.counters.created.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                self.counters.updated.fetch_add(1, Ordering::Relaxed);
            }
            Err(source) if op == WriteOp::Create && source.is_already_exists() => {
                self.counters.already_existed.fetch_add(1, Ordering::Relaxed);
            }
            Err(source) => {
                let why = RemoteWriteError::new(op, &self.kind.kind, &self.namespace, &name, source);
                tracing::error!("{}: {}", why, why.source);
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Create `config.create` ConfigMaps, then issue `config.update` updates
/// cycling over them, with at most `config.parallel` calls in flight.
///
/// The target namespace is created first if missing. Individual write
/// failures are logged and counted, never fatal.
pub async fn run(control_plane: Arc<dyn ControlPlane>, config: &PerfConfig) -> Result<PerfReport, AppError> {
    config.validate()?;

    control_plane
        .ensure_namespace(&config.namespace)
        .await
        .map_err(|source| RemoteWriteError::new(WriteOp::Create, "Namespace", "", &config.namespace, source))?;

    let phase = Arc::new(Phase {
        control_plane,
        kind: ResourceKind::config_maps(),
        namespace: config.namespace.clone(),
        padding: config.padding(),
        create: config.create,
        counters: Arc::new(Counters::default()),
    });

    tracing::info!(
        "Creating {} configmaps in namespace {} with {} parallel workers",
        config.create,
        config.namespace,
        config.parallel
    );
    run_phase(&phase, config.parallel, config.create, Operation::Create).await;

    if config.create == 0 && config.update > 0 {
        tracing::warn!("Skipping {} updates, no configmaps were requested", config.update);
    } else {
        tracing::info!("Updating configmaps {} times", config.update);
        run_phase(&phase, config.parallel, config.update, Operation::Update).await;
    }

    let report = phase.counters.report();
    tracing::info!(
        created = report.created,
        already_existed = report.already_existed,
        create_failed = report.create_failed,
        updated = report.updated,
        update_failed = report.update_failed,
        "Load generation finished"
    );
    Ok(report)
}

async fn run_phase(phase: &Arc<Phase>, parallel: usize, total: usize, operation: Operation) {
    run_bounded(parallel, total, |index| {
        let phase = phase.clone();
        async move { phase.execute(WorkItem { index, operation }).await }
    })
    .await;
}
