//! Finalizer remediation for namespaces stuck in `Terminating`.
//!
//! Removing finalizers skips whatever cleanup their controllers were meant
//! to do. Objects are only modified with `--delete`, and each one is
//! confirmed unless `--yes` is given.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::StreamExt;
use itertools::Itertools;

use crate::cluster::{catalog, walker, ControlPlane};
use crate::configuration::TerminatingConfig;
use crate::errors::{AppError, ListError, RemoteReadError, RemoteWriteError, WriteOp};
use crate::types::{LiveObject, NamespaceSnapshot};

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

/// Writes the question to `prompt` and reads one answer line from `input`.
///
/// Reading blocks the calling thread. The workflow has nothing else in
/// flight while a question is open.
#[derive(Debug)]
pub struct PromptConfirm<R, W> {
    input: R,
    prompt: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, prompt: W) -> Self {
        Self { input, prompt }
    }
}

impl PromptConfirm<io::StdinLock<'static>, io::Stderr> {
    /// Prompts on stderr and reads from stdin.
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        write!(self.prompt, "{question} [y/n] ")?;
        self.prompt.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }
}

/// `y` or `yes`, case-insensitive, surrounding whitespace ignored.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminatingSummary {
    pub namespaces_total: usize,
    pub terminating: usize,
    /// Objects found blocked by finalizers
    pub reported: usize,
    /// Objects whose finalizers were removed
    pub remediated: usize,
    /// Objects left alone after confirmation was declined or the object changed
    pub skipped: usize,
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Report, and in delete mode remove, the finalizers blocking every
/// terminating namespace.
///
/// # Errors
/// Listing namespaces, resolving resource kinds and any failed finalizer
/// removal end the whole run.
pub async fn run(
    control_plane: &dyn ControlPlane,
    config: &TerminatingConfig,
    confirm: &mut dyn Confirm,
    out: &mut dyn Write,
) -> Result<TerminatingSummary, AppError> {
    let namespaces = control_plane
        .list_namespaces()
        .await
        .map_err(|source| ListError::new("namespaces", "", source))?;

    let terminating: Vec<&NamespaceSnapshot> = namespaces.iter().filter(|ns| ns.is_terminating).collect();
    let mut summary = TerminatingSummary {
        namespaces_total: namespaces.len(),
        terminating: terminating.len(),
        ..Default::default()
    };

    writeln!(
        out,
        "Found {} terminating out of {} namespaces",
        summary.terminating, summary.namespaces_total
    )?;
    if terminating.is_empty() {
        return Ok(summary);
    }

    let kinds = catalog::list_namespaced_kinds(control_plane).await?;
    writeln!(out, "Found {} namespaced resources", kinds.len())?;

    for namespace in terminating {
        writeln!(
            out,
            "Namespace {} is terminating since {}",
            namespace.name,
            format_time(namespace.deletion_timestamp)
        )?;

        let mut objects = walker::walk(control_plane, Some(namespace.name.as_str()), &kinds).await?;
        while let Some(live) = objects.next().await {
            if !live.is_blocked_by_finalizers() {
                continue;
            }

            summary.reported += 1;
            writeln!(
                out,
                "Namespaced resource {}/{} is terminating since {} and has finalizers [{}]",
                live.kind(),
                live.name(),
                format_time(live.deletion_timestamp()),
                live.finalizers().iter().join(", ")
            )?;

            if !config.delete {
                continue;
            }

            let target = if config.assume_yes {
                live
            } else {
                let question = format!("Remove finalizers from {}/{}?", live.kind(), live.name());
                if !confirm.confirm(&question)? {
                    summary.skipped += 1;
                    continue;
                }
                match refetch(control_plane, live).await? {
                    Some(fresh) => fresh,
                    None => {
                        summary.skipped += 1;
                        continue;
                    }
                }
            };

            remove_finalizers(control_plane, target, out).await?;
            summary.remediated += 1;
        }
    }

    tracing::info!(
        reported = summary.reported,
        remediated = summary.remediated,
        skipped = summary.skipped,
        "Terminating namespace scan finished"
    );
    Ok(summary)
}

/// Read the object again after the operator answered; it may have been
/// released or removed in the meantime.
async fn refetch(control_plane: &dyn ControlPlane, live: LiveObject) -> Result<Option<LiveObject>, AppError> {
    let namespace = live.namespace();
    let name = live.name();

    match control_plane.get_object(&live.resource, &namespace, &name).await {
        Ok(object) => {
            let fresh = LiveObject::new(live.resource, object);
            if fresh.finalizers().is_empty() {
                tracing::info!("{}/{} no longer has finalizers", fresh.kind(), name);
                return Ok(None);
            }
            Ok(Some(fresh))
        }
        Err(source) if source.is_not_found() => {
            tracing::info!("{}/{} is already gone", live.kind(), name);
            Ok(None)
        }
        Err(source) => Err(RemoteReadError::new(live.kind(), namespace, name, source).into()),
    }
}

async fn remove_finalizers(
    control_plane: &dyn ControlPlane,
    live: LiveObject,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    let namespace = live.namespace();
    let name = live.name();
    let LiveObject { resource, mut object } = live;
    object.metadata.finalizers = Some(Vec::new());

    control_plane
        .update_object(&resource, &namespace, &name, &object)
        .await
        .map_err(|source| RemoteWriteError::new(WriteOp::Update, &resource.kind, &namespace, &name, source))?;

    writeln!(out, "Removed finalizers from {}/{}", resource.kind, name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{Call, MemoryControlPlane};
    use crate::types::ResourceKind;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use kube::core::DynamicObject;
    use serde_json::json;
    use std::collections::VecDeque;

    struct Answers(VecDeque<bool>);

    impl Confirm for Answers {
        fn confirm(&mut self, _question: &str) -> io::Result<bool> {
            Ok(self.0.pop_front().unwrap_or(false))
        }
    }

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    fn blocked(ns: &str, name: &str) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": name,
                "namespace": ns,
                "deletionTimestamp": "2024-03-01T08:31:00Z",
                "finalizers": ["example.com/cleanup", "example.com/audit"]
            }
        }))
        .unwrap()
    }

    fn cluster() -> MemoryControlPlane {
        let cm = ResourceKind::config_maps();
        MemoryControlPlane::new()
            .with_kind(cm.clone())
            .with_namespace(NamespaceSnapshot::active("default"))
            .with_namespace(NamespaceSnapshot::terminating("doomed", since()))
            .with_object(&cm, blocked("doomed", "stuck"))
    }

    fn updates(cp: &MemoryControlPlane) -> Vec<Call> {
        cp.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Update { .. }))
            .collect()
    }

    #[test]
    fn affirmative_answers() {
        for answer in ["y", "Y\n", " yes ", "YES"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["", "n", "no", "yep", "y e s"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[test]
    fn prompt_reads_one_answer_per_question() {
        let mut prompt = Vec::new();
        let mut confirm = PromptConfirm::new(io::Cursor::new("yes\nn\n"), &mut prompt);

        assert!(confirm.confirm("Remove finalizers from ConfigMap/a?").unwrap());
        assert!(!confirm.confirm("Remove finalizers from ConfigMap/b?").unwrap());
        assert!(!confirm.confirm("Remove finalizers from ConfigMap/c?").unwrap());
        drop(confirm);

        assert_eq!(
            String::from_utf8(prompt).unwrap(),
            "Remove finalizers from ConfigMap/a? [y/n] \
             Remove finalizers from ConfigMap/b? [y/n] \
             Remove finalizers from ConfigMap/c? [y/n] "
        );
    }

    #[tokio::test]
    async fn report_mode_prints_and_never_writes() {
        let cp = cluster();
        let mut out = Vec::new();
        let summary = run(&cp, &TerminatingConfig::default(), &mut Answers(VecDeque::new()), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.terminating, 1);
        assert_eq!(summary.reported, 1);
        assert!(updates(&cp).is_empty());

        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("Found 1 terminating out of 2 namespaces"));
        assert!(report.contains("Namespace doomed is terminating since 2024-03-01T08:30:00Z"));
        assert!(report.contains(
            "ConfigMap/stuck is terminating since 2024-03-01T08:31:00Z and has finalizers [example.com/cleanup, example.com/audit]"
        ));
    }

    #[tokio::test]
    async fn declined_prompt_skips_the_object() {
        let cp = cluster();
        let config = TerminatingConfig {
            delete: true,
            assume_yes: false,
        };
        let summary = run(&cp, &config, &mut Answers(VecDeque::from([false])), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.remediated, 0);
        assert!(updates(&cp).is_empty());
    }

    #[tokio::test]
    async fn confirmed_prompt_removes_finalizers() {
        let cp = cluster();
        let config = TerminatingConfig {
            delete: true,
            assume_yes: false,
        };
        let summary = run(&cp, &config, &mut Answers(VecDeque::from([true])), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.remediated, 1);
        let stored = cp.object("configmaps", "doomed", "stuck").unwrap();
        assert_eq!(stored.metadata.finalizers, Some(vec![]));
    }

    #[tokio::test]
    async fn no_terminating_namespace_skips_discovery() {
        let cp = MemoryControlPlane::new().with_namespace(NamespaceSnapshot::active("default"));
        let summary = run(&cp, &TerminatingConfig::default(), &mut Answers(VecDeque::new()), &mut Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.terminating, 0);
        assert_eq!(cp.calls(), vec![Call::ListNamespaces]);
    }

    #[tokio::test]
    async fn failed_removal_is_fatal() {
        let cp = cluster().with_rejected_writes("stuck");
        let config = TerminatingConfig {
            delete: true,
            assume_yes: true,
        };
        let result = run(&cp, &config, &mut Answers(VecDeque::new()), &mut Vec::new()).await;

        assert_matches!(result, Err(AppError::Write(why)) if why.name == "stuck");
    }

    #[tokio::test]
    async fn failed_reread_is_reported_as_a_read() {
        let cp = cluster().with_broken_reads("stuck");
        let config = TerminatingConfig {
            delete: true,
            assume_yes: false,
        };
        let result = run(&cp, &config, &mut Answers(VecDeque::from([true])), &mut Vec::new()).await;

        let why = assert_matches!(result, Err(AppError::Read(why)) => why);
        assert_eq!(why.to_string(), "failed to get ConfigMap doomed/stuck");
        assert!(updates(&cp).is_empty());
    }
}
