//! ---
//! wfm_section: "04-configuration-orchestration"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Concurrent secret annotation fan-out."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use wfm_gateway::{GatewayError, ResourceGateway, ResourceRef};
use wfm_logging::{wfm_error, wfm_info, wfm_warn, LogContext};

use crate::diff::two_way_merge_patch;

/// Annotation added to every secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub key: String,
    pub value: String,
}

impl Marker {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `helm.sh/hook: pre-install`, which keeps the rollout tool from
    /// touching the secret on upgrade.
    pub fn pre_install_hook() -> Self {
        Self::new("helm.sh/hook", "pre-install")
    }
}

/// How the annotated copy reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    Patched,
    Replaced,
}

/// Why a secret could not be annotated.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The task handling the secret panicked or was cancelled.
    #[error("annotation task for {name} did not complete: {reason}")]
    Task { name: String, reason: String },
}

#[derive(Debug)]
pub enum AnnotationOutcome {
    NotFound,
    Annotated { strategy: WriteStrategy },
    Failed(AnnotateError),
}

impl AnnotationOutcome {
    pub fn is_annotated(&self) -> bool {
        matches!(self, AnnotationOutcome::Annotated { .. })
    }
}

/// Outcome for one secret name.
#[derive(Debug)]
pub struct SecretAnnotation {
    pub name: String,
    pub outcome: AnnotationOutcome,
}

/// Per-name outcomes in the order the tasks finished.
#[derive(Debug, Default)]
pub struct AnnotationReport {
    pub outcomes: Vec<SecretAnnotation>,
}

impl AnnotationReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn annotated(&self) -> usize {
        self.count(|outcome| outcome.is_annotated())
    }

    pub fn not_found(&self) -> usize {
        self.count(|outcome| matches!(outcome, AnnotationOutcome::NotFound))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, AnnotationOutcome::Failed(_)))
    }

    pub fn outcome(&self, name: &str) -> Option<&AnnotationOutcome> {
        self.outcomes
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.outcome)
    }

    fn count(&self, predicate: impl Fn(&AnnotationOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}

type Planner = fn(&Value, &Value) -> PlannedWrite;

/// Write chosen for an annotated copy.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlannedWrite {
    Patch(Value),
    Replace,
}

/// Prefer a minimal patch; fall back to a full replace when no patch can
/// be expressed between the two documents.
pub(crate) fn plan_write(original: &Value, modified: &Value) -> PlannedWrite {
    match two_way_merge_patch(original, modified) {
        Ok(patch) => PlannedWrite::Patch(patch),
        Err(err) => {
            debug!(error = %err, "could not compute patch, replacing object");
            PlannedWrite::Replace
        }
    }
}

fn to_document(secret: &Secret, resource: &ResourceRef) -> Result<Value, GatewayError> {
    serde_json::to_value(secret).map_err(|source| GatewayError::Serialization {
        resource: resource.clone(),
        source,
    })
}

async fn annotate_one<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
    name: &str,
    marker: &Marker,
    plan: Planner,
) -> AnnotationOutcome {
    let original: Secret = match gateway.get(namespace, name).await {
        Ok(secret) => secret,
        Err(err) if err.is_not_found() => return AnnotationOutcome::NotFound,
        Err(err) => return AnnotationOutcome::Failed(err.into()),
    };

    let resource = ResourceRef::of::<Secret>(namespace, name);
    let mut annotated = original.clone();
    annotated
        .annotations_mut()
        .insert(marker.key.clone(), marker.value.clone());

    let (before, after) = match (
        to_document(&original, &resource),
        to_document(&annotated, &resource),
    ) {
        (Ok(before), Ok(after)) => (before, after),
        (Err(err), _) | (_, Err(err)) => return AnnotationOutcome::Failed(err.into()),
    };

    let written = match plan(&before, &after) {
        PlannedWrite::Patch(patch) => gateway
            .patch::<Secret>(namespace, name, &patch)
            .await
            .map(|_| WriteStrategy::Patched),
        PlannedWrite::Replace => gateway
            .update(namespace, &annotated)
            .await
            .map(|_| WriteStrategy::Replaced),
    };
    match written {
        Ok(strategy) => AnnotationOutcome::Annotated { strategy },
        Err(err) => AnnotationOutcome::Failed(err.into()),
    }
}

fn log_outcome(namespace: &str, entry: &SecretAnnotation) {
    let ctx = LogContext::phase("annotate")
        .with_namespace(namespace)
        .with_resource("Secret", &entry.name);
    match &entry.outcome {
        AnnotationOutcome::NotFound => wfm_warn!(context = ctx, "secret not found"),
        AnnotationOutcome::Annotated { strategy } => {
            wfm_info!(context = ctx, "secret annotated ({strategy:?})")
        }
        AnnotationOutcome::Failed(err) => wfm_error!(context = ctx, "annotation failed: {err}"),
    }
}

/// Add `marker` to every named secret, one task per name.
///
/// Results come back over a channel sized to the number of names and the
/// report holds exactly one outcome per name in arrival order. A task that
/// dies before reporting is recorded as failed. Failures are recorded, never
/// raised.
pub async fn annotate_all<G>(
    gateway: Arc<G>,
    namespace: &str,
    names: &[String],
    marker: &Marker,
) -> AnnotationReport
where
    G: ResourceGateway + 'static,
{
    fan_out(gateway, namespace, names, marker, plan_write).await
}

async fn fan_out<G>(
    gateway: Arc<G>,
    namespace: &str,
    names: &[String],
    marker: &Marker,
    plan: Planner,
) -> AnnotationReport
where
    G: ResourceGateway + 'static,
{
    if names.is_empty() {
        return AnnotationReport::default();
    }

    let (tx, mut rx) = mpsc::channel::<(usize, SecretAnnotation)>(names.len());
    let mut tasks = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let gateway = Arc::clone(&gateway);
        let tx = tx.clone();
        let namespace = namespace.to_owned();
        let name = name.clone();
        let marker = marker.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = annotate_one(gateway.as_ref(), &namespace, &name, &marker, plan).await;
            // Capacity equals the task count, so this never waits.
            let _ = tx.send((index, SecretAnnotation { name, outcome })).await;
        }));
    }
    drop(tx);

    let mut reported = vec![false; names.len()];
    let mut report = AnnotationReport {
        outcomes: Vec::with_capacity(names.len()),
    };
    while let Some((index, entry)) = rx.recv().await {
        reported[index] = true;
        log_outcome(namespace, &entry);
        report.outcomes.push(entry);
    }

    // The channel closes once every task has ended; the rest never reported.
    for ((task, name), done) in tasks.into_iter().zip(names).zip(reported) {
        if done {
            continue;
        }
        let reason = match task.await {
            Err(err) => err.to_string(),
            Ok(()) => "task ended without reporting".to_owned(),
        };
        let entry = SecretAnnotation {
            name: name.clone(),
            outcome: AnnotationOutcome::Failed(AnnotateError::Task {
                name: name.clone(),
                reason,
            }),
        };
        log_outcome(namespace, &entry);
        report.outcomes.push(entry);
    }
    report
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;
    use wfm_gateway::{MemoryGateway, Operation};

    use super::*;

    #[test]
    fn plan_prefers_patch() {
        let before = json!({ "metadata": { "name": "x" } });
        let after = json!({ "metadata": { "name": "x", "annotations": { "a": "b" } } });
        assert_eq!(
            plan_write(&before, &after),
            PlannedWrite::Patch(json!({ "metadata": { "annotations": { "a": "b" } } }))
        );
    }

    #[test]
    fn plan_falls_back_to_replace() {
        let before = json!({ "metadata": { "name": "x" } });
        let after = json!({ "metadata": { "name": "y" } });
        assert_eq!(plan_write(&before, &after), PlannedWrite::Replace);
    }

    #[test]
    fn report_counts_by_kind() {
        let report = AnnotationReport {
            outcomes: vec![
                SecretAnnotation {
                    name: "a".into(),
                    outcome: AnnotationOutcome::NotFound,
                },
                SecretAnnotation {
                    name: "b".into(),
                    outcome: AnnotationOutcome::Annotated {
                        strategy: WriteStrategy::Patched,
                    },
                },
            ],
        };
        assert_eq!(report.len(), 2);
        assert_eq!(report.not_found(), 1);
        assert_eq!(report.annotated(), 1);
        assert_eq!(report.failed(), 0);
        assert!(report.outcome("b").is_some_and(AnnotationOutcome::is_annotated));
    }

    #[test]
    fn default_marker_is_pre_install_hook() {
        let marker = Marker::pre_install_hook();
        assert_eq!(marker.key, "helm.sh/hook");
        assert_eq!(marker.value, "pre-install");
    }

    #[tokio::test]
    async fn replace_plan_is_written_as_update() {
        let gateway = Arc::new(MemoryGateway::new());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("database-creds".into()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        gateway.insert("deis", &secret).unwrap();

        let report = fan_out(
            Arc::clone(&gateway),
            "deis",
            &["database-creds".to_owned()],
            &Marker::pre_install_hook(),
            |_, _| PlannedWrite::Replace,
        )
        .await;

        assert!(matches!(
            report.outcome("database-creds"),
            Some(AnnotationOutcome::Annotated {
                strategy: WriteStrategy::Replaced
            })
        ));
        assert_eq!(gateway.count::<Secret>(Operation::Update, "database-creds"), 1);
        assert_eq!(gateway.count::<Secret>(Operation::Patch, "database-creds"), 0);
        let stored: Secret = gateway.object("deis", "database-creds").unwrap();
        assert_eq!(
            stored.annotations().get("helm.sh/hook").map(String::as_str),
            Some("pre-install")
        );
    }
}
