//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Ordered migration pipeline."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use wfm_annotate::{annotate_all, AnnotationReport, Marker};
use wfm_common::MigrationConfig;
use wfm_discovery::{
    discover, reconcile_credentials, render_values, DiscoveryError, ReconcileError, RenderError,
    RepairOutcome, ValuesProfile,
};
use wfm_gateway::ResourceGateway;
use wfm_logging::{log_system_event, LogContext, SystemEventOutcome};
use wfm_manifest::{assemble_manifest, ManifestError};
use wfm_release::{record_in, RecordError, Release};

use crate::descriptor::{build_release, INITIAL_VERSION};
use crate::prune::{prune_deployments, PruneError, PruneReport};

/// Fatal failure of one migration phase.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),
    #[error("credential reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),
    #[error("pruning failed: {0}")]
    Prune(#[from] PruneError),
    #[error("manifest assembly failed: {0}")]
    Manifest(#[from] ManifestError),
    #[error("recording failed: {0}")]
    Record(#[from] RecordError),
}

impl MigrationError {
    /// True when a release record for this revision was already present.
    pub fn is_already_recorded(&self) -> bool {
        matches!(self, MigrationError::Record(RecordError::AlreadyExists(_)))
    }

    /// Phase label used in logs.
    pub fn phase(&self) -> &'static str {
        match self {
            MigrationError::Discovery(_) => "discover",
            MigrationError::Render(_) => "render",
            MigrationError::Reconcile(_) => "reconcile",
            MigrationError::Prune(_) => "prune",
            MigrationError::Manifest(_) => "manifest",
            MigrationError::Record(_) => "record",
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct MigrationSummary {
    pub profile: ValuesProfile,
    /// Rendered chart values document.
    pub values: String,
    pub repairs: Vec<RepairOutcome>,
    pub annotations: AnnotationReport,
    pub pruned: PruneReport,
    pub record_key: String,
    pub release: Release,
}

/// One migration run against a gateway.
#[derive(Debug)]
pub struct Migration<G> {
    gateway: Arc<G>,
    config: MigrationConfig,
}

impl<G> Migration<G>
where
    G: ResourceGateway + 'static,
{
    pub fn new(gateway: Arc<G>, config: MigrationConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run every phase in order and stop at the first fatal error.
    ///
    /// Discovery and rendering complete before anything is written, so a
    /// discovery failure leaves the cluster untouched. Annotation failures
    /// are reported in the summary and never abort the run.
    pub async fn run(&self) -> Result<MigrationSummary, MigrationError> {
        let result = self.run_phases().await;
        if let Err(err) = &result {
            let ctx = LogContext::phase(err.phase()).with_namespace(&self.config.namespace);
            log_system_event(
                Some(&ctx),
                "migration.failed",
                &err.to_string(),
                SystemEventOutcome::Fault,
            );
        }
        result
    }

    async fn run_phases(&self) -> Result<MigrationSummary, MigrationError> {
        let gateway = self.gateway.as_ref();
        let namespace = self.config.namespace.as_str();

        let discovery = discover(gateway, namespace).await?;
        let values = render_values(&discovery.profile)?;
        self.phase_done("render", "values document rendered");

        let repairs = reconcile_credentials(gateway, namespace, &discovery.repairs).await?;

        let annotations = annotate_all(
            Arc::clone(&self.gateway),
            namespace,
            &self.config.protected_secrets,
            &Marker::pre_install_hook(),
        )
        .await;
        info!(
            annotated = annotations.annotated(),
            not_found = annotations.not_found(),
            failed = annotations.failed(),
            "secret annotation finished"
        );

        let pruned = prune_deployments(gateway, namespace, &self.config.stale_deployments).await?;

        let manifest =
            assemble_manifest(gateway, namespace, &self.config.protected_secrets).await?;

        let release = build_release(&self.config, &values, manifest, Utc::now());
        let record_key = self.config.release_key(INITIAL_VERSION);
        record_in(
            gateway,
            &self.config.release_namespace,
            &record_key,
            &release,
        )
        .await?;
        self.phase_done("record", "migration complete");

        Ok(MigrationSummary {
            profile: discovery.profile,
            values,
            repairs,
            annotations,
            pruned,
            record_key,
            release,
        })
    }

    fn phase_done(&self, phase: &str, message: &str) {
        let ctx = LogContext::phase(phase).with_namespace(&self.config.namespace);
        log_system_event(
            Some(&ctx),
            "migration.phase",
            message,
            SystemEventOutcome::Success,
        );
    }
}
