//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Shared primitives and utilities for the migration run."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

/// Namespace every Workflow component is installed into.
pub const WORKFLOW_NAMESPACE: &str = "deis";
/// Namespace the release records are stored in.
pub const RELEASE_NAMESPACE: &str = "kube-system";

pub const ENV_WORKFLOW_VERSION: &str = "WORKFLOW_VERSION";
pub const ENV_RELEASE_NAME: &str = "RELEASE_NAME";
pub const DEFAULT_WORKFLOW_VERSION: &str = "v2.7.0";
pub const DEFAULT_RELEASE_NAME: &str = "deis-workflow";

fn default_namespace() -> String {
    WORKFLOW_NAMESPACE.to_owned()
}

fn default_release_namespace() -> String {
    RELEASE_NAMESPACE.to_owned()
}

fn default_release_name() -> String {
    DEFAULT_RELEASE_NAME.to_owned()
}

fn default_workflow_version() -> String {
    DEFAULT_WORKFLOW_VERSION.to_owned()
}

fn default_chart_name() -> String {
    "workflow".to_owned()
}

fn default_protected_secrets() -> Vec<String> {
    [
        "builder-key-auth",
        "builder-ssh-private-keys",
        "database-creds",
        "django-secret-key",
        "logger-redis-creds",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_stale_deployments() -> Vec<String> {
    ["deis-builder", "deis-controller", "deis-registry"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Settings for a single migration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Namespace the running install lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Namespace receiving the release record.
    #[serde(default = "default_release_namespace")]
    pub release_namespace: String,
    /// Release name; the record key is derived from it.
    #[serde(default = "default_release_name")]
    pub release_name: String,
    /// Chart version stamped into the release metadata.
    #[serde(default = "default_workflow_version")]
    pub workflow_version: String,
    #[serde(default = "default_chart_name")]
    pub chart_name: String,
    /// Secrets that receive the pre-install marker and stay out of the manifest.
    #[serde(default = "default_protected_secrets")]
    pub protected_secrets: Vec<String>,
    /// Deployments removed before the new tool takes over.
    #[serde(default = "default_stale_deployments")]
    pub stale_deployments: Vec<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MigrationConfig {
    /// Build the configuration from the process environment.
    ///
    /// Unset or blank `WORKFLOW_VERSION` / `RELEASE_NAME` fall back to their
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(version) = non_blank(lookup(ENV_WORKFLOW_VERSION)) {
            config.workflow_version = version;
        }
        if let Some(name) = non_blank(lookup(ENV_RELEASE_NAME)) {
            config.release_name = name;
        }
        debug!(
            release = %config.release_name,
            version = %config.workflow_version,
            "migration configuration resolved"
        );
        config
    }

    /// Key of the release record, `<release-name>.v<version>`.
    pub fn release_key(&self, version: i32) -> String {
        format!("{}.v{}", self.release_name, version)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(anyhow!("namespace cannot be empty"));
        }
        if self.release_name.trim().is_empty() {
            return Err(anyhow!("release name cannot be empty"));
        }
        if self.workflow_version.trim().is_empty() {
            return Err(anyhow!("workflow version cannot be empty"));
        }
        Ok(())
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            release_namespace: default_release_namespace(),
            release_name: default_release_name(),
            workflow_version: default_workflow_version(),
            chart_name: default_chart_name(),
            protected_secrets: default_protected_secrets(),
            stale_deployments: default_stale_deployments(),
            logging: LoggingConfig::default(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
