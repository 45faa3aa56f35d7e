//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Shared primitives and utilities for the migration run."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Core shared primitives for the Workflow migration workspace.
//! This crate exposes the run configuration, naming constants and the
//! tracing bootstrap consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    LoggingConfig, MigrationConfig, DEFAULT_RELEASE_NAME, DEFAULT_WORKFLOW_VERSION,
    ENV_RELEASE_NAME, ENV_WORKFLOW_VERSION, RELEASE_NAMESPACE, WORKFLOW_NAMESPACE,
};
pub use logging::{init_tracing, LogFormat, LogGuard};
