//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "binary"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Binary entrypoint for the migration job."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use wfm_common::{init_tracing, LogFormat, MigrationConfig};
use wfm_core::Migration;
use wfm_gateway::KubeGateway;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Migrate a running Workflow install into a tracked release",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "VERSION",
        help = "Chart version recorded in the release (overrides WORKFLOW_VERSION)"
    )]
    workflow_version: Option<String>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Release name (overrides RELEASE_NAME)"
    )]
    release_name: Option<String>,

    #[arg(long, value_name = "NAMESPACE", help = "Namespace of the running install")]
    namespace: Option<String>,

    #[arg(long, value_enum, help = "Log output format")]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Json => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

fn resolve_config(cli: Cli) -> Result<MigrationConfig> {
    let mut config = MigrationConfig::from_env();
    if let Some(version) = cli.workflow_version {
        config.workflow_version = version;
    }
    if let Some(name) = cli.release_name {
        config.release_name = name;
    }
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: MigrationConfig) -> Result<String> {
    let gateway = KubeGateway::infer()
        .await
        .context("failed to build cluster client")?;
    info!(
        namespace = %config.namespace,
        release = %config.release_name,
        version = %config.workflow_version,
        "starting migration"
    );
    let summary = Migration::new(Arc::new(gateway), config).run().await?;
    info!(
        record = %summary.record_key,
        storage = summary.profile.storage_kind(),
        pruned = summary.pruned.deleted.len(),
        "release recorded"
    );
    Ok(summary.values)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match resolve_config(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("wfm-migrate: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = match init_tracing("wfm-migrate", &config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("wfm-migrate: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(values) => {
            print!("{values}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "migration aborted");
            eprintln!("wfm-migrate: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "wfm-migrate",
            "--release-name",
            "workflow-prod",
            "--log-format",
            "pretty",
        ]);
        let config = resolve_config(cli).unwrap();
        assert_eq!(config.release_name, "workflow-prod");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn blank_override_is_rejected() {
        let cli = Cli::parse_from(["wfm-migrate", "--workflow-version", " "]);
        assert!(resolve_config(cli).is_err());
    }
}
