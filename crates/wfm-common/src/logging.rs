//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Shared primitives and utilities for the migration run."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "WFM_LOG";

/// Available log formats for the migration job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Keeps the non-blocking writer alive; dropping it flushes pending events.
#[must_use = "dropping the guard stops log delivery"]
pub struct LogGuard {
    _writer: WorkerGuard,
}

/// Initialize the tracing subscriber based on configuration and environment variables.
///
/// * `WFM_LOG` overrides the filter (e.g. `info`, `debug,kube=warn`). When unset
///   `RUST_LOG` is honoured, finally defaulting to `info`.
/// * Events go to stderr; stdout carries the rendered values document.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<LogGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to info logging",
                LOG_ENV, err
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    info!(service = %service_name, format = ?config.format, "tracing initialised");
    Ok(LogGuard { _writer: guard })
}
