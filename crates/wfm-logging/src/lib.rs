//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Structured logging adapters and sinks."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Context-enriched logging helpers shared by the migration phases.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

/// Context-enriched logging macros.
pub mod macros;

/// Initialize a baseline tracing subscriber suitable for tests and development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Namespace of the resource being worked on.
    pub namespace: Option<&'a str>,
    /// Resource kind, e.g. `Secret`.
    pub kind: Option<&'a str>,
    /// Resource name.
    pub resource: Option<&'a str>,
    /// Migration phase emitting the event.
    pub phase: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a phase of the migration.
    pub fn phase(phase: &'a str) -> Self {
        Self::new().with_phase(phase)
    }

    /// Attach a namespace.
    pub fn with_namespace(mut self, namespace: &'a str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Attach a resource kind and name.
    pub fn with_resource(mut self, kind: &'a str, name: &'a str) -> Self {
        self.kind = Some(kind);
        self.resource = Some(name);
        self
    }

    /// Attach a phase.
    pub fn with_phase(mut self, phase: &'a str) -> Self {
        self.phase = Some(phase);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation was skipped without error.
    Skipped,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    /// Stable label used in the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Skipped => "skipped",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with an outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            namespace = ctx.namespace.unwrap_or(""),
            kind = ctx.kind.unwrap_or(""),
            resource = ctx.resource.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Skipped => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome.as_str(),
            namespace = ctx.namespace.unwrap_or(""),
            kind = ctx.kind.unwrap_or(""),
            resource = ctx.resource.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            namespace = ctx.namespace.unwrap_or(""),
            kind = ctx.kind.unwrap_or(""),
            resource = ctx.resource.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %message
        ),
    }
}
