//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Structured logging adapters and sinks."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
#[doc(hidden)]
#[macro_export]
macro_rules! __wfm_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            namespace = ctx.namespace.unwrap_or(""),
            kind = ctx.kind.unwrap_or(""),
            resource = ctx.resource.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with resource context.
#[macro_export]
macro_rules! wfm_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with resource context.
#[macro_export]
macro_rules! wfm_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with resource context.
#[macro_export]
macro_rules! wfm_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__wfm_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
