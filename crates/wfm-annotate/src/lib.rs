//! ---
//! wfm_section: "04-configuration-orchestration"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Concurrent secret annotation patcher."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Marks a fixed set of secrets so the downstream rollout tool leaves them
//! alone. Each secret is handled by its own task; a missing or failing
//! secret never stops the others.

pub mod diff;
pub mod patcher;

pub use crate::diff::{two_way_merge_patch, DiffError};
pub use crate::patcher::{
    annotate_all, AnnotateError, AnnotationOutcome, AnnotationReport, Marker, SecretAnnotation,
    WriteStrategy,
};
