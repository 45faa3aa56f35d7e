//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Primary migration pipeline."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---

pub mod descriptor;
pub mod pipeline;
pub mod prune;

pub use descriptor::{build_release, INITIAL_VERSION};
pub use pipeline::{Migration, MigrationError, MigrationSummary};
pub use prune::{prune_deployments, PruneError, PruneReport};
