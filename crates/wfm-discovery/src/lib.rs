//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Configuration discovery and values rendering."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Reconstructs the Workflow values profile by reading the running
//! installation, reconciles off-cluster credential secrets and renders the
//! chart values document.

pub mod discover;
pub mod env;
pub mod probes;
pub mod profile;
pub mod reconcile;
pub mod render;

use wfm_gateway::{GatewayError, ResourceRef};

pub use crate::discover::{discover, Discovery};
pub use crate::profile::{Location, RegistryBackend, StorageBackend, ValuesProfile};
pub use crate::reconcile::{reconcile_credentials, CredentialRepair, ReconcileError, RepairOutcome};
pub use crate::render::{render_values, RenderError};

/// Error type for discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("secret {secret} is missing annotation {annotation}")]
    MissingAnnotation { secret: String, annotation: String },
    #[error("{0:?} is not a valid storage type")]
    InvalidStorageType(String),
    #[error("{0} has no containers in its pod template")]
    MissingContainer(ResourceRef),
}
