//! ---
//! wfm_section: "05-networking-external-interfaces"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Typed access to namespaced cluster resources."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Resource gateway used by every migration phase.
//!
//! [`ResourceGateway`] is the only seam between the migration logic and the
//! cluster. [`KubeGateway`] talks to a real API server; [`MemoryGateway`]
//! keeps objects in memory and journals every call.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod cluster;
pub mod memory;

pub use crate::cluster::KubeGateway;
pub use crate::memory::{Fault, GatewayCall, MemoryGateway, Operation};

/// Result alias used throughout the gateway crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Namespaced resource types the gateway can move in and out of the cluster.
pub trait GatewayResource:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> GatewayResource for K where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind, namespace and name of a single addressable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    /// Resource kind, e.g. `Secret`.
    pub kind: String,
    /// Owning namespace.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ResourceRef {
    /// Construct a reference from raw parts.
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference to an object of type `K`.
    pub fn of<K: GatewayResource>(namespace: &str, name: &str) -> Self {
        Self::new(K::kind(&()), namespace, name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The addressed object does not exist.
    #[error("{0} not found")]
    NotFound(ResourceRef),
    /// An object with the same name already exists.
    #[error("{0} already exists")]
    AlreadyExists(ResourceRef),
    /// Any other status returned by the API server.
    #[error("api error on {resource}: {message} (status {code})")]
    Api {
        /// Resource the call addressed.
        resource: ResourceRef,
        /// HTTP status code.
        code: u16,
        /// Server supplied message.
        message: String,
    },
    /// The object could not be converted to or from its wire form.
    #[error("serialization error on {resource}: {source}")]
    Serialization {
        /// Resource the call addressed.
        resource: ResourceRef,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The request never produced an API status (connection, TLS, auth).
    #[error("transport error on {resource}: {message}")]
    Transport {
        /// Resource the call addressed.
        resource: ResourceRef,
        /// Client error description.
        message: String,
    },
}

impl GatewayError {
    /// True for the distinguishable not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    /// True when a create collided with an existing object.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, GatewayError::AlreadyExists(_))
    }

    /// Resource the failed call addressed.
    pub fn resource(&self) -> &ResourceRef {
        match self {
            GatewayError::NotFound(resource) | GatewayError::AlreadyExists(resource) => resource,
            GatewayError::Api { resource, .. }
            | GatewayError::Serialization { resource, .. }
            | GatewayError::Transport { resource, .. } => resource,
        }
    }
}

/// Equality-based label selector, e.g. `heritage=deis`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Selector requiring a single label.
    pub fn matching(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::everything().and(key, value)
    }

    /// Add another required label.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Query string form understood by the API server.
    pub fn to_query(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether an object carrying `labels` is selected.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.labels.iter().all(|(key, value)| {
            labels
                .and_then(|present| present.get(key))
                .is_some_and(|candidate| candidate == value)
        })
    }
}

/// Typed read/list/write operations against a remote resource store.
///
/// Every operation is scoped to a namespace and reports absence as
/// [`GatewayError::NotFound`].
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Fetch a single object by name.
    async fn get<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<K>;

    /// List objects matching a label selector.
    async fn list<K: GatewayResource>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<K>>;

    /// Create a new object; collisions surface as [`GatewayError::AlreadyExists`].
    async fn create<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K>;

    /// Replace an existing object with the supplied copy.
    async fn update<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K>;

    /// Apply a strategic merge patch to an existing object.
    async fn patch<K: GatewayResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K>;

    /// Delete an object by name.
    async fn delete<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<()>;
}
