//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Values profile reconstructed from the running install."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;

/// Where a component runs relative to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    #[default]
    OnCluster,
    OffCluster,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::OnCluster => "on-cluster",
            Location::OffCluster => "off-cluster",
        }
    }

    pub fn is_off_cluster(&self) -> bool {
        matches!(self, Location::OffCluster)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct S3Storage {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub registry_bucket: String,
    pub database_bucket: String,
    pub builder_bucket: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcsStorage {
    pub key_json: String,
    pub registry_bucket: String,
    pub database_bucket: String,
    pub builder_bucket: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AzureStorage {
    pub account_name: String,
    pub account_key: String,
    pub registry_container: String,
    pub database_container: String,
    pub builder_container: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwiftStorage {
    pub username: String,
    pub password: String,
    pub tenant: String,
    pub auth_url: String,
    pub auth_version: String,
    pub registry_container: String,
    pub database_container: String,
    pub builder_container: String,
}

/// Object storage backend; exactly one provider's fields at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    S3(S3Storage),
    Gcs(GcsStorage),
    Azure(AzureStorage),
    Swift(SwiftStorage),
}

impl StorageBackend {
    /// Value of the `storage` selector in the values document.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageBackend::S3(_) => "s3",
            StorageBackend::Gcs(_) => "gcs",
            StorageBackend::Azure(_) => "azure",
            StorageBackend::Swift(_) => "swift",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Postgres {
    pub name: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Redis {
    pub db: String,
    pub host: String,
    pub port: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfluxDb {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Grafana {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EcrRegistry {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub registry_id: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcrRegistry {
    pub key_json: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OffClusterRegistry {
    pub hostname: String,
    pub organization: String,
    pub username: String,
    pub password: String,
}

/// Container registry backend; at most one is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RegistryBackend {
    Ecr(EcrRegistry),
    Gcr(GcrRegistry),
    OffCluster(OffClusterRegistry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSettings {
    pub app_pull_policy: String,
    pub registration_mode: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            app_pull_policy: "IfNotPresent".to_owned(),
            registration_mode: "enabled".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Router {
    pub dhparam: String,
}

pub const DEFAULT_REGISTRY_HOST_PORT: &str = "5555";

/// Settings reconstructed from the running install.
///
/// Built once per run by discovery, read-only afterwards and consumed by
/// the values template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuesProfile {
    pub storage: Option<StorageBackend>,
    pub database_location: Location,
    pub postgres: Option<Postgres>,
    pub logger_redis_location: Location,
    pub redis: Option<Redis>,
    pub influxdb_location: Location,
    pub influxdb: Option<InfluxDb>,
    pub grafana_location: Location,
    pub grafana: Option<Grafana>,
    /// `on-cluster`, `off-cluster`, `ecr`, `gcr`, or whatever the registry
    /// secret annotation carries.
    pub registry_location: String,
    pub registry: Option<RegistryBackend>,
    pub registry_host_port: String,
    pub image_pull_secret_prefix: String,
    pub controller: ControllerSettings,
    pub router: Option<Router>,
}

impl Default for ValuesProfile {
    fn default() -> Self {
        Self {
            storage: None,
            database_location: Location::OnCluster,
            postgres: None,
            logger_redis_location: Location::OnCluster,
            redis: None,
            influxdb_location: Location::OnCluster,
            influxdb: None,
            grafana_location: Location::OnCluster,
            grafana: None,
            registry_location: Location::OnCluster.as_str().to_owned(),
            registry: None,
            registry_host_port: DEFAULT_REGISTRY_HOST_PORT.to_owned(),
            image_pull_secret_prefix: String::new(),
            controller: ControllerSettings::default(),
            router: None,
        }
    }
}

impl ValuesProfile {
    pub fn storage_kind(&self) -> &str {
        self.storage.as_ref().map(StorageBackend::kind).unwrap_or("")
    }

    pub fn s3(&self) -> Option<&S3Storage> {
        match &self.storage {
            Some(StorageBackend::S3(s3)) => Some(s3),
            _ => None,
        }
    }

    pub fn gcs(&self) -> Option<&GcsStorage> {
        match &self.storage {
            Some(StorageBackend::Gcs(gcs)) => Some(gcs),
            _ => None,
        }
    }

    pub fn azure(&self) -> Option<&AzureStorage> {
        match &self.storage {
            Some(StorageBackend::Azure(azure)) => Some(azure),
            _ => None,
        }
    }

    pub fn swift(&self) -> Option<&SwiftStorage> {
        match &self.storage {
            Some(StorageBackend::Swift(swift)) => Some(swift),
            _ => None,
        }
    }

    pub fn ecr(&self) -> Option<&EcrRegistry> {
        match &self.registry {
            Some(RegistryBackend::Ecr(ecr)) => Some(ecr),
            _ => None,
        }
    }

    pub fn gcr(&self) -> Option<&GcrRegistry> {
        match &self.registry {
            Some(RegistryBackend::Gcr(gcr)) => Some(gcr),
            _ => None,
        }
    }

    pub fn off_cluster_registry(&self) -> Option<&OffClusterRegistry> {
        match &self.registry {
            Some(RegistryBackend::OffCluster(registry)) => Some(registry),
            _ => None,
        }
    }

    /// Number of populated storage variants; never more than one.
    pub fn populated_storage_variants(&self) -> usize {
        [
            self.s3().is_some(),
            self.gcs().is_some(),
            self.azure().is_some(),
            self.swift().is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }

    /// Number of populated registry variants; never more than one.
    pub fn populated_registry_variants(&self) -> usize {
        [
            self.ecr().is_some(),
            self.gcr().is_some(),
            self.off_cluster_registry().is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }
}
