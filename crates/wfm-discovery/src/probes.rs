//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Per-concern probes reading running resources."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! One probe per pluggable concern. Probes only read; corrective writes are
//! returned as [`CredentialRepair`]s and applied later by
//! [`crate::reconcile_credentials`].

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::Secret;
use tracing::debug;
use wfm_gateway::{GatewayError, ResourceGateway};

use crate::env::{secret_annotation, secret_field, ContainerEnv};
use crate::profile::{
    AzureStorage, ControllerSettings, EcrRegistry, GcrRegistry, GcsStorage, InfluxDb, Location,
    OffClusterRegistry, Postgres, Redis, RegistryBackend, S3Storage, StorageBackend, SwiftStorage,
    DEFAULT_REGISTRY_HOST_PORT,
};
use crate::reconcile::CredentialRepair;
use crate::DiscoveryError;

pub const OBJECT_STORAGE_SECRET: &str = "objectstorage-keyfile";
pub const OBJECT_STORAGE_ANNOTATION: &str = "deis.io/objectstorage";
pub const DATABASE_SECRET: &str = "database-creds";
pub const LOGGER_REDIS_SECRET: &str = "logger-redis-creds";
pub const REGISTRY_SECRET: &str = "registry-secret";
pub const REGISTRY_LOCATION_ANNOTATION: &str = "deis.io/registry-location";
pub const CONTROLLER_DEPLOYMENT: &str = "deis-controller";
pub const LOGGER_DEPLOYMENT: &str = "deis-logger";
pub const GRAFANA_DEPLOYMENT: &str = "deis-monitor-grafana";
pub const TELEGRAF_DAEMON_SET: &str = "deis-monitor-telegraf";

type ProbeResult<T> = Result<T, DiscoveryError>;

/// Map a not-found lookup to `None`, keeping every other error.
fn optional<T>(result: Result<T, GatewayError>) -> Result<Option<T>, GatewayError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Object storage backend selected by the keyfile secret's annotation.
pub async fn probe_storage<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<StorageBackend> {
    let secret: Secret = gateway.get(namespace, OBJECT_STORAGE_SECRET).await?;
    let kind = secret_annotation(&secret, OBJECT_STORAGE_ANNOTATION).ok_or_else(|| {
        DiscoveryError::MissingAnnotation {
            secret: OBJECT_STORAGE_SECRET.to_owned(),
            annotation: OBJECT_STORAGE_ANNOTATION.to_owned(),
        }
    })?;
    let field = |key: &str| secret_field(&secret, key);

    let backend = match kind {
        "s3" => StorageBackend::S3(S3Storage {
            access_key: field("accesskey"),
            secret_key: field("secretkey"),
            region: field("region"),
            registry_bucket: field("registry-bucket"),
            database_bucket: field("database-bucket"),
            builder_bucket: field("builder-bucket"),
        }),
        "gcs" => StorageBackend::Gcs(GcsStorage {
            key_json: field("key.json"),
            registry_bucket: field("registry-bucket"),
            database_bucket: field("database-bucket"),
            builder_bucket: field("builder-bucket"),
        }),
        "azure" => StorageBackend::Azure(AzureStorage {
            account_name: field("accountname"),
            account_key: field("accountkey"),
            registry_container: field("registry-container"),
            database_container: field("database-container"),
            builder_container: field("builder-container"),
        }),
        "swift" => StorageBackend::Swift(SwiftStorage {
            username: field("username"),
            password: field("password"),
            tenant: field("tenant"),
            auth_url: field("authurl"),
            auth_version: field("authversion"),
            registry_container: field("registry-container"),
            database_container: field("database-container"),
            builder_container: field("builder-container"),
        }),
        other => return Err(DiscoveryError::InvalidStorageType(other.to_owned())),
    };
    debug!(storage = backend.kind(), "object storage discovered");
    Ok(backend)
}

/// Database placement and, when off-cluster, the credentials repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseFinding {
    pub location: Location,
    pub postgres: Option<Postgres>,
    pub repair: Option<CredentialRepair>,
}

pub async fn probe_database<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<DatabaseFinding> {
    let on_cluster = DatabaseFinding {
        location: Location::OnCluster,
        postgres: None,
        repair: None,
    };
    let Some(controller) =
        optional(gateway.get::<Deployment>(namespace, CONTROLLER_DEPLOYMENT).await)?
    else {
        debug!("controller deployment absent, database assumed on-cluster");
        return Ok(on_cluster);
    };

    let env = ContainerEnv::of_deployment(&controller)?;
    let name = env.get("DEIS_DATABASE_NAME");
    let host = env.get("DEIS_DATABASE_SERVICE_HOST");
    let port = env.get("DEIS_DATABASE_SERVICE_PORT");
    if host.is_empty() {
        return Ok(on_cluster);
    }

    let secret: Secret = gateway.get(namespace, DATABASE_SECRET).await?;
    let repair = CredentialRepair::new(DATABASE_SECRET)
        .set("name", &name)
        .set("host", &host)
        .set("port", &port);
    Ok(DatabaseFinding {
        location: Location::OffCluster,
        postgres: Some(Postgres {
            username: secret_field(&secret, "user"),
            password: secret_field(&secret, "password"),
            name,
            host,
            port,
        }),
        repair: Some(repair),
    })
}

/// Grafana runs on-cluster exactly when its deployment exists.
pub async fn probe_grafana<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<Location> {
    let grafana = optional(gateway.get::<Deployment>(namespace, GRAFANA_DEPLOYMENT).await)?;
    Ok(match grafana {
        Some(_) => Location::OnCluster,
        None => Location::OffCluster,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfluxFinding {
    pub location: Location,
    pub influxdb: Option<InfluxDb>,
}

pub async fn probe_influxdb<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<InfluxFinding> {
    let telegraf: DaemonSet = gateway.get(namespace, TELEGRAF_DAEMON_SET).await?;
    let env = ContainerEnv::of_daemon_set(&telegraf)?;
    let influxdb = InfluxDb {
        url: env.get("INFLUXDB_URLS"),
        database: env.get("INFLUXDB_DATABASE"),
        user: env.get("INFLUXDB_USERNAME"),
        password: env.get("INFLUXDB_PASSWORD"),
    };
    if influxdb.user.is_empty() {
        return Ok(InfluxFinding {
            location: Location::OnCluster,
            influxdb: None,
        });
    }
    Ok(InfluxFinding {
        location: Location::OffCluster,
        influxdb: Some(influxdb),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisFinding {
    pub location: Location,
    pub redis: Option<Redis>,
    pub repair: Option<CredentialRepair>,
}

pub async fn probe_logger_redis<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<RedisFinding> {
    let logger: Deployment = gateway.get(namespace, LOGGER_DEPLOYMENT).await?;
    let env = ContainerEnv::of_deployment(&logger)?;
    let db = env.get("DEIS_LOGGER_REDIS_DB");
    let host = env.get("DEIS_LOGGER_REDIS_SERVICE_HOST");
    let port = env.get("DEIS_LOGGER_REDIS_SERVICE_PORT");
    if host.is_empty() {
        return Ok(RedisFinding {
            location: Location::OnCluster,
            redis: None,
            repair: None,
        });
    }

    let secret: Secret = gateway.get(namespace, LOGGER_REDIS_SECRET).await?;
    let repair = CredentialRepair::new(LOGGER_REDIS_SECRET)
        .set("db", &db)
        .set("host", &host)
        .set("port", &port);
    Ok(RedisFinding {
        location: Location::OffCluster,
        redis: Some(Redis {
            password: secret_field(&secret, "password"),
            db,
            host,
            port,
        }),
        repair: Some(repair),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryFinding {
    pub location: String,
    pub backend: Option<RegistryBackend>,
    pub host_port: String,
    pub image_pull_secret_prefix: String,
}

pub async fn probe_registry<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<RegistryFinding> {
    let mut location = Location::OnCluster.as_str().to_owned();
    let mut backend = None;

    if let Some(secret) = optional(gateway.get::<Secret>(namespace, REGISTRY_SECRET).await)? {
        let annotated = secret_annotation(&secret, REGISTRY_LOCATION_ANNOTATION).ok_or_else(
            || DiscoveryError::MissingAnnotation {
                secret: REGISTRY_SECRET.to_owned(),
                annotation: REGISTRY_LOCATION_ANNOTATION.to_owned(),
            },
        )?;
        let field = |key: &str| secret_field(&secret, key);
        backend = match annotated {
            "ecr" => Some(RegistryBackend::Ecr(EcrRegistry {
                access_key: field("accesskey"),
                secret_key: field("secretkey"),
                region: field("region"),
                registry_id: field("registryid"),
                hostname: field("hostname"),
            })),
            "gcr" => Some(RegistryBackend::Gcr(GcrRegistry {
                key_json: field("key.json"),
                hostname: field("hostname"),
            })),
            "off-cluster" => Some(RegistryBackend::OffCluster(OffClusterRegistry {
                hostname: field("hostname"),
                organization: field("organization"),
                username: field("username"),
                password: field("password"),
            })),
            _ => None,
        };
        location = annotated.to_owned();
    }

    let controller: Deployment = gateway.get(namespace, CONTROLLER_DEPLOYMENT).await?;
    let env = ContainerEnv::of_deployment(&controller)?;
    Ok(RegistryFinding {
        location,
        backend,
        host_port: env
            .lookup("DEIS_REGISTRY_SERVICE_PORT")
            .unwrap_or(DEFAULT_REGISTRY_HOST_PORT)
            .to_owned(),
        image_pull_secret_prefix: env.get("DEIS_REGISTRY_SECRET_PREFIX"),
    })
}

pub async fn probe_controller<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> ProbeResult<ControllerSettings> {
    let controller: Deployment = gateway.get(namespace, CONTROLLER_DEPLOYMENT).await?;
    let env = ContainerEnv::of_deployment(&controller)?;
    let defaults = ControllerSettings::default();
    Ok(ControllerSettings {
        app_pull_policy: env
            .lookup("IMAGE_PULL_POLICY")
            .map(str::to_owned)
            .unwrap_or(defaults.app_pull_policy),
        registration_mode: env
            .lookup("REGISTRATION_MODE")
            .map(str::to_owned)
            .unwrap_or(defaults.registration_mode),
    })
}
