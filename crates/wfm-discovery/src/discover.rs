//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Ordered discovery across every configuration concern."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use tracing::info;
use wfm_gateway::ResourceGateway;

use crate::probes::{
    probe_controller, probe_database, probe_grafana, probe_influxdb, probe_logger_redis,
    probe_registry, probe_storage,
};
use crate::profile::ValuesProfile;
use crate::reconcile::CredentialRepair;
use crate::DiscoveryError;

/// Result of a discovery pass: the profile plus deferred secret repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub profile: ValuesProfile,
    pub repairs: Vec<CredentialRepair>,
}

/// Reconstruct the values profile from resources in `namespace`.
///
/// Probes run in a fixed order and the first fatal error aborts the pass.
/// Nothing is written.
pub async fn discover<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
) -> Result<Discovery, DiscoveryError> {
    let mut profile = ValuesProfile::default();
    let mut repairs = Vec::new();

    profile.storage = Some(probe_storage(gateway, namespace).await?);

    let database = probe_database(gateway, namespace).await?;
    profile.database_location = database.location;
    profile.postgres = database.postgres;
    repairs.extend(database.repair);

    profile.grafana_location = probe_grafana(gateway, namespace).await?;

    let influx = probe_influxdb(gateway, namespace).await?;
    profile.influxdb_location = influx.location;
    profile.influxdb = influx.influxdb;

    let redis = probe_logger_redis(gateway, namespace).await?;
    profile.logger_redis_location = redis.location;
    profile.redis = redis.redis;
    repairs.extend(redis.repair);

    let registry = probe_registry(gateway, namespace).await?;
    profile.registry_location = registry.location;
    profile.registry = registry.backend;
    profile.registry_host_port = registry.host_port;
    profile.image_pull_secret_prefix = registry.image_pull_secret_prefix;

    profile.controller = probe_controller(gateway, namespace).await?;

    info!(
        %namespace,
        storage = profile.storage_kind(),
        database = %profile.database_location,
        logger_redis = %profile.logger_redis_location,
        influxdb = %profile.influxdb_location,
        grafana = %profile.grafana_location,
        registry = %profile.registry_location,
        repairs = repairs.len(),
        "configuration discovered"
    );
    Ok(Discovery { profile, repairs })
}
