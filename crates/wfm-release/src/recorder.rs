//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Release record persistence."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use wfm_gateway::{GatewayError, ResourceGateway};
use wfm_logging::{log_system_event, LogContext, SystemEventOutcome};

use crate::codec::{encode_release, CodecError};
use crate::release::Release;

/// Namespace the release manager keeps its records in.
pub const RECORD_NAMESPACE: &str = "kube-system";
/// Owner label value the release manager filters on.
pub const RECORD_OWNER: &str = "TILLER";
/// Data key holding the encoded descriptor.
pub const RECORD_DATA_KEY: &str = "release";

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("release record {0} already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Gateway(GatewayError),
}

/// Record key for a release revision, e.g. `deis-workflow.v1`.
pub fn release_key(name: &str, version: i32) -> String {
    format!("{name}.v{version}")
}

/// Build the config map holding `release` under `key`.
pub fn release_config_map(
    key: &str,
    release: &Release,
    created_at: DateTime<Utc>,
) -> Result<ConfigMap, RecordError> {
    let payload = encode_release(release)?;
    let labels = BTreeMap::from([
        ("CREATED_AT".to_owned(), created_at.timestamp().to_string()),
        ("NAME".to_owned(), release.name.clone()),
        ("OWNER".to_owned(), RECORD_OWNER.to_owned()),
        (
            "STATUS".to_owned(),
            release.status_code().as_str_name().to_owned(),
        ),
        ("VERSION".to_owned(), release.version.to_string()),
    ]);
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(key.to_owned()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(RECORD_DATA_KEY.to_owned(), payload)])),
        ..ConfigMap::default()
    })
}

/// Persist `release` as record `key` in [`RECORD_NAMESPACE`].
pub async fn record<G: ResourceGateway>(
    gateway: &G,
    key: &str,
    release: &Release,
) -> Result<(), RecordError> {
    record_in(gateway, RECORD_NAMESPACE, key, release).await
}

/// Persist `release` as record `key` in `namespace`.
///
/// A single create; an existing record is never overwritten.
pub async fn record_in<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
    key: &str,
    release: &Release,
) -> Result<(), RecordError> {
    let config_map = release_config_map(key, release, Utc::now())?;
    let ctx = LogContext::phase("record")
        .with_namespace(namespace)
        .with_resource("ConfigMap", key);

    match gateway.create(namespace, &config_map).await {
        Ok(_) => {
            log_system_event(
                Some(&ctx),
                "release.recorded",
                "release record created",
                SystemEventOutcome::Success,
            );
            Ok(())
        }
        Err(err) if err.is_already_exists() => {
            log_system_event(
                Some(&ctx),
                "release.recorded",
                "release record already exists",
                SystemEventOutcome::Fault,
            );
            Err(RecordError::AlreadyExists(key.to_owned()))
        }
        Err(err) => Err(RecordError::Gateway(err)),
    }
}
