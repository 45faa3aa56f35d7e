//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Release descriptor assembly."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use wfm_common::MigrationConfig;
use wfm_release::{timestamp, Chart, Config, Info, Metadata, Release, Status, StatusCode};

/// Revision given to the migrated release.
pub const INITIAL_VERSION: i32 = 1;

/// Build the first revision of the release from the rendered values and
/// the manifest snapshot. The release is marked deployed at `deployed_at`.
pub fn build_release(
    config: &MigrationConfig,
    values: &str,
    manifest: String,
    deployed_at: DateTime<Utc>,
) -> Release {
    let values = Config::from_raw(values);
    let deployed_at = timestamp(deployed_at);
    Release {
        name: config.release_name.clone(),
        namespace: config.namespace.clone(),
        version: INITIAL_VERSION,
        config: Some(values.clone()),
        chart: Some(Chart {
            metadata: Some(Metadata {
                name: config.chart_name.clone(),
                version: config.workflow_version.clone(),
                ..Metadata::default()
            }),
            values: Some(values),
            ..Chart::default()
        }),
        info: Some(Info {
            status: Some(Status {
                code: StatusCode::Deployed as i32,
                ..Status::default()
            }),
            first_deployed: Some(deployed_at.clone()),
            last_deployed: Some(deployed_at),
            ..Info::default()
        }),
        manifest,
    }
}
