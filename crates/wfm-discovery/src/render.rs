//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Values document rendering."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use askama::Template;

use crate::profile::{
    AzureStorage, ControllerSettings, EcrRegistry, GcrRegistry, GcsStorage, Grafana, InfluxDb,
    OffClusterRegistry, Postgres, Redis, Router, S3Storage, SwiftStorage, ValuesProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to render values document: {0}")]
    Template(#[from] askama::Error),
}

mod filters {
    use std::fmt::Display;

    /// Characters YAML accepts verbatim inside a double-quoted scalar.
    fn is_plain(c: char) -> bool {
        matches!(c,
            '\u{20}'..='\u{7e}'
            | '\u{a0}'..='\u{2027}'
            | '\u{202a}'..='\u{d7ff}'
            | '\u{e000}'..='\u{fefe}'
            | '\u{ff00}'..='\u{fffd}'
            | '\u{10000}'..='\u{10ffff}')
    }

    /// Emit a value as a YAML double-quoted scalar.
    ///
    /// Anything outside the printable set, line separators and the byte
    /// order mark included, is written as an escape.
    pub fn quoted<T: Display>(value: T) -> askama::Result<String> {
        let value = value.to_string();
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if is_plain(c) => out.push(c),
                c if u32::from(c) <= 0xffff => out.push_str(&format!("\\u{:04X}", u32::from(c))),
                c => out.push_str(&format!("\\U{:08X}", u32::from(c))),
            }
        }
        out.push('"');
        Ok(out)
    }
}

#[derive(Template)]
#[template(path = "values.yaml", escape = "none")]
struct ValuesDocument<'a> {
    storage: &'a str,
    database_location: &'a str,
    logger_redis_location: &'a str,
    influxdb_location: &'a str,
    grafana_location: &'a str,
    registry_location: &'a str,
    host_port: String,
    image_pull_secret_prefix: &'a str,
    s3: Option<&'a S3Storage>,
    azure: Option<&'a AzureStorage>,
    gcs: Option<&'a GcsStorage>,
    swift: Option<&'a SwiftStorage>,
    controller: &'a ControllerSettings,
    postgres: Option<&'a Postgres>,
    redis: Option<&'a Redis>,
    monitor: bool,
    grafana: Option<&'a Grafana>,
    influxdb: Option<&'a InfluxDb>,
    off_cluster_registry: Option<&'a OffClusterRegistry>,
    ecr: Option<&'a EcrRegistry>,
    gcr: Option<&'a GcrRegistry>,
    router: Option<&'a Router>,
}

/// Ports are written bare when numeric so the chart sees an integer.
fn host_port_scalar(port: &str) -> Result<String, RenderError> {
    if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        Ok(port.to_owned())
    } else {
        Ok(filters::quoted(port)?)
    }
}

fn non_empty<T>(section: Option<&T>, discriminant: impl Fn(&T) -> &str) -> Option<&T> {
    section.filter(|value| !discriminant(*value).is_empty())
}

impl<'a> ValuesDocument<'a> {
    fn new(profile: &'a ValuesProfile) -> Result<Self, RenderError> {
        let grafana = non_empty(profile.grafana.as_ref(), |g| g.user.as_str());
        let influxdb = non_empty(profile.influxdb.as_ref(), |i| i.user.as_str());
        Ok(Self {
            storage: profile.storage_kind(),
            database_location: profile.database_location.as_str(),
            logger_redis_location: profile.logger_redis_location.as_str(),
            influxdb_location: profile.influxdb_location.as_str(),
            grafana_location: profile.grafana_location.as_str(),
            registry_location: &profile.registry_location,
            host_port: host_port_scalar(&profile.registry_host_port)?,
            image_pull_secret_prefix: &profile.image_pull_secret_prefix,
            s3: non_empty(profile.s3(), |s| s.region.as_str()),
            azure: non_empty(profile.azure(), |a| a.account_name.as_str()),
            gcs: non_empty(profile.gcs(), |g| g.key_json.as_str()),
            swift: non_empty(profile.swift(), |s| s.username.as_str()),
            controller: &profile.controller,
            postgres: non_empty(profile.postgres.as_ref(), |p| p.host.as_str()),
            redis: non_empty(profile.redis.as_ref(), |r| r.host.as_str()),
            monitor: grafana.is_some() || influxdb.is_some(),
            grafana,
            influxdb,
            off_cluster_registry: non_empty(profile.off_cluster_registry(), |r| {
                r.username.as_str()
            }),
            ecr: non_empty(profile.ecr(), |e| e.region.as_str()),
            gcr: non_empty(profile.gcr(), |g| g.key_json.as_str()),
            router: non_empty(profile.router.as_ref(), |r| r.dhparam.as_str()),
        })
    }
}

/// Render the chart values document for `profile`.
///
/// Optional sections appear only when their identifying field is set.
/// Every string is written as an escaped double-quoted scalar, so the output
/// parses as YAML whatever the cluster held.
pub fn render_values(profile: &ValuesProfile) -> Result<String, RenderError> {
    let document = ValuesDocument::new(profile)?;
    Ok(document.render()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_filter_escapes() {
        assert_eq!(filters::quoted("plain").unwrap(), "\"plain\"");
        assert_eq!(filters::quoted("a\"b").unwrap(), "\"a\\\"b\"");
        assert_eq!(filters::quoted("line\nbreak").unwrap(), "\"line\\nbreak\"");
        assert_eq!(filters::quoted("eu\u{7f}west").unwrap(), "\"eu\\u007Fwest\"");
    }

    #[test]
    fn hostile_values_parse_back_unchanged() {
        let hostile = [
            "eu\u{7f}west",
            "next\u{85}line",
            "para\u{2028}graph\u{2029}end",
            "\u{feff}bom",
            "bell\u{7}esc\u{1b}",
            "tab\there\r\n",
            "quote\" back\\slash",
            "key: value # comment",
            "- item",
            "{ flow: [1, 2] }",
            "*alias &anchor !tag",
            "'single'",
            "%YAML 1.2",
            "---",
            "surrogate\u{1f600}pair",
            "\u{fffe}\u{ffff}",
            "",
        ];
        for value in hostile {
            let document = format!("region: {}\n", filters::quoted(value).unwrap());
            let parsed: serde_yaml::Value = serde_yaml::from_str(&document)
                .unwrap_or_else(|err| panic!("{value:?} rendered unparseable: {err}"));
            assert_eq!(parsed["region"].as_str(), Some(value), "{value:?}");
        }
    }

    #[test]
    fn rendered_document_with_hostile_fields_parses() {
        let profile = ValuesProfile {
            storage: Some(crate::profile::StorageBackend::S3(S3Storage {
                access_key: "AKIA\u{7f}".into(),
                secret_key: "sec\u{2028}ret".into(),
                region: "us-east-1\"\n  injected: true".into(),
                ..S3Storage::default()
            })),
            image_pull_secret_prefix: "\u{85}prefix".into(),
            ..ValuesProfile::default()
        };
        let document = render_values(&profile).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&document).unwrap();
        assert_eq!(parsed["s3"]["accesskey"].as_str(), Some("AKIA\u{7f}"));
        assert_eq!(parsed["s3"]["secretkey"].as_str(), Some("sec\u{2028}ret"));
        assert_eq!(
            parsed["s3"]["region"].as_str(),
            Some("us-east-1\"\n  injected: true")
        );
        assert!(parsed["s3"].get("injected").is_none());
        assert_eq!(parsed["global"]["secret_prefix"].as_str(), Some("\u{85}prefix"));
    }

    #[test]
    fn numeric_host_port_is_bare() {
        assert_eq!(host_port_scalar("5555").unwrap(), "5555");
        assert_eq!(host_port_scalar("").unwrap(), "\"\"");
        assert_eq!(host_port_scalar("55:55").unwrap(), "\"55:55\"");
    }

    #[test]
    fn empty_discriminant_hides_section() {
        let redis = Redis::default();
        assert!(non_empty(Some(&redis), |r| r.host.as_str()).is_none());
    }
}
