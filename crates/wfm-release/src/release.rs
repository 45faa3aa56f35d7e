//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Release descriptor wire types."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Protobuf messages wire-compatible with `hapi.release.Release` as stored
//! by the release manager. Only the fields this tool writes or inspects are
//! declared; unknown fields are skipped on decode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Release {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub info: Option<Info>,
    #[prost(message, optional, tag = "3")]
    pub chart: Option<Chart>,
    #[prost(message, optional, tag = "4")]
    pub config: Option<Config>,
    #[prost(string, tag = "5")]
    pub manifest: String,
    #[prost(int32, tag = "7")]
    pub version: i32,
    #[prost(string, tag = "8")]
    pub namespace: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Info {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, optional, tag = "2")]
    pub first_deployed: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub last_deployed: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub deleted: Option<Timestamp>,
    #[prost(string, tag = "5")]
    pub description: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "3")]
    pub resources: String,
    #[prost(string, tag = "4")]
    pub notes: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Unknown = 0,
    Deployed = 1,
    Deleted = 2,
    Superseded = 3,
    Failed = 4,
    Deleting = 5,
    PendingInstall = 6,
    PendingUpgrade = 7,
    PendingRollback = 8,
}

impl StatusCode {
    /// Name used in the wire schema and in record labels.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Deployed => "DEPLOYED",
            StatusCode::Deleted => "DELETED",
            StatusCode::Superseded => "SUPERSEDED",
            StatusCode::Failed => "FAILED",
            StatusCode::Deleting => "DELETING",
            StatusCode::PendingInstall => "PENDING_INSTALL",
            StatusCode::PendingUpgrade => "PENDING_UPGRADE",
            StatusCode::PendingRollback => "PENDING_ROLLBACK",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chart {
    #[prost(message, optional, tag = "1")]
    pub metadata: Option<Metadata>,
    #[prost(message, repeated, tag = "2")]
    pub templates: Vec<Template>,
    #[prost(message, repeated, tag = "3")]
    pub dependencies: Vec<Chart>,
    #[prost(message, optional, tag = "4")]
    pub values: Option<Config>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub home: String,
    #[prost(string, repeated, tag = "3")]
    pub sources: Vec<String>,
    #[prost(string, tag = "4")]
    pub version: String,
    #[prost(string, tag = "5")]
    pub description: String,
    #[prost(string, repeated, tag = "6")]
    pub keywords: Vec<String>,
    #[prost(string, tag = "9")]
    pub icon: String,
    #[prost(string, tag = "10")]
    pub api_version: String,
    #[prost(string, tag = "13")]
    pub app_version: String,
    #[prost(bool, tag = "14")]
    pub deprecated: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Template {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Values supplied to a release, as the raw document plus parsed entries.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Config {
    #[prost(string, tag = "1")]
    pub raw: String,
    #[prost(map = "string, message", tag = "2")]
    pub values: HashMap<String, Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(string, tag = "1")]
    pub value: String,
}

impl Release {
    /// Status code of the release, `Unknown` when no status is set.
    pub fn status_code(&self) -> StatusCode {
        self.info
            .as_ref()
            .and_then(|info| info.status.as_ref())
            .map(Status::code)
            .unwrap_or(StatusCode::Unknown)
    }
}

impl Config {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            values: HashMap::new(),
        }
    }
}

/// Protobuf timestamp for a UTC instant.
pub fn timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}
