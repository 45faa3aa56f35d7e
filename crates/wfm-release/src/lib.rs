//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Release descriptor codec and recorder."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Release descriptors and the config map records the release manager reads
//! them from.

pub mod codec;
pub mod recorder;
pub mod release;

pub use crate::codec::{decode_release, encode_release, CodecError};
pub use crate::recorder::{
    record, record_in, release_config_map, release_key, RecordError, RECORD_NAMESPACE,
};
pub use crate::release::{
    timestamp, Chart, Config, Info, Metadata, Release, Status, StatusCode,
};
