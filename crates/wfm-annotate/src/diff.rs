//! ---
//! wfm_section: "04-configuration-orchestration"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Two-way merge patch computation."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use serde_json::{Map, Value};

/// Reasons a patch between two object documents cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("object documents must be JSON objects")]
    NotAnObject,
    #[error("patch would change identity field {0}")]
    IdentityChanged(&'static str),
}

const IDENTITY_FIELDS: [(&str, &[&str]); 4] = [
    ("apiVersion", &["apiVersion"]),
    ("kind", &["kind"]),
    ("metadata.name", &["metadata", "name"]),
    ("metadata.namespace", &["metadata", "namespace"]),
];

fn lookup<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(document, |value, key| value.get(key))
}

/// Compute the merge patch turning `original` into `modified`.
///
/// Maps are diffed recursively, removed keys become `null` and any other
/// change, lists included, replaces the whole value. Returns an empty map
/// when nothing changed.
pub fn two_way_merge_patch(original: &Value, modified: &Value) -> Result<Value, DiffError> {
    let (Value::Object(before), Value::Object(after)) = (original, modified) else {
        return Err(DiffError::NotAnObject);
    };
    for (field, path) in IDENTITY_FIELDS {
        if lookup(original, path) != lookup(modified, path) {
            return Err(DiffError::IdentityChanged(field));
        }
    }
    Ok(Value::Object(diff_maps(before, after)))
}

fn diff_maps(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();
    for key in before.keys() {
        if !after.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }
    for (key, new_value) in after {
        match (before.get(key), new_value) {
            (Some(old_value), _) if old_value == new_value => {}
            (Some(Value::Object(old_map)), Value::Object(new_map)) => {
                patch.insert(key.clone(), Value::Object(diff_maps(old_map, new_map)));
            }
            _ => {
                patch.insert(key.clone(), new_value.clone());
            }
        }
    }
    patch
}
