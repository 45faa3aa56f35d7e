//! ---
//! wfm_section: "05-networking-external-interfaces"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Typed access to namespaced cluster resources."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::{GatewayError, GatewayResource, LabelSelector, ResourceGateway, ResourceRef, Result};

/// Gateway operation, recorded in the call journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Single object read.
    Get,
    /// Label-selected listing.
    List,
    /// Object creation.
    Create,
    /// Full object replace.
    Update,
    /// Merge patch.
    Patch,
    /// Object deletion.
    Delete,
}

/// One journaled call against the memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    /// Operation performed.
    pub operation: Operation,
    /// Resource addressed; list calls carry an empty name.
    pub resource: ResourceRef,
}

/// Failure injected for a matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Report the object as missing.
    NotFound,
    /// Report a name collision.
    AlreadyExists,
    /// Report an arbitrary API status.
    Api {
        /// HTTP status code.
        code: u16,
        /// Server message.
        message: String,
    },
}

impl Fault {
    /// Shorthand for an internal server error.
    pub fn server_error(message: impl Into<String>) -> Self {
        Fault::Api {
            code: 500,
            message: message.into(),
        }
    }

    fn into_error(self, resource: ResourceRef) -> GatewayError {
        match self {
            Fault::NotFound => GatewayError::NotFound(resource),
            Fault::AlreadyExists => GatewayError::AlreadyExists(resource),
            Fault::Api { code, message } => GatewayError::Api {
                resource,
                code,
                message,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct FaultRule {
    operation: Operation,
    kind: String,
    name: String,
    fault: Fault,
}

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<ObjectKey, Value>,
    journal: Vec<GatewayCall>,
    faults: Vec<FaultRule>,
    revision: u64,
}

impl MemoryState {
    fn begin(&mut self, operation: Operation, resource: &ResourceRef) -> Result<()> {
        self.journal.push(GatewayCall {
            operation,
            resource: resource.clone(),
        });
        let fault = self.faults.iter().find(|rule| {
            rule.operation == operation && rule.kind == resource.kind && rule.name == resource.name
        });
        match fault {
            Some(rule) => Err(rule.fault.clone().into_error(resource.clone())),
            None => Ok(()),
        }
    }

    fn store(&mut self, resource: &ResourceRef, mut value: Value) -> Value {
        self.revision += 1;
        if let Some(metadata) = value
            .as_object_mut()
            .map(|object| object.entry("metadata").or_insert_with(|| Value::Object(Map::new())))
            .and_then(Value::as_object_mut)
        {
            metadata.insert(
                "resourceVersion".to_owned(),
                Value::String(self.revision.to_string()),
            );
            metadata.insert(
                "namespace".to_owned(),
                Value::String(resource.namespace.clone()),
            );
        }
        self.objects.insert(key_of(resource), value.clone());
        value
    }
}

fn key_of(resource: &ResourceRef) -> ObjectKey {
    (
        resource.kind.clone(),
        resource.namespace.clone(),
        resource.name.clone(),
    )
}

fn to_value<K: GatewayResource>(object: &K, resource: &ResourceRef) -> Result<Value> {
    serde_json::to_value(object).map_err(|source| GatewayError::Serialization {
        resource: resource.clone(),
        source,
    })
}

fn from_value<K: GatewayResource>(value: Value, resource: &ResourceRef) -> Result<K> {
    serde_json::from_value(value).map_err(|source| GatewayError::Serialization {
        resource: resource.clone(),
        source,
    })
}

/// Apply a JSON merge patch (RFC 7386) in place.
///
/// Maps merge recursively, `null` removes a key, everything else replaces.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, patch_value) in patch_map {
            if patch_value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    patch_value,
                );
            }
        }
    }
}

/// In-memory resource store with a call journal and fault injection.
///
/// Objects are kept in their JSON wire form, so anything the real API
/// server would round-trip round-trips here too.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without journaling the call.
    pub fn insert<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<()> {
        let resource = ResourceRef::of::<K>(namespace, &object.name_any());
        let value = to_value(object, &resource)?;
        self.state.lock().store(&resource, value);
        Ok(())
    }

    /// Inspect a stored object without journaling the call.
    pub fn object<K: GatewayResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let resource = ResourceRef::of::<K>(namespace, name);
        let value = self.state.lock().objects.get(&key_of(&resource)).cloned()?;
        from_value(value, &resource).ok()
    }

    /// Make every matching call fail with `fault`.
    pub fn inject<K: GatewayResource>(&self, operation: Operation, name: &str, fault: Fault) {
        self.state.lock().faults.push(FaultRule {
            operation,
            kind: K::kind(&()).into_owned(),
            name: name.to_owned(),
            fault,
        });
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().journal.clone()
    }

    /// Number of calls of `operation` against the named object of type `K`.
    pub fn count<K: GatewayResource>(&self, operation: Operation, name: &str) -> usize {
        let kind = K::kind(&());
        self.state
            .lock()
            .journal
            .iter()
            .filter(|call| {
                call.operation == operation
                    && call.resource.kind == kind
                    && call.resource.name == name
            })
            .count()
    }

    /// Number of mutating calls (create, update, patch, delete) recorded.
    pub fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|call| !matches!(call.operation, Operation::Get | Operation::List))
            .count()
    }
}

#[async_trait]
impl ResourceGateway for MemoryGateway {
    async fn get<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<K> {
        let resource = ResourceRef::of::<K>(namespace, name);
        let value = {
            let mut state = self.state.lock();
            state.begin(Operation::Get, &resource)?;
            state.objects.get(&key_of(&resource)).cloned()
        };
        match value {
            Some(value) => from_value(value, &resource),
            None => Err(GatewayError::NotFound(resource)),
        }
    }

    async fn list<K: GatewayResource>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<K>> {
        let scope = ResourceRef::of::<K>(namespace, "");
        let values: Vec<(ResourceRef, Value)> = {
            let mut state = self.state.lock();
            state.begin(Operation::List, &scope)?;
            state
                .objects
                .iter()
                .filter(|((kind, ns, _), _)| *kind == scope.kind && *ns == scope.namespace)
                .map(|((kind, ns, name), value)| {
                    (ResourceRef::new(kind, ns, name), value.clone())
                })
                .collect()
        };
        let mut selected = Vec::new();
        for (resource, value) in values {
            let object: K = from_value(value, &resource)?;
            if selector.matches(object.meta().labels.as_ref()) {
                selected.push(object);
            }
        }
        Ok(selected)
    }

    async fn create<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        let resource = ResourceRef::of::<K>(namespace, &object.name_any());
        let value = to_value(object, &resource)?;
        let stored = {
            let mut state = self.state.lock();
            state.begin(Operation::Create, &resource)?;
            if state.objects.contains_key(&key_of(&resource)) {
                return Err(GatewayError::AlreadyExists(resource));
            }
            state.store(&resource, value)
        };
        from_value(stored, &resource)
    }

    async fn update<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        let resource = ResourceRef::of::<K>(namespace, &object.name_any());
        let value = to_value(object, &resource)?;
        let stored = {
            let mut state = self.state.lock();
            state.begin(Operation::Update, &resource)?;
            if !state.objects.contains_key(&key_of(&resource)) {
                return Err(GatewayError::NotFound(resource));
            }
            state.store(&resource, value)
        };
        from_value(stored, &resource)
    }

    async fn patch<K: GatewayResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K> {
        let resource = ResourceRef::of::<K>(namespace, name);
        let stored = {
            let mut state = self.state.lock();
            state.begin(Operation::Patch, &resource)?;
            let Some(mut current) = state.objects.get(&key_of(&resource)).cloned() else {
                return Err(GatewayError::NotFound(resource));
            };
            apply_merge_patch(&mut current, patch);
            state.store(&resource, current)
        };
        from_value(stored, &resource)
    }

    async fn delete<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<()> {
        let resource = ResourceRef::of::<K>(namespace, name);
        let mut state = self.state.lock();
        state.begin(Operation::Delete, &resource)?;
        match state.objects.remove(&key_of(&resource)) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(resource)),
        }
    }
}
