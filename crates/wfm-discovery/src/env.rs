//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Environment and secret field extraction helpers."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{PodTemplateSpec, Secret};
use kube::ResourceExt;
use wfm_gateway::ResourceRef;

use crate::DiscoveryError;

/// Environment of the first container of a workload's pod template.
///
/// Later entries with the same name win; entries sourced through
/// `valueFrom` have no literal value and read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerEnv {
    values: BTreeMap<String, String>,
}

impl ContainerEnv {
    fn from_template(
        template: Option<&PodTemplateSpec>,
        resource: ResourceRef,
    ) -> Result<Self, DiscoveryError> {
        let container = template
            .and_then(|template| template.spec.as_ref())
            .and_then(|spec| spec.containers.first())
            .ok_or(DiscoveryError::MissingContainer(resource))?;

        let values = container
            .env
            .iter()
            .flatten()
            .map(|var| (var.name.clone(), var.value.clone().unwrap_or_default()))
            .collect();
        Ok(Self { values })
    }

    pub fn of_deployment(deployment: &Deployment) -> Result<Self, DiscoveryError> {
        let resource = ResourceRef::new(
            "Deployment",
            deployment.namespace().unwrap_or_default(),
            deployment.name_any(),
        );
        let template = deployment.spec.as_ref().map(|spec| &spec.template);
        Self::from_template(template, resource)
    }

    pub fn of_daemon_set(daemon_set: &DaemonSet) -> Result<Self, DiscoveryError> {
        let resource = ResourceRef::new(
            "DaemonSet",
            daemon_set.namespace().unwrap_or_default(),
            daemon_set.name_any(),
        );
        let template = daemon_set.spec.as_ref().map(|spec| &spec.template);
        Self::from_template(template, resource)
    }

    /// Value of `name`, or the empty string when unset.
    pub fn get(&self, name: &str) -> String {
        self.values.get(name).cloned().unwrap_or_default()
    }

    /// Value of `name` when set, even if set to the empty string.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Decoded value of a secret data key; absent keys read as empty.
pub fn secret_field(secret: &Secret, key: &str) -> String {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        .unwrap_or_default()
}

/// Annotation value on a secret.
pub fn secret_annotation<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret.annotations().get(key).map(String::as_str)
}
