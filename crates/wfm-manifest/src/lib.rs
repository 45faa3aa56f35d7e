//! ---
//! wfm_section: "03-persistence-logging"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Manifest snapshot of the running installation."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
//! Serialises the resources of the running installation into the
//! multi-document manifest stored with the release record.

use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use kube::{Resource, ResourceExt};
use tracing::{debug, info};
use wfm_gateway::{GatewayError, GatewayResource, LabelSelector, ResourceGateway, ResourceRef};

/// Label carried by every resource of the running installation.
pub const HERITAGE_LABEL: (&str, &str) = ("heritage", "deis");
/// Service installed under a different heritage and fetched by name.
pub const LOGGER_REDIS_SERVICE: &str = "deis-logger-redis";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to serialise {resource}: {source}")]
    Yaml {
        resource: ResourceRef,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A resource type that can appear in the snapshot.
pub trait ManifestObject: GatewayResource {
    /// Suffix of the chart template file the object came from.
    const TEMPLATE_SUFFIX: &'static str;

    /// Drop server-assigned state the chart would not carry.
    fn scrub(&mut self) {
        self.meta_mut().resource_version = None;
    }
}

impl ManifestObject for ServiceAccount {
    const TEMPLATE_SUFFIX: &'static str = "service-account";

    fn scrub(&mut self) {
        self.metadata.resource_version = None;
        self.secrets = None;
    }
}

impl ManifestObject for Secret {
    const TEMPLATE_SUFFIX: &'static str = "secret";
}

impl ManifestObject for Service {
    const TEMPLATE_SUFFIX: &'static str = "service";

    fn scrub(&mut self) {
        self.metadata.resource_version = None;
        if let Some(spec) = self.spec.as_mut() {
            spec.cluster_ip = None;
            spec.cluster_ips = None;
        }
    }
}

impl ManifestObject for Deployment {
    const TEMPLATE_SUFFIX: &'static str = "deployment";

    fn scrub(&mut self) {
        self.metadata.resource_version = None;
        self.metadata.annotations = None;
    }
}

impl ManifestObject for DaemonSet {
    const TEMPLATE_SUFFIX: &'static str = "daemonset";
}

/// Chart name for an object: its name after the first `-`.
pub fn chart_name(object_name: &str) -> &str {
    object_name
        .split_once('-')
        .map(|(_, chart)| chart)
        .unwrap_or(object_name)
}

/// Template path recorded in the `# Source:` comment.
pub fn source_path<K: ManifestObject>(object_name: &str) -> String {
    let chart = chart_name(object_name);
    format!(
        "workflow/charts/{chart}/templates/{chart}-{}.yaml",
        K::TEMPLATE_SUFFIX
    )
}

#[derive(Debug, Default)]
struct ManifestWriter {
    buffer: String,
    documents: usize,
}

impl ManifestWriter {
    fn push<K: ManifestObject>(
        &mut self,
        namespace: &str,
        mut object: K,
    ) -> Result<(), ManifestError> {
        let name = object.name_any();
        object.scrub();
        let yaml = serde_yaml::to_string(&object).map_err(|source| ManifestError::Yaml {
            resource: ResourceRef::of::<K>(namespace, &name),
            source,
        })?;
        self.buffer.push_str("\n---\n# Source: ");
        self.buffer.push_str(&source_path::<K>(&name));
        self.buffer.push('\n');
        self.buffer.push_str(&yaml);
        self.documents += 1;
        Ok(())
    }
}

async fn append_labelled<K, G>(
    gateway: &G,
    namespace: &str,
    writer: &mut ManifestWriter,
    skip: &BTreeSet<&str>,
) -> Result<(), ManifestError>
where
    K: ManifestObject,
    G: ResourceGateway,
{
    let selector = LabelSelector::matching(HERITAGE_LABEL.0, HERITAGE_LABEL.1);
    let objects: Vec<K> = gateway.list(namespace, &selector).await?;
    for object in objects {
        if skip.contains(object.name_any().as_str()) {
            debug!(kind = %K::kind(&()), name = %object.name_any(), "excluded from manifest");
            continue;
        }
        writer.push(namespace, object)?;
    }
    Ok(())
}

/// Assemble the manifest of every `heritage=deis` service account, secret,
/// service, deployment and daemon set, plus the logger Redis service.
///
/// Secrets named in `excluded_secrets` are left out; a missing logger Redis
/// service is ignored.
pub async fn assemble_manifest<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
    excluded_secrets: &[String],
) -> Result<String, ManifestError> {
    let none = BTreeSet::new();
    let excluded: BTreeSet<&str> = excluded_secrets.iter().map(String::as_str).collect();
    let mut writer = ManifestWriter::default();

    append_labelled::<ServiceAccount, _>(gateway, namespace, &mut writer, &none).await?;
    append_labelled::<Secret, _>(gateway, namespace, &mut writer, &excluded).await?;

    let selector = LabelSelector::matching(HERITAGE_LABEL.0, HERITAGE_LABEL.1);
    let services: Vec<Service> = gateway.list(namespace, &selector).await?;
    let listed_redis = services
        .iter()
        .any(|service| service.name_any() == LOGGER_REDIS_SERVICE);
    for service in services {
        writer.push(namespace, service)?;
    }
    if !listed_redis {
        match gateway.get::<Service>(namespace, LOGGER_REDIS_SERVICE).await {
            Ok(service) => writer.push(namespace, service)?,
            Err(err) if err.is_not_found() => {
                debug!(service = LOGGER_REDIS_SERVICE, "logger redis service absent")
            }
            Err(err) => return Err(err.into()),
        }
    }

    append_labelled::<Deployment, _>(gateway, namespace, &mut writer, &none).await?;
    append_labelled::<DaemonSet, _>(gateway, namespace, &mut writer, &none).await?;

    info!(%namespace, documents = writer.documents, "manifest assembled");
    Ok(writer.buffer)
}
