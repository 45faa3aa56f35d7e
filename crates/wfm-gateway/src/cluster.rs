//! ---
//! wfm_section: "05-networking-external-interfaces"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Typed access to namespaced cluster resources."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use crate::{GatewayError, GatewayResource, LabelSelector, ResourceGateway, ResourceRef, Result};

/// Gateway backed by a live API server.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster service account or local kubeconfig.
    pub async fn infer() -> std::result::Result<Self, kube::Error> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn api<K: GatewayResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeGateway").finish_non_exhaustive()
    }
}

/// Map a client error onto the gateway taxonomy.
fn classify(err: kube::Error, resource: ResourceRef) -> GatewayError {
    match err {
        kube::Error::Api(response) if response.code == 404 => GatewayError::NotFound(resource),
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            GatewayError::AlreadyExists(resource)
        }
        kube::Error::Api(response) => GatewayError::Api {
            resource,
            code: response.code,
            message: response.message,
        },
        kube::Error::SerdeError(source) => GatewayError::Serialization { resource, source },
        other => GatewayError::Transport {
            resource,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ResourceGateway for KubeGateway {
    async fn get<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<K> {
        debug!(kind = %K::kind(&()), %namespace, %name, "get");
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, name)))
    }

    async fn list<K: GatewayResource>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<K>> {
        let query = selector.to_query();
        debug!(kind = %K::kind(&()), %namespace, selector = %query, "list");
        let params = ListParams::default().labels(&query);
        self.api::<K>(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, "")))
    }

    async fn create<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object.name_any();
        debug!(kind = %K::kind(&()), %namespace, %name, "create");
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, &name)))
    }

    async fn update<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object.name_any();
        debug!(kind = %K::kind(&()), %namespace, %name, "replace");
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, &name)))
    }

    async fn patch<K: GatewayResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        debug!(kind = %K::kind(&()), %namespace, %name, "strategic merge patch");
        self.api::<K>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, name)))
    }

    async fn delete<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<()> {
        debug!(kind = %K::kind(&()), %namespace, %name, "delete");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|err| classify(err, ResourceRef::of::<K>(namespace, name)))
    }
}
