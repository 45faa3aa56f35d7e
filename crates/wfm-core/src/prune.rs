//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Removal of deployments the new release manager cannot patch."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use k8s_openapi::api::apps::v1::Deployment;
use wfm_gateway::{GatewayError, ResourceGateway};
use wfm_logging::{wfm_info, wfm_warn, LogContext};

#[derive(Debug, thiserror::Error)]
#[error("failed to delete deployment {name}: {source}")]
pub struct PruneError {
    pub name: String,
    #[source]
    pub source: GatewayError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
}

/// Delete each named deployment in order.
///
/// Deployments that are already gone are noted and skipped; any other
/// failure stops pruning.
pub async fn prune_deployments<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
    names: &[String],
) -> Result<PruneReport, PruneError> {
    let mut report = PruneReport::default();
    for name in names {
        let ctx = LogContext::phase("prune")
            .with_namespace(namespace)
            .with_resource("Deployment", name);
        match gateway.delete::<Deployment>(namespace, name).await {
            Ok(()) => {
                wfm_info!(context = ctx, "deployment deleted");
                report.deleted.push(name.clone());
            }
            Err(err) if err.is_not_found() => {
                wfm_warn!(context = ctx, "deployment already absent");
                report.missing.push(name.clone());
            }
            Err(source) => {
                return Err(PruneError {
                    name: name.clone(),
                    source,
                })
            }
        }
    }
    Ok(report)
}
