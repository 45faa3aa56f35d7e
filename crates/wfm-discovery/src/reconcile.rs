//! ---
//! wfm_section: "02-discovery"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Credential secret reconciliation after discovery."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use wfm_gateway::{GatewayError, ResourceGateway};
use wfm_logging::{wfm_info, wfm_warn, LogContext};

/// Connection fields to copy into an off-cluster credentials secret.
///
/// The newer chart reads host, port and name from the secret while the
/// running install only carries them in deployment environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRepair {
    pub secret: String,
    pub fields: BTreeMap<String, String>,
}

impl CredentialRepair {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_owned(), value.to_owned());
        self
    }

    fn apply_to(&self, secret: &mut Secret) {
        let data = secret.data.get_or_insert_with(BTreeMap::new);
        for (key, value) in &self.fields {
            data.insert(key.clone(), ByteString(value.as_bytes().to_vec()));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Applied { secret: String },
    /// The secret vanished between discovery and the write.
    Skipped { secret: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to repair credentials secret {secret}: {source}")]
    Gateway {
        secret: String,
        #[source]
        source: GatewayError,
    },
}

/// Write each repair's fields into its secret with a single update.
///
/// A secret that no longer exists is skipped with a warning; any other
/// failure stops reconciliation.
pub async fn reconcile_credentials<G: ResourceGateway>(
    gateway: &G,
    namespace: &str,
    repairs: &[CredentialRepair],
) -> Result<Vec<RepairOutcome>, ReconcileError> {
    let mut outcomes = Vec::with_capacity(repairs.len());
    for repair in repairs {
        let ctx = LogContext::phase("reconcile")
            .with_namespace(namespace)
            .with_resource("Secret", &repair.secret);
        let fail = |source: GatewayError| ReconcileError::Gateway {
            secret: repair.secret.clone(),
            source,
        };

        let written = match gateway.get::<Secret>(namespace, &repair.secret).await {
            Ok(mut secret) => {
                repair.apply_to(&mut secret);
                gateway.update(namespace, &secret).await.map(|_| ())
            }
            Err(err) => Err(err),
        };

        match written {
            Ok(()) => {
                wfm_info!(context = ctx, "credentials secret updated with connection fields");
                outcomes.push(RepairOutcome::Applied {
                    secret: repair.secret.clone(),
                });
            }
            Err(err) if err.is_not_found() => {
                wfm_warn!(context = ctx, "credentials secret disappeared, repair skipped");
                outcomes.push(RepairOutcome::Skipped {
                    secret: repair.secret.clone(),
                });
            }
            Err(err) => return Err(fail(err)),
        }
    }
    Ok(outcomes)
}
