//! ---
//! wfm_section: "04-configuration-orchestration"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Concurrent secret annotation patcher."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use wfm_annotate::{annotate_all, AnnotateError, AnnotationOutcome, Marker, WriteStrategy};
use wfm_gateway::{
    Fault, GatewayResource, LabelSelector, MemoryGateway, Operation, ResourceGateway, Result,
};

const NS: &str = "deis";

fn secret(name: &str) -> Secret {
    let mut annotations = BTreeMap::new();
    annotations.insert("deis.io/owner".to_owned(), "workflow".to_owned());
    Secret {
        metadata: ObjectMeta {
            name: Some(name.into()),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        },
        ..Secret::default()
    }
}

/// Memory store whose reads of one name crash the calling task.
struct CrashingGateway {
    inner: MemoryGateway,
    crash_on: &'static str,
}

#[async_trait]
impl ResourceGateway for CrashingGateway {
    async fn get<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<K> {
        if name == self.crash_on {
            panic!("connection pool poisoned while reading {name}");
        }
        self.inner.get(namespace, name).await
    }

    async fn list<K: GatewayResource>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<K>> {
        self.inner.list(namespace, selector).await
    }

    async fn create<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        self.inner.create(namespace, object).await
    }

    async fn update<K: GatewayResource>(&self, namespace: &str, object: &K) -> Result<K> {
        self.inner.update(namespace, object).await
    }

    async fn patch<K: GatewayResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K> {
        self.inner.patch(namespace, name, patch).await
    }

    async fn delete<K: GatewayResource>(&self, namespace: &str, name: &str) -> Result<()> {
        self.inner.delete::<K>(namespace, name).await
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn every_name_yields_exactly_one_outcome() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.insert(NS, &secret("builder-key-auth")).unwrap();
    gateway.insert(NS, &secret("database-creds")).unwrap();
    gateway.insert(NS, &secret("django-secret-key")).unwrap();
    let names = names(&[
        "builder-key-auth",
        "builder-ssh-private-keys",
        "database-creds",
        "django-secret-key",
        "logger-redis-creds",
    ]);

    let report = annotate_all(Arc::clone(&gateway), NS, &names, &Marker::pre_install_hook()).await;

    assert_eq!(report.len(), names.len());
    let reported: BTreeSet<&str> = report.outcomes.iter().map(|e| e.name.as_str()).collect();
    let expected: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    assert_eq!(reported, expected);
    assert_eq!(report.annotated(), 3);
    assert_eq!(report.not_found(), 2);
    assert_eq!(report.failed(), 0);
    assert!(matches!(
        report.outcome("database-creds"),
        Some(AnnotationOutcome::Annotated {
            strategy: WriteStrategy::Patched
        })
    ));

    let stored: Secret = gateway.object(NS, "database-creds").unwrap();
    assert_eq!(
        stored.annotations().get("helm.sh/hook").map(String::as_str),
        Some("pre-install")
    );
    assert_eq!(
        stored.annotations().get("deis.io/owner").map(String::as_str),
        Some("workflow")
    );
}

#[tokio::test]
async fn missing_secret_is_never_written() {
    let gateway = Arc::new(MemoryGateway::new());
    let names = names(&["builder-ssh-private-keys"]);

    let report = annotate_all(Arc::clone(&gateway), NS, &names, &Marker::pre_install_hook()).await;

    assert!(matches!(
        report.outcome("builder-ssh-private-keys"),
        Some(AnnotationOutcome::NotFound)
    ));
    assert_eq!(
        gateway.count::<Secret>(Operation::Patch, "builder-ssh-private-keys"),
        0
    );
    assert_eq!(
        gateway.count::<Secret>(Operation::Update, "builder-ssh-private-keys"),
        0
    );
    assert_eq!(gateway.mutation_count(), 0);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_others() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.insert(NS, &secret("database-creds")).unwrap();
    gateway.insert(NS, &secret("logger-redis-creds")).unwrap();
    gateway.inject::<Secret>(
        Operation::Patch,
        "database-creds",
        Fault::server_error("admission webhook denied"),
    );
    gateway.inject::<Secret>(
        Operation::Get,
        "django-secret-key",
        Fault::Api {
            code: 403,
            message: "forbidden".into(),
        },
    );
    let names = names(&["database-creds", "django-secret-key", "logger-redis-creds"]);

    let report = annotate_all(Arc::clone(&gateway), NS, &names, &Marker::pre_install_hook()).await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.annotated(), 1);
    match report.outcome("django-secret-key") {
        Some(AnnotationOutcome::Failed(AnnotateError::Gateway(err))) => assert!(!err.is_not_found()),
        other => panic!("unexpected outcome {other:?}"),
    }
    let untouched: Secret = gateway.object(NS, "database-creds").unwrap();
    assert!(!untouched.annotations().contains_key("helm.sh/hook"));
}

#[tokio::test]
async fn empty_name_list_yields_empty_report() {
    let gateway = Arc::new(MemoryGateway::new());
    let report = annotate_all(gateway, NS, &[], &Marker::pre_install_hook()).await;
    assert!(report.is_empty());
}

#[tokio::test]
async fn custom_marker_is_applied() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.insert(NS, &secret("django-secret-key")).unwrap();
    let marker = Marker::new("deis.io/migrated", "true");

    let report = annotate_all(
        Arc::clone(&gateway),
        NS,
        &names(&["django-secret-key"]),
        &marker,
    )
    .await;

    assert_eq!(report.annotated(), 1);
    let stored: Secret = gateway.object(NS, "django-secret-key").unwrap();
    assert_eq!(
        stored.annotations().get("deis.io/migrated").map(String::as_str),
        Some("true")
    );
}

#[tokio::test]
async fn crashed_task_still_yields_an_outcome() {
    let inner = MemoryGateway::new();
    inner.insert(NS, &secret("database-creds")).unwrap();
    inner.insert(NS, &secret("django-secret-key")).unwrap();
    let gateway = Arc::new(CrashingGateway {
        inner,
        crash_on: "django-secret-key",
    });
    let names = names(&["database-creds", "django-secret-key", "logger-redis-creds"]);

    let report = annotate_all(Arc::clone(&gateway), NS, &names, &Marker::pre_install_hook()).await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.annotated(), 1);
    assert_eq!(report.not_found(), 1);
    assert_eq!(report.failed(), 1);
    match report.outcome("django-secret-key") {
        Some(AnnotationOutcome::Failed(AnnotateError::Task { name, .. })) => {
            assert_eq!(name, "django-secret-key")
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let untouched: Secret = gateway.inner.object(NS, "django-secret-key").unwrap();
    assert!(!untouched.annotations().contains_key("helm.sh/hook"));
}
