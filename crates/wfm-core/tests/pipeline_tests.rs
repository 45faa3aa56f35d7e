//! ---
//! wfm_section: "01-core-functionality"
//! wfm_subsection: "module"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "Primary migration pipeline."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use pretty_assertions::assert_eq;
use serde_json::json;
use wfm_common::MigrationConfig;
use wfm_core::{Migration, MigrationError};
use wfm_gateway::{Fault, GatewayCall, MemoryGateway, Operation};
use wfm_release::decode_release;

const NS: &str = "deis";

fn workload(name: &str) -> serde_json::Value {
    json!({
        "metadata": { "name": name, "labels": { "heritage": "deis" } },
        "spec": {
            "selector": { "matchLabels": { "app": name } },
            "template": { "spec": { "containers": [{ "name": name }] } }
        }
    })
}

fn install() -> Arc<MemoryGateway> {
    let gateway = MemoryGateway::new();
    let keyfile: Secret = serde_json::from_value(json!({
        "metadata": {
            "name": "objectstorage-keyfile",
            "labels": { "heritage": "deis" },
            "annotations": { "deis.io/objectstorage": "azure" }
        },
        "data": { "accountname": "ZGVpcw==", "accountkey": "a2V5" }
    }))
    .unwrap();
    gateway.insert(NS, &keyfile).unwrap();
    for name in ["deis-builder", "deis-controller", "deis-logger", "deis-registry"] {
        let deployment: Deployment = serde_json::from_value(workload(name)).unwrap();
        gateway.insert(NS, &deployment).unwrap();
    }
    let telegraf: DaemonSet = serde_json::from_value(workload("deis-monitor-telegraf")).unwrap();
    gateway.insert(NS, &telegraf).unwrap();
    let creds: Secret = serde_json::from_value(json!({
        "metadata": { "name": "django-secret-key", "labels": { "heritage": "deis" } }
    }))
    .unwrap();
    gateway.insert(NS, &creds).unwrap();
    Arc::new(gateway)
}

fn first_mutation(calls: &[GatewayCall]) -> Option<usize> {
    calls
        .iter()
        .position(|call| !matches!(call.operation, Operation::Get | Operation::List))
}

#[tokio::test]
async fn run_records_the_release_and_prunes_stale_deployments() {
    let gateway = install();
    let migration = Migration::new(Arc::clone(&gateway), MigrationConfig::default());

    let summary = migration.run().await.unwrap();

    assert_eq!(summary.record_key, "deis-workflow.v1");
    assert_eq!(summary.profile.storage_kind(), "azure");
    assert!(summary.values.contains("accountname: \"deis\""));
    assert_eq!(summary.annotations.len(), 5);
    assert_eq!(summary.annotations.annotated(), 1);
    assert_eq!(summary.pruned.deleted.len(), 3);
    assert!(gateway.object::<Deployment>(NS, "deis-controller").is_none());
    assert!(gateway.object::<Deployment>(NS, "deis-logger").is_some());

    let record: ConfigMap = gateway.object("kube-system", "deis-workflow.v1").unwrap();
    let stored = decode_release(&record.data.unwrap()["release"]).unwrap();
    assert_eq!(stored, summary.release);
    assert_eq!(stored.config.unwrap().raw, summary.values);
    assert!(!stored.manifest.contains("django-secret-key"));
    assert!(stored.manifest.contains("logger-deployment.yaml"));
    assert!(!stored.manifest.contains("controller-deployment.yaml"));
}

#[tokio::test]
async fn discovery_failure_writes_nothing() {
    let gateway = install();
    gateway.inject::<DaemonSet>(Operation::Get, "deis-monitor-telegraf", Fault::NotFound);
    let migration = Migration::new(Arc::clone(&gateway), MigrationConfig::default());

    let err = migration.run().await.unwrap_err();

    assert!(matches!(err, MigrationError::Discovery(_)));
    assert_eq!(err.phase(), "discover");
    assert_eq!(gateway.mutation_count(), 0);
}

#[tokio::test]
async fn existing_record_is_reported_distinctly() {
    let gateway = install();
    let existing: ConfigMap = serde_json::from_value(json!({
        "metadata": { "name": "deis-workflow.v1" },
        "data": { "release": "untouched" }
    }))
    .unwrap();
    gateway.insert("kube-system", &existing).unwrap();

    let err = Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap_err();

    assert!(err.is_already_recorded());
    let record: ConfigMap = gateway.object("kube-system", "deis-workflow.v1").unwrap();
    assert_eq!(record.data.unwrap()["release"], "untouched");
}

#[tokio::test]
async fn annotation_failures_do_not_abort() {
    let gateway = install();
    gateway.inject::<Secret>(
        Operation::Patch,
        "django-secret-key",
        Fault::server_error("webhook timeout"),
    );

    let summary = Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.annotations.failed(), 1);
    assert!(gateway.object::<ConfigMap>("kube-system", "deis-workflow.v1").is_some());
}

#[tokio::test]
async fn release_name_override_changes_the_record_key() {
    let gateway = install();
    let config = MigrationConfig::from_lookup(|key| match key {
        "RELEASE_NAME" => Some("workflow-prod".to_owned()),
        "WORKFLOW_VERSION" => Some("  ".to_owned()),
        _ => None,
    });

    let summary = Migration::new(Arc::clone(&gateway), config).run().await.unwrap();

    assert_eq!(summary.record_key, "workflow-prod.v1");
    let chart = summary.release.chart.unwrap();
    assert_eq!(chart.metadata.unwrap().version, "v2.7.0");
    assert!(gateway.object::<ConfigMap>("kube-system", "workflow-prod.v1").is_some());
}

#[tokio::test]
async fn reads_precede_every_write() {
    let gateway = install();
    Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap();

    let calls = gateway.calls();
    let first_write = first_mutation(&calls).unwrap();
    let last_discovery_read = calls
        .iter()
        .rposition(|call| {
            call.operation == Operation::Get && call.resource.name == "deis-controller"
        })
        .unwrap();
    assert!(last_discovery_read < first_write);
    assert_eq!(calls.last().unwrap().operation, Operation::Create);
}
