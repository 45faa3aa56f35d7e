//! ---
//! wfm_section: "15-testing-qa-runbook"
//! wfm_subsection: "integration-tests"
//! wfm_type: "source"
//! wfm_scope: "code"
//! wfm_description: "End-to-end migration runs against an in-memory cluster."
//! wfm_version: "v0.0.0-prealpha"
//! wfm_owner: "tbd"
//! ---
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use serde_yaml::Value as Yaml;
use wfm_common::MigrationConfig;
use wfm_core::Migration;
use wfm_gateway::{MemoryGateway, Operation};
use wfm_release::{decode_release, StatusCode};

const NS: &str = "deis";

fn secret(name: &str, annotations: Value, data: &[(&str, &str)]) -> Secret {
    let data: serde_json::Map<String, Value> = data
        .iter()
        .map(|(k, v)| (k.to_string(), json!(STANDARD.encode(v))))
        .collect();
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "labels": { "heritage": "deis" },
            "annotations": annotations
        },
        "data": data
    }))
    .unwrap()
}

fn workload(name: &str, env: &[(&str, &str)]) -> Value {
    let env: Vec<Value> = env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({
        "metadata": {
            "name": name,
            "labels": { "heritage": "deis" },
            "resourceVersion": "991"
        },
        "spec": {
            "selector": { "matchLabels": { "app": name } },
            "template": { "spec": { "containers": [{ "name": name, "env": env }] } }
        }
    })
}

fn seed_deployment(gateway: &MemoryGateway, name: &str, env: &[(&str, &str)]) {
    let mut object = workload(name, env);
    object["metadata"]["annotations"] = json!({ "deployment.kubernetes.io/revision": "4" });
    let deployment: Deployment = serde_json::from_value(object).unwrap();
    gateway.insert(NS, &deployment).unwrap();
}

/// Install with every pluggable concern pointed outside the cluster.
fn off_cluster_install() -> Arc<MemoryGateway> {
    let gateway = MemoryGateway::new();
    let seed_secret = |secret: Secret| gateway.insert(NS, &secret).unwrap();

    seed_secret(secret(
        "objectstorage-keyfile",
        json!({ "deis.io/objectstorage": "gcs" }),
        &[
            ("key.json", "{\"type\": \"service_account\"}"),
            ("registry-bucket", "reg"),
            ("database-bucket", "db"),
            ("builder-bucket", "build"),
        ],
    ));
    seed_secret(secret(
        "registry-secret",
        json!({ "deis.io/registry-location": "off-cluster" }),
        &[
            ("hostname", "quay.io"),
            ("organization", "acme"),
            ("username", "robot"),
            ("password", "p@ss: word"),
        ],
    ));
    seed_secret(secret(
        "database-creds",
        json!({}),
        &[("user", "deis"), ("password", "s3cret")],
    ));
    seed_secret(secret("logger-redis-creds", json!({}), &[("password", "r3dis")]));
    seed_secret(secret("builder-ssh-private-keys", json!({}), &[]));

    seed_deployment(
        &gateway,
        "deis-controller",
        &[
            ("DEIS_DATABASE_NAME", "deis"),
            ("DEIS_DATABASE_SERVICE_HOST", "db.example.com"),
            ("DEIS_DATABASE_SERVICE_PORT", "5432"),
            ("DEIS_REGISTRY_SERVICE_PORT", "5000"),
            ("DEIS_REGISTRY_SECRET_PREFIX", "private-registry"),
            ("IMAGE_PULL_POLICY", "Always"),
            ("REGISTRATION_MODE", "admin_only"),
        ],
    );
    seed_deployment(
        &gateway,
        "deis-logger",
        &[
            ("DEIS_LOGGER_REDIS_DB", "0"),
            ("DEIS_LOGGER_REDIS_SERVICE_HOST", "redis.example.com"),
            ("DEIS_LOGGER_REDIS_SERVICE_PORT", "6379"),
        ],
    );
    seed_deployment(&gateway, "deis-builder", &[]);
    seed_deployment(&gateway, "deis-router", &[]);

    let telegraf: DaemonSet = serde_json::from_value(workload(
        "deis-monitor-telegraf",
        &[
            ("INFLUXDB_URLS", "http://influx.example.com:8086"),
            ("INFLUXDB_DATABASE", "kubernetes"),
            ("INFLUXDB_USERNAME", "telegraf"),
            ("INFLUXDB_PASSWORD", "inf"),
        ],
    ))
    .unwrap();
    gateway.insert(NS, &telegraf).unwrap();

    let router: Service = serde_json::from_value(json!({
        "metadata": { "name": "deis-router", "labels": { "heritage": "deis" } },
        "spec": { "clusterIP": "10.3.0.12", "ports": [{ "port": 80 }] }
    }))
    .unwrap();
    gateway.insert(NS, &router).unwrap();
    let redis: Service = serde_json::from_value(json!({
        "metadata": { "name": "deis-logger-redis", "labels": { "app": "redis" } },
        "spec": { "ports": [{ "port": 6379 }] }
    }))
    .unwrap();
    gateway.insert(NS, &redis).unwrap();

    Arc::new(gateway)
}

fn field(secret: &Secret, key: &str) -> String {
    let data = secret.data.as_ref().unwrap();
    String::from_utf8(data[key].0.clone()).unwrap()
}

#[tokio::test]
async fn off_cluster_install_migrates_end_to_end() {
    let gateway = off_cluster_install();
    let summary = Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap();

    let values: Yaml = serde_yaml::from_str(&summary.values).unwrap();
    assert_eq!(values["global"]["storage"], Yaml::from("gcs"));
    assert_eq!(values["global"]["database_location"], Yaml::from("off-cluster"));
    assert_eq!(values["global"]["logger_redis_location"], Yaml::from("off-cluster"));
    assert_eq!(values["global"]["influxdb_location"], Yaml::from("off-cluster"));
    assert_eq!(values["global"]["grafana_location"], Yaml::from("off-cluster"));
    assert_eq!(values["global"]["registry_location"], Yaml::from("off-cluster"));
    assert_eq!(values["global"]["host_port"], Yaml::from(5000));
    assert_eq!(values["global"]["secret_prefix"], Yaml::from("private-registry"));
    assert_eq!(
        values["gcs"]["key_json"],
        Yaml::from("{\"type\": \"service_account\"}")
    );
    assert_eq!(values["database"]["postgres"]["host"], Yaml::from("db.example.com"));
    assert_eq!(values["database"]["postgres"]["password"], Yaml::from("s3cret"));
    assert_eq!(values["logger"]["redis"]["password"], Yaml::from("r3dis"));
    assert_eq!(values["monitor"]["influxdb"]["user"], Yaml::from("telegraf"));
    assert!(values["monitor"].get("grafana").is_none());
    assert_eq!(
        values["registry-token-refresher"]["off_cluster_registry"]["password"],
        Yaml::from("p@ss: word")
    );
    assert_eq!(values["controller"]["app_pull_policy"], Yaml::from("Always"));
    assert_eq!(values["controller"]["registration_mode"], Yaml::from("admin_only"));
    assert!(values.get("s3").is_none());
    assert!(values.get("router").is_none());

    let database: Secret = gateway.object(NS, "database-creds").unwrap();
    assert_eq!(field(&database, "host"), "db.example.com");
    assert_eq!(field(&database, "port"), "5432");
    assert_eq!(field(&database, "name"), "deis");
    assert_eq!(field(&database, "user"), "deis");
    assert_eq!(
        database.metadata.annotations.unwrap()["helm.sh/hook"],
        "pre-install"
    );
    let redis: Secret = gateway.object(NS, "logger-redis-creds").unwrap();
    assert_eq!(field(&redis, "host"), "redis.example.com");
    assert_eq!(field(&redis, "db"), "0");

    assert_eq!(summary.annotations.annotated(), 3);
    assert_eq!(summary.annotations.not_found(), 2);
    assert_eq!(summary.pruned.deleted, vec!["deis-builder", "deis-controller"]);
    assert_eq!(summary.pruned.missing, vec!["deis-registry"]);
}

#[tokio::test]
async fn stored_release_matches_the_cluster_snapshot() {
    let gateway = off_cluster_install();
    let summary = Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap();

    let record: ConfigMap = gateway.object("kube-system", "deis-workflow.v1").unwrap();
    let labels = record.metadata.labels.clone().unwrap();
    assert_eq!(labels["NAME"], "deis-workflow");
    assert_eq!(labels["OWNER"], "TILLER");
    assert_eq!(labels["STATUS"], "DEPLOYED");
    assert_eq!(labels["VERSION"], "1");

    let release = decode_release(&record.data.unwrap()["release"]).unwrap();
    assert_eq!(release.status_code(), StatusCode::Deployed);
    assert_eq!(release.namespace, "deis");
    assert_eq!(release.config.as_ref().unwrap().raw, summary.values);

    let manifest = release.manifest;
    assert!(manifest.contains("# Source: workflow/charts/router/templates/router-service.yaml"));
    assert!(manifest.contains("deis-logger-redis"));
    assert!(manifest.contains("registry-secret"));
    assert!(manifest.contains("monitor-telegraf-daemonset.yaml"));
    assert!(!manifest.contains("database-creds"));
    assert!(!manifest.contains("logger-redis-creds"));
    assert!(!manifest.contains("deis-controller"));
    assert!(!manifest.contains("10.3.0.12"));
    assert!(!manifest.contains("resourceVersion"));
    assert!(!manifest.contains("deployment.kubernetes.io/revision"));
}

#[tokio::test]
async fn rerun_after_success_stops_before_writing() {
    let gateway = off_cluster_install();
    Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap();
    let before: ConfigMap = gateway.object("kube-system", "deis-workflow.v1").unwrap();
    let mutations = gateway.mutation_count();

    // The controller deployment is gone after the first run.
    let err = Migration::new(Arc::clone(&gateway), MigrationConfig::default())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.phase(), "discover");
    assert_eq!(gateway.mutation_count(), mutations);
    assert_eq!(gateway.count::<ConfigMap>(Operation::Create, "deis-workflow.v1"), 1);
    let after: ConfigMap = gateway.object("kube-system", "deis-workflow.v1").unwrap();
    assert_eq!(before.data, after.data);
}
