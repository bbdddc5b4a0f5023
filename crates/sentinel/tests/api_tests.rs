//! Integration tests for the sentinel API endpoints

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use sentinel_lib::{
    anomaly::ThresholdEvaluator,
    health::{components, HealthRegistry},
    observability::SentinelMetrics,
    reconcile::{ReconcileConfig, Reconciler},
    sampler::{Sampler, StaticSampler},
    scheduler::{JobRegistry, ReconcileJob, SCAN_JOB},
    store::InMemoryStore,
    Provider, Sample,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use vm_sentinel::api::{create_router, AppState};

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    locks: JobRegistry,
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn hot_vm(provider: Provider, vm_name: &str) -> Sample {
    let mut sample = Sample::new(provider, vm_name, Utc::now());
    sample.cpu_pct = Some(96.0);
    sample
}

async fn setup_test_app(samplers: Vec<Arc<dyn Sampler>>) -> TestApp {
    setup_test_app_with_store(samplers, InMemoryStore::new()).await
}

async fn setup_test_app_with_store(
    samplers: Vec<Arc<dyn Sampler>>,
    store: InMemoryStore,
) -> TestApp {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::STORE).await;
    let _metrics = SentinelMetrics::new();

    let locks = JobRegistry::new();
    let reconciler = Reconciler::new(Arc::new(store), ReconcileConfig::default());
    let job = Arc::new(ReconcileJob::new(
        samplers,
        ThresholdEvaluator::default(),
        reconciler,
        locks.clone(),
        health_registry.clone(),
    ));

    let state = Arc::new(AppState::new(health_registry, job));
    TestApp {
        router: create_router(state.clone()),
        state,
        locks,
    }
}

async fn app_with_one_hot_vm() -> TestApp {
    setup_test_app(vec![Arc::new(StaticSampler::new(
        Provider::Vmware,
        vec![hot_vm(Provider::Vmware, "VM-1")],
    ))])
    .await
}

mod probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let app = setup_test_app(Vec::new()).await;

        let (status, health) = app.get("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["scheduler"].is_object());
        assert!(health["components"]["store"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_degraded() {
        let app = setup_test_app(Vec::new()).await;
        app.state
            .health_registry
            .set_degraded(components::SCHEDULER, "last pass timed out")
            .await;

        let (status, health) = app.get("/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let app = setup_test_app(Vec::new()).await;
        app.state
            .health_registry
            .set_unhealthy(components::STORE, "snapshot unwritable")
            .await;

        let (status, health) = app.get("/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_follows_registry() {
        let app = setup_test_app(Vec::new()).await;

        let (status, readiness) = app.get("/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);

        app.state.health_registry.set_ready(true).await;
        let (status, readiness) = app.get("/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let app = app_with_one_hot_vm().await;
        let (status, _) = app.post("/api/scan", json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let metrics_text = String::from_utf8(body.to_vec()).unwrap();

        assert!(metrics_text.contains("vm_sentinel_reconcile_latency_seconds_bucket"));
        assert!(metrics_text.contains("vm_sentinel_notification_decisions_total"));
        assert!(metrics_text.contains("vm_sentinel_active_notifications"));
    }
}

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_then_list_and_get() {
        let app = app_with_one_hot_vm().await;

        let (status, summary) = app.post("/api/scan", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["samples"], 1);
        assert_eq!(summary["report"]["created"], 1);
        let id = summary["report"]["created_ids"][0].as_i64().unwrap();

        let (status, page) = app.get("/api/notifications?status=OPEN&provider=vmware").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["vm_name"], "VM-1");
        assert_eq!(page["items"][0]["metric"], "CPU");

        let (status, row) = app.get(&format!("/api/notifications/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(row["status"], "OPEN");

        // Second scan over the same world changes nothing
        let (_, summary) = app.post("/api/scan", json!({})).await;
        assert_eq!(summary["report"]["created"], 0);
        assert_eq!(summary["report"]["preserved"], 1);
    }

    #[tokio::test]
    async fn test_notifications_survive_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notifications.json");
        let samplers = || -> Vec<Arc<dyn Sampler>> {
            vec![Arc::new(StaticSampler::new(
                Provider::Kvm,
                vec![hot_vm(Provider::Kvm, "kvm-07")],
            ))]
        };

        let store = InMemoryStore::with_persistence(&path).unwrap();
        let first = setup_test_app_with_store(samplers(), store).await;
        let (_, summary) = first.post("/api/scan", json!({})).await;
        let id = summary["report"]["created_ids"][0].as_i64().unwrap();
        first
            .post(&format!("/api/notifications/{id}/ack"), json!({ "by": "oncall" }))
            .await;

        let store = InMemoryStore::with_persistence(&path).unwrap();
        let restarted = setup_test_app_with_store(samplers(), store).await;
        let (status, row) = restarted.get(&format!("/api/notifications/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(row["status"], "ACK");

        // The acknowledged row is still the live alert for this VM
        let (_, summary) = restarted.post("/api/scan", json!({})).await;
        assert_eq!(summary["report"]["created"], 0);
        assert_eq!(summary["report"]["preserved"], 1);
    }

    #[tokio::test]
    async fn test_filters_accept_any_casing() {
        let app = app_with_one_hot_vm().await;
        app.post("/api/scan", json!({})).await;

        let (status, page) = app
            .get("/api/notifications?status=open&provider=VMware&metric=cpu")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);

        let (status, events) = app.get("/api/audit?action=notification_created").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(events.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_filter_is_400_with_error_body() {
        let app = setup_test_app(Vec::new()).await;

        let (status, body) = app.get("/api/notifications?status=snoozed").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("unknown status"));
    }

    #[tokio::test]
    async fn test_get_unknown_notification_is_404() {
        let app = setup_test_app(Vec::new()).await;

        let (status, body) = app.get("/api/notifications/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "notification 999 not found");
    }

    #[tokio::test]
    async fn test_acknowledge_flow() {
        let app = app_with_one_hot_vm().await;
        let (_, summary) = app.post("/api/scan", json!({})).await;
        let id = summary["report"]["created_ids"][0].as_i64().unwrap();
        let ack_uri = format!("/api/notifications/{id}/ack");

        let (status, body) = app.post(&ack_uri, json!({ "by": "   " })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].is_string());

        let (status, row) = app.post(&ack_uri, json!({ "by": "oncall" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(row["status"], "ACK");
        assert_eq!(row["ack_by"], "oncall");

        let (status, body) = app.post(&ack_uri, json!({ "by": "someone-else" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], format!("notification {id} is ACK, expected OPEN"));

        let (status, _) = app
            .post("/api/notifications/424242/ack", json!({ "by": "oncall" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, events) = app.get(&format!("/api/audit?target_id={id}")).await;
        assert_eq!(status, StatusCode::OK);
        let actions: Vec<&str> = events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["NOTIFICATION_CREATED", "NOTIFICATION_ACKNOWLEDGED"]);

        let (_, acks) = app.get("/api/audit?action=NOTIFICATION_ACKNOWLEDGED").await;
        assert_eq!(acks.as_array().unwrap().len(), 1);
    }
}

mod scan_tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_while_running_is_409() {
        let app = app_with_one_hot_vm().await;
        let _held = app.locks.try_acquire(SCAN_JOB).unwrap();

        let (status, body) = app.post("/api/scan", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already running"));

        let (_, page) = app.get("/api/notifications").await;
        assert_eq!(page["total"], 0);
    }

    #[tokio::test]
    async fn test_sampler_failure_is_503() {
        let app = setup_test_app(vec![Arc::new(StaticSampler::failing(
            Provider::Cedia,
            "token expired",
        ))])
        .await;

        let (status, body) = app.post("/api/scan", json!({})).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("cedia"));

        let (_, health) = app.get("/healthz").await;
        assert_eq!(health["components"]["scheduler"]["status"], "degraded");
    }
}
