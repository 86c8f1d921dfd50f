use axum::body::Body;
use axum::http::{Request, StatusCode};
use gpu_orchestrator::domain::instance::InstanceStatus;
use gpu_orchestrator::domain::job::JobPayload;
use gpu_orchestrator::job_queue::job_processor::JobHandler;
use gpu_orchestrator::workflows::create::CreateInstanceHandler;
use gpu_orchestrator::workflows::monitor::MonitorInstanceHandler;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

mod common;

/// Spec §8 scenario 1: create happy path. POST /api/instances enqueues
/// CREATE_INSTANCE; running it through to MONITOR_INSTANCE and the
/// Provider reporting RUNNING with no health check configured lands the
/// instance in READY.
#[tokio::test]
async fn create_happy_path_reaches_ready() {
    let harness = common::TestHarness::new().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "prod-1",
            "name": "RTX 4090",
            "region": "us-east-1",
            "spotPrice": 0.40,
            "onDemandPrice": 1.20,
            "gpuType": "RTX4090",
            "gpuMemory": 24,
            "availability": "Available",
        }])))
        .mount(&harness.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/templates/tmpl-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tmpl-1",
            "imageUrl": "registry.example.com/image:latest",
            "imageAuth": null,
            "ports": [],
            "envs": [],
        })))
        .mount(&harness.mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "prov-instance-1",
            "initialStatus": "creating",
        })))
        .mount(&harness.mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex("^/instances/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "prov-instance-1",
            "name": "test-instance",
            "status": "running",
            "portMappings": [],
            "spotStatus": null,
            "spotReclaimTime": null,
        })))
        .mount(&harness.mock_server)
        .await;

    let response = harness
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/instances")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "test-instance",
                        "productName": "RTX 4090",
                        "templateId": "tmpl-1",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let instance_id = body["instanceId"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "CREATING");

    let ctx = harness.workflow_ctx();

    let create_job = harness.job_queue.claim_next_eligible().expect("CREATE_INSTANCE job enqueued");
    assert!(matches!(create_job.payload, JobPayload::CreateInstance(_)));
    CreateInstanceHandler::new(ctx.clone())
        .handle(&create_job.payload)
        .await
        .expect("CREATE_INSTANCE succeeds");
    harness.job_queue.complete_job(create_job.id);

    let created = harness.instance_store.get(&instance_id).unwrap();
    assert_eq!(created.status, InstanceStatus::Created);
    assert_eq!(created.provider_instance_id.as_deref(), Some("prov-instance-1"));

    let monitor_job = harness.job_queue.claim_next_eligible().expect("MONITOR_INSTANCE job enqueued");
    assert!(matches!(monitor_job.payload, JobPayload::MonitorInstance(_)));
    MonitorInstanceHandler::new(ctx)
        .handle(&monitor_job.payload)
        .await
        .expect("MONITOR_INSTANCE succeeds");
    harness.job_queue.complete_job(monitor_job.id);

    let ready = harness.instance_store.get(&instance_id).unwrap();
    assert_eq!(ready.status, InstanceStatus::Ready);
    assert!(ready.timestamps.ready_at.is_some());
}
