use axum::body::Body;
use axum::http::{Request, StatusCode};
use gpu_orchestrator::domain::instance::{BillingMode, InstanceState, InstanceStatus};
use gpu_orchestrator::job_queue::job_processor::JobHandler;
use gpu_orchestrator::workflows::start::StartInstanceHandler;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;

/// Spec §8 scenario 5: two `POST /api/instances/{id}/start` requests race
/// against an `EXITED` instance. Exactly one is accepted; the other is
/// rejected synchronously with `STARTUP_ALREADY_IN_PROGRESS` because the
/// first request's job has already moved the instance past `EXITED`/
/// `STOPPED` by the time the second is handled.
#[tokio::test]
async fn second_concurrent_start_is_rejected() {
    let harness = common::TestHarness::new().await;

    let mut instance = InstanceState::new(
        "inst-1".to_string(),
        "test-instance".to_string(),
        "RTX 4090".to_string(),
        "tmpl-1".to_string(),
        "us-east-1".to_string(),
        1,
        20,
        BillingMode::OnDemand,
        None,
    );
    instance.status = InstanceStatus::Exited;
    instance.provider_instance_id = Some("prov-instance-1".to_string());
    harness.instance_store.create(instance).unwrap();

    Mock::given(method("POST"))
        .and(path("/instances/prov-instance-1:start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&harness.mock_server)
        .await;

    let start_request = || {
        Request::builder()
            .method("POST")
            .uri("/api/instances/inst-1/start")
            .body(Body::empty())
            .unwrap()
    };

    let first = harness.router.clone().oneshot(start_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    // The handler's read-only check only rejects once the instance is no
    // longer EXITED/STOPPED; claim and run the first STARTUP job inline to
    // drive that transition before firing the second request.
    let ctx = harness.workflow_ctx();
    let start_job = harness.job_queue.claim_next_eligible().expect("START_INSTANCE job enqueued");
    StartInstanceHandler::new(ctx)
        .handle(&start_job.payload)
        .await
        .expect("START_INSTANCE succeeds");
    harness.job_queue.complete_job(start_job.id);

    let second = harness.router.clone().oneshot(start_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = second.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "STARTUP_ALREADY_IN_PROGRESS");
}
