use gpu_orchestrator::domain::instance::{BillingMode, InstanceState, InstanceStatus};
use gpu_orchestrator::domain::job::{JobPayload, MigrateInstancePayload};
use gpu_orchestrator::job_queue::job_processor::JobHandler;
use gpu_orchestrator::workflows::migrate::MigrateInstanceHandler;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;

/// Spec §4.8.4: a spot instance the migration scheduler has flagged
/// reclaimed is re-homed onto a freshly created replacement, keeping the
/// local instance id and landing in STARTING with a MONITOR_INSTANCE job
/// chained behind it.
#[tokio::test]
async fn migrate_instance_rehomes_onto_replacement() {
    let harness = common::TestHarness::new().await;

    let mut instance = InstanceState::new(
        "inst-1".to_string(),
        "reclaimed-instance".to_string(),
        "RTX 4090".to_string(),
        "tmpl-1".to_string(),
        "us-east-1".to_string(),
        1,
        20,
        BillingMode::Spot,
        None,
    );
    instance.status = InstanceStatus::Exited;
    instance.provider_instance_id = Some("prov-old".to_string());
    instance.spot_reclaim_time = Some(1700000000);
    instance.spot_status = Some("reclaimed".to_string());
    harness.instance_store.create(instance).unwrap();

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "prod-2",
            "name": "RTX 4090",
            "region": "us-east-1",
            "spotPrice": 0.35,
            "onDemandPrice": 1.10,
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
            "id": "prov-instance-2",
            "initialStatus": "creating",
        })))
        .mount(&harness.mock_server)
        .await;

    let ctx = harness.workflow_ctx();
    MigrateInstanceHandler::new(ctx)
        .handle(&JobPayload::MigrateInstance(MigrateInstancePayload {
            instance_id: "inst-1".to_string(),
            reason: "spot_reclaim".to_string(),
        }))
        .await
        .expect("MIGRATE_INSTANCE succeeds");

    let migrated = harness.instance_store.get("inst-1").unwrap();
    assert_eq!(migrated.status, InstanceStatus::Starting);
    assert_eq!(migrated.provider_instance_id.as_deref(), Some("prov-instance-2"));

    let monitor_job = harness.job_queue.claim_next_eligible().expect("MONITOR_INSTANCE job chained");
    match monitor_job.payload {
        JobPayload::MonitorInstance(p) => {
            assert_eq!(p.instance_id, "inst-1");
            assert_eq!(p.provider_instance_id, "prov-instance-2");
        }
        other => panic!("expected MonitorInstance payload, got {other:?}"),
    }
}
