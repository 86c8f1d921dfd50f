use axum::debug_handler;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, instrument};

use crate::controllers::instances::models::{
    AcceptedResponse, CreateInstanceRequest, CreateInstanceResponse, InstanceListResponse,
    InstanceView, ListInstancesQuery,
};
use crate::domain::app_state::{AppProvider, AppQueue, AppSettings, AppState, AppStore};
use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::InstanceState;
use crate::domain::job::{CreateInstancePayload, JobPayload, JobPriority, StartInstancePayload};
use crate::instance_store::ListFilter;
use uuid::Uuid;

#[instrument(skip(store, queue, req))]
#[debug_handler(state = AppState)]
pub(super) async fn create_instance(
    State(store): State<AppStore>,
    State(queue): State<AppQueue>,
    State(settings): State<AppSettings>,
    Json(req): Json<CreateInstanceRequest>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let instance_id = Uuid::new_v4().to_string();
    let instance = InstanceState::new(
        instance_id.clone(),
        req.name.clone(),
        req.product_name.clone(),
        req.template_id.clone(),
        req.preferred_region.clone().unwrap_or_else(|| settings.region.default_region.clone()),
        req.gpu_num,
        req.rootfs_size,
        req.billing_mode,
        req.webhook_url.clone(),
    );
    store.create(instance)?;

    let max_wait_time_ms = req
        .max_wait_time_ms
        .unwrap_or(settings.job_engine.instance_startup_timeout_ms);

    queue.enqueue(
        JobPayload::CreateInstance(CreateInstancePayload {
            instance_id: instance_id.clone(),
            name: req.name,
            product_name: req.product_name,
            template_id: req.template_id,
            preferred_region: req.preferred_region,
            region_priority_list: req.region_priority_list.or_else(|| Some(settings.region.priority_list.clone())),
            gpu_num: req.gpu_num,
            rootfs_size: req.rootfs_size,
            billing_mode: req.billing_mode,
            webhook_url: req.webhook_url,
            max_wait_time_ms,
            health_check_config: req.health_check_config,
        }),
        JobPriority::Normal,
        settings.job_engine.max_retry_attempts,
    );

    info!(instance_id, "create instance accepted");
    let estimated_ready_time = chrono::Utc::now() + chrono::Duration::milliseconds(max_wait_time_ms as i64);
    Ok((
        StatusCode::CREATED,
        Json(CreateInstanceResponse {
            instance_id,
            status: crate::domain::instance::InstanceStatus::Creating,
            estimated_ready_time,
        }),
    ))
}

#[instrument(skip(store))]
#[debug_handler(state = AppState)]
pub(super) async fn get_instance(
    State(store): State<AppStore>,
    Path(id): Path<String>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let instance = store.get(&id).ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
    Ok(Json(InstanceView::from(instance)))
}

#[instrument(skip(store, query))]
#[debug_handler(state = AppState)]
pub(super) async fn list_instances(
    State(store): State<AppStore>,
    Query(query): Query<ListInstancesQuery>,
) -> impl IntoResponse {
    let all = store.list(&ListFilter { status: query.status });
    let total = all.len();
    let page: Vec<InstanceView> = all
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(InstanceView::from)
        .collect();
    Json(InstanceListResponse { instances: page, total })
}

/// Rejects a start request synchronously if the instance is already mid
/// startup; the actual `EXITED|STOPPED -> STARTING` transition, and the
/// authoritative check against an active `StartupOperation`, happen inside
/// `StartInstanceHandler` (spec §4.8.3) once the job runs.
#[instrument(skip(store, queue))]
#[debug_handler(state = AppState)]
pub(super) async fn start_instance(
    State(store): State<AppStore>,
    State(queue): State<AppQueue>,
    State(settings): State<AppSettings>,
    Path(id): Path<String>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let instance = store.get(&id).ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
    if matches!(
        instance.status,
        crate::domain::instance::InstanceStatus::Starting | crate::domain::instance::InstanceStatus::HealthChecking
    ) {
        return Err(Error::new(ErrorKind::StartupAlreadyInProgress, "instance is already starting"));
    }

    queue.enqueue(
        JobPayload::StartInstance(StartInstancePayload { instance_id: id.clone() }),
        JobPriority::High,
        settings.job_engine.max_retry_attempts,
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            instance_id: id,
            status: crate::domain::instance::InstanceStatus::Starting,
        }),
    ))
}

#[instrument(skip(store, provider))]
#[debug_handler(state = AppState)]
pub(super) async fn stop_instance(
    State(store): State<AppStore>,
    State(provider): State<AppProvider>,
    Path(id): Path<String>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let instance = store.get(&id).ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
    let provider_instance_id = instance
        .provider_instance_id
        .ok_or_else(|| Error::new(ErrorKind::Validation, "instance has no providerInstanceId"))?;
    let request_id = Uuid::new_v4().to_string();
    provider.stop_instance(&provider_instance_id, &request_id).await?;
    let updated = store.update(
        &id,
        crate::instance_store::InstancePatch {
            status: Some(crate::domain::instance::InstanceStatus::Stopping),
            ..Default::default()
        },
    )?;
    Ok(Json(InstanceView::from(updated)))
}

#[instrument(skip(store, provider))]
#[debug_handler(state = AppState)]
pub(super) async fn delete_instance(
    State(store): State<AppStore>,
    State(provider): State<AppProvider>,
    Path(id): Path<String>,
) -> crate::domain::error::Result<impl IntoResponse> {
    let instance = store.get(&id).ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
    if let Some(provider_instance_id) = instance.provider_instance_id {
        let request_id = Uuid::new_v4().to_string();
        provider.delete_instance(&provider_instance_id, &request_id).await?;
    }
    store.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}
