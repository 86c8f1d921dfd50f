//! CREATE_INSTANCE workflow (spec §4.8.1).

use async_trait::async_trait;
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::webhook::enqueue_webhook;
use super::WorkflowContext;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::job::{CreateInstancePayload, JobPayload, JobPriority, MonitorInstancePayload};
use crate::instance_store::InstancePatch;
use crate::job_queue::job_processor::JobHandler;
use crate::provider::types::{CreateInstanceSpec, ImageAuth};

pub struct CreateInstanceHandler {
    ctx: WorkflowContext,
}

impl CreateInstanceHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for CreateInstanceHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::CreateInstance(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        self.run(p).await
    }
}

impl CreateInstanceHandler {
    async fn run(&self, p: &CreateInstancePayload) -> Result<(), Error> {
        let request_id = Uuid::new_v4().to_string();

        // Stage 1: select product with region fallback.
        let selected = crate::product_selector::select_with_fallback(
            &self.ctx.provider,
            &p.product_name,
            p.preferred_region.as_deref(),
            p.region_priority_list.as_deref().unwrap_or(&[]),
            &request_id,
        )
        .await;

        let selected = match selected {
            Ok(selected) => selected,
            Err(err) => {
                self.fail(&p.instance_id, &err, "product_selection", p.webhook_url.as_deref());
                return Err(err);
            }
        };

        // Stage 2: fetch template; resolve registry auth if required.
        let template = match self.ctx.provider.get_template(&p.template_id, &request_id).await {
            Ok(template) => template,
            Err(err) => {
                self.fail(&p.instance_id, &err, "template_fetch", p.webhook_url.as_deref());
                return Err(err);
            }
        };

        let image_auth = if let Some(auth_id) = &template.image_auth {
            match self.ctx.provider.get_registry_auth(auth_id, &request_id).await {
                Ok(auth) => Some(ImageAuth {
                    username: auth.username,
                    password: auth.password,
                }),
                Err(err) => {
                    self.fail(&p.instance_id, &err, "registry_auth", p.webhook_url.as_deref());
                    return Err(err);
                }
            }
        } else {
            None
        };

        // Stage 3: create the instance on the Provider.
        let spec = CreateInstanceSpec {
            name: p.name.clone(),
            product_id: selected.product.id.clone(),
            region: selected.region.clone(),
            template_id: p.template_id.clone(),
            gpu_num: p.gpu_num,
            rootfs_size: p.rootfs_size,
            image_url: template.image_url.clone(),
            image_auth,
            envs: template.envs.clone(),
        };
        let ack = match self.ctx.provider.create_instance(&spec, &request_id).await {
            Ok(ack) => ack,
            Err(err) => {
                self.fail(&p.instance_id, &err, "create_instance", p.webhook_url.as_deref());
                return Err(err);
            }
        };

        // Stage 4: update InstanceState: CREATING -> CREATED, store mappings.
        //
        // If this update (or the enqueue below) fails after the Provider
        // create succeeded, the instance is orphaned on the Provider side;
        // the sync loop in the Instance Store adopts it on its next pass by
        // `providerInstanceId` match (spec §4.8.1 partial-failure note).
        let port_mappings: Vec<_> = template
            .ports
            .iter()
            .map(|port| crate::domain::instance::PortMapping {
                port: port.port,
                endpoint: format!("http://{}:{}", ack.id, port.port),
                port_type: crate::domain::instance::PortType::Http,
            })
            .collect();

        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(crate::domain::instance::InstanceStatus::Created),
                provider_instance_id: Some(ack.id.clone()),
                port_mappings: Some(port_mappings),
                ..Default::default()
            },
        )?;

        // Stage 5: enqueue MONITOR_INSTANCE at HIGH priority.
        self.ctx.job_queue.enqueue(
            JobPayload::MonitorInstance(MonitorInstancePayload {
                instance_id: p.instance_id.clone(),
                provider_instance_id: ack.id,
                webhook_url: p.webhook_url.clone(),
                start_time: chrono::Utc::now(),
                max_wait_time_ms: p.max_wait_time_ms,
                health_check_config: p.health_check_config.clone(),
            }),
            JobPriority::High,
            self.ctx.settings.job_engine.max_retry_attempts,
        );

        Ok(())
    }

    fn fail(&self, instance_id: &str, err: &Error, phase: &str, webhook_url: Option<&str>) {
        warn!(instance_id, phase, error = %err, "CREATE_INSTANCE failed");
        let _ = self.ctx.instance_store.update(
            instance_id,
            InstancePatch {
                status: Some(crate::domain::instance::InstanceStatus::Failed),
                last_error: Some(crate::domain::instance::LastError {
                    code: err.kind().code().to_string(),
                    message: err.to_string(),
                    phase: phase.to_string(),
                    timestamp: chrono::Utc::now(),
                }),
                ..Default::default()
            },
        );
        enqueue_webhook(
            &self.ctx,
            webhook_url,
            "instance.failed",
            instance_id,
            "FAILED",
            json!({ "phase": phase }),
        );
    }
}
