//! MIGRATE_INSTANCE workflow (spec §4.8.4): re-homes a reclaimed spot
//! instance onto a freshly created replacement, preserving the local id.

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::webhook::enqueue_webhook;
use super::WorkflowContext;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::{InstanceStatus, LastError};
use crate::domain::job::{JobPayload, JobPriority, MigrateInstancePayload, MonitorInstancePayload};
use crate::instance_store::InstancePatch;
use crate::job_queue::job_processor::JobHandler;
use crate::provider::types::CreateInstanceSpec;

pub struct MigrateInstanceHandler {
    ctx: WorkflowContext,
}

impl MigrateInstanceHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for MigrateInstanceHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::MigrateInstance(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        // Failure here propagates to the job engine's own retry policy,
        // which doubles as the bounded retry budget for failed migrations
        // (spec §4.8.4 step 5): the instance stays ELIGIBLE (still EXITED)
        // so the next MIGRATE_INSTANCE attempt re-runs this handler.
        self.run(p).await
    }
}

impl MigrateInstanceHandler {
    async fn run(&self, p: &MigrateInstancePayload) -> Result<(), Error> {
        let request_id = Uuid::new_v4().to_string();

        let instance = self
            .ctx
            .instance_store
            .get(&p.instance_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;

        // Stage 1: re-select product, possibly landing in a different region.
        let selected = crate::product_selector::select_with_fallback(
            &self.ctx.provider,
            &instance.product_name,
            None,
            &[instance.region.clone()],
            &request_id,
        )
        .await;
        let selected = match selected {
            Ok(selected) => selected,
            Err(err) => {
                self.fail(&p.instance_id, &err, "product_selection");
                return Err(err);
            }
        };

        let template = match self.ctx.provider.get_template(&instance.template_id, &request_id).await {
            Ok(template) => template,
            Err(err) => {
                self.fail(&p.instance_id, &err, "template_fetch");
                return Err(err);
            }
        };

        // Stage 2: createInstance for the replacement.
        let spec = CreateInstanceSpec {
            name: instance.name.clone(),
            product_id: selected.product.id.clone(),
            region: selected.region.clone(),
            template_id: instance.template_id.clone(),
            gpu_num: instance.gpu_num,
            rootfs_size: instance.rootfs_size,
            image_url: template.image_url.clone(),
            image_auth: None,
            envs: template.envs.clone(),
        };
        let ack = match self.ctx.provider.create_instance(&spec, &request_id).await {
            Ok(ack) => ack,
            Err(err) => {
                self.fail(&p.instance_id, &err, "create_instance");
                return Err(err);
            }
        };

        // Stage 3: transfer identity. providerInstanceId is replaced wholesale
        // here (migration is the one legitimate exception to "never cleared
        // once set": the old provider id now refers to a reclaimed, gone
        // instance), the local instanceId is preserved.
        self.ctx.instance_store.replace_provider_instance_id(&p.instance_id, ack.id.clone())?;
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                // EXITED -> STARTING: the replacement instance is already
                // being provisioned on the Provider side, so this mirrors
                // the state START_INSTANCE would leave it in (spec §4.8.3)
                // rather than re-running through CREATING.
                status: Some(InstanceStatus::Starting),
                ..Default::default()
            },
        )?;

        // Stage 4: chain into a MONITOR flow as in §4.8.2.
        self.ctx.job_queue.enqueue(
            JobPayload::MonitorInstance(MonitorInstancePayload {
                instance_id: p.instance_id.clone(),
                provider_instance_id: ack.id,
                webhook_url: instance.webhook_url.clone(),
                start_time: chrono::Utc::now(),
                max_wait_time_ms: self.ctx.settings.job_engine.instance_startup_timeout_ms,
                health_check_config: None,
            }),
            JobPriority::High,
            self.ctx.settings.job_engine.max_retry_attempts,
        );

        enqueue_webhook(
            &self.ctx,
            instance.webhook_url.as_deref(),
            "instance.migrated",
            &p.instance_id,
            "STARTING",
            json!({ "reason": p.reason, "region": selected.region }),
        );

        Ok(())
    }

    fn fail(&self, instance_id: &str, err: &Error, phase: &str) {
        let _ = self.ctx.instance_store.update(
            instance_id,
            InstancePatch {
                last_error: Some(LastError {
                    code: err.kind().code().to_string(),
                    message: err.to_string(),
                    phase: phase.to_string(),
                    timestamp: chrono::Utc::now(),
                }),
                ..Default::default()
            },
        );
    }
}
