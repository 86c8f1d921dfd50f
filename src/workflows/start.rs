//! START_INSTANCE / MONITOR_STARTUP workflow (spec §4.8.3).

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::webhook::enqueue_webhook;
use super::WorkflowContext;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::{HealthStatus, InstanceStatus, LastError, PortMapping};
use crate::domain::job::{JobPayload, JobPriority, MonitorStartupPayload, StartInstancePayload};
use crate::domain::startup_operation::{StartupPhase, StartupStatus};
use crate::instance_store::InstancePatch;
use crate::job_queue::job_processor::JobHandler;

pub struct StartInstanceHandler {
    ctx: WorkflowContext,
}

impl StartInstanceHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for StartInstanceHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::StartInstance(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        self.run(p).await
    }
}

impl StartInstanceHandler {
    async fn run(&self, p: &StartInstancePayload) -> Result<(), Error> {
        let request_id = Uuid::new_v4().to_string();

        let instance = self
            .ctx
            .instance_store
            .get(&p.instance_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;

        if !matches!(instance.status, InstanceStatus::Exited | InstanceStatus::Stopped) {
            return Err(Error::with_detail(
                ErrorKind::Validation,
                "instance is not in EXITED or STOPPED",
                instance.status.to_string(),
            ));
        }
        let provider_instance_id = instance
            .provider_instance_id
            .clone()
            .ok_or_else(|| Error::new(ErrorKind::Validation, "instance has no providerInstanceId"))?;

        // Stage 1: begin StartupOperation (rejects if one is already active).
        let operation_id = self.ctx.instance_store.begin_startup_operation(&p.instance_id)?;

        // Stage 2: startInstanceWithRetry.
        if let Err(err) = self.ctx.provider.start_instance_with_retry(&provider_instance_id, &request_id).await {
            let _ = self
                .ctx
                .instance_store
                .complete_startup_operation(&operation_id, true, Some(err.to_string()));
            return Err(err);
        }

        // Stage 3: transition STARTING; advance op to monitoring.
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Starting),
                ..Default::default()
            },
        )?;
        self.ctx
            .instance_store
            .advance_startup_operation(&operation_id, StartupStatus::Monitoring, StartupPhase::Monitoring)?;

        // Stage 4: enqueue MONITOR_STARTUP.
        self.ctx.job_queue.enqueue(
            JobPayload::MonitorStartup(MonitorStartupPayload {
                instance_id: p.instance_id.clone(),
                operation_id,
                provider_instance_id,
                webhook_url: instance.webhook_url.clone(),
                start_time: Utc::now(),
                max_wait_time_ms: self.ctx.settings.job_engine.instance_startup_timeout_ms,
                health_check_config: None,
            }),
            JobPriority::High,
            self.ctx.settings.job_engine.max_retry_attempts,
        );

        Ok(())
    }
}

pub struct MonitorStartupHandler {
    ctx: WorkflowContext,
    http: reqwest::Client,
}

impl MonitorStartupHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobHandler for MonitorStartupHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::MonitorStartup(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        self.run(p).await
    }
}

impl MonitorStartupHandler {
    /// Mirrors MONITOR_INSTANCE (spec §4.8.2) but also advances the
    /// StartupOperation's phase and emits per-phase webhooks.
    async fn run(&self, p: &MonitorStartupPayload) -> Result<(), Error> {
        let request_id = Uuid::new_v4().to_string();

        let remote = self
            .ctx
            .provider
            .get_instance(&p.provider_instance_id, &request_id)
            .await?;

        let elapsed = Utc::now() - p.start_time;
        let max_wait = chrono::Duration::milliseconds(p.max_wait_time_ms as i64);

        if !remote.status.eq_ignore_ascii_case("running") {
            if elapsed < max_wait {
                self.reschedule(p);
                return Ok(());
            }
            return self.fail(p, ErrorKind::StartupTimeout, "instance did not reach RUNNING before maxWaitTime").await;
        }

        let port_mappings = remote.port_mappings.clone().unwrap_or_default();
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Running),
                started_at: Some(Utc::now()),
                port_mappings: Some(port_mappings.clone()),
                ..Default::default()
            },
        )?;
        enqueue_webhook(
            &self.ctx,
            p.webhook_url.as_deref(),
            "instance.running",
            &p.instance_id,
            "RUNNING",
            json!({ "operationId": p.operation_id }),
        );

        match &p.health_check_config {
            None => self.complete(p),
            Some(config) => self.run_health_check(p, &port_mappings, config).await,
        }
    }

    fn reschedule(&self, p: &MonitorStartupPayload) {
        self.ctx.job_queue.enqueue(
            JobPayload::MonitorStartup(p.clone()),
            JobPriority::High,
            self.ctx.settings.job_engine.max_retry_attempts,
        );
    }

    async fn fail(&self, p: &MonitorStartupPayload, kind: ErrorKind, message: &'static str) -> Result<(), Error> {
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Failed),
                last_error: Some(LastError {
                    code: kind.code().to_string(),
                    message: message.to_string(),
                    phase: "monitor_startup".to_string(),
                    timestamp: Utc::now(),
                }),
                ..Default::default()
            },
        )?;
        let _ = self
            .ctx
            .instance_store
            .complete_startup_operation(&p.operation_id, true, Some(message.to_string()));
        enqueue_webhook(
            &self.ctx,
            p.webhook_url.as_deref(),
            "instance.failed",
            &p.instance_id,
            "FAILED",
            json!({ "reason": kind.code(), "operationId": p.operation_id }),
        );
        Err(Error::new(kind, message))
    }

    fn complete(&self, p: &MonitorStartupPayload) -> Result<(), Error> {
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Ready),
                mark_ready_now: true,
                ..Default::default()
            },
        )?;
        let _ = self
            .ctx
            .instance_store
            .complete_startup_operation(&p.operation_id, false, None);
        enqueue_webhook(
            &self.ctx,
            p.webhook_url.as_deref(),
            "instance.ready",
            &p.instance_id,
            "READY",
            json!({ "operationId": p.operation_id }),
        );
        Ok(())
    }

    async fn run_health_check(
        &self,
        p: &MonitorStartupPayload,
        port_mappings: &[PortMapping],
        config: &crate::domain::job::HealthCheckConfig,
    ) -> Result<(), Error> {
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::HealthChecking),
                ..Default::default()
            },
        )?;
        let _ = self.ctx.instance_store.advance_startup_operation(
            &p.operation_id,
            StartupStatus::HealthChecking,
            StartupPhase::HealthChecking,
        );

        let result = crate::health::check(&self.http, port_mappings, config).await;
        let status = result.status;
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                health_check: Some(result),
                ..Default::default()
            },
        )?;

        match status {
            HealthStatus::Healthy => self.complete(p),
            HealthStatus::Partial | HealthStatus::Unhealthy => {
                let elapsed = Utc::now() - p.start_time;
                let max_wait = chrono::Duration::milliseconds(p.max_wait_time_ms as i64);
                if elapsed < max_wait {
                    self.reschedule(p);
                    Ok(())
                } else {
                    self.fail(p, ErrorKind::HealthCheckFailed, "health checks did not pass before maxWaitTime").await
                }
            }
            HealthStatus::Pending | HealthStatus::InProgress => {
                self.reschedule(p);
                Ok(())
            }
        }
    }
}
