//! MONITOR_INSTANCE workflow (spec §4.8.2): a self-rescheduling job rather
//! than an infinite loop, per spec §9's task-graph guidance.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::webhook::enqueue_webhook;
use super::WorkflowContext;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::{HealthStatus, InstanceStatus, LastError, PortMapping};
use crate::domain::job::{JobPayload, JobPriority, MonitorInstancePayload};
use crate::instance_store::InstancePatch;
use crate::job_queue::job_processor::JobHandler;

pub struct MonitorInstanceHandler {
    ctx: WorkflowContext,
    http: reqwest::Client,
}

impl MonitorInstanceHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobHandler for MonitorInstanceHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::MonitorInstance(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        self.run(p).await
    }
}

impl MonitorInstanceHandler {
    async fn run(&self, p: &MonitorInstancePayload) -> Result<(), Error> {
        let request_id = Uuid::new_v4().to_string();

        // Stage 1: getInstance from Provider.
        let remote = self
            .ctx
            .provider
            .get_instance(&p.provider_instance_id, &request_id)
            .await?;

        let elapsed = Utc::now() - p.start_time;
        let max_wait = chrono::Duration::milliseconds(p.max_wait_time_ms as i64);

        // Stage 2: not yet RUNNING.
        if !remote.status.eq_ignore_ascii_case("running") {
            if elapsed < max_wait {
                self.reschedule(p);
                return Ok(());
            }
            return self.fail_startup_timeout(p).await;
        }

        // Stage 3: RUNNING -> capture portMappings, startedAt.
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

        match &p.health_check_config {
            // Stage 4: no health check configured -> READY immediately.
            None => self.mark_ready(p),
            // Stage 5: run the Health Checker.
            Some(config) => self.run_health_check(p, &port_mappings, config).await,
        }
    }

    fn reschedule(&self, p: &MonitorInstancePayload) {
        self.ctx.job_queue.enqueue(
            JobPayload::MonitorInstance(p.clone()),
            JobPriority::High,
            self.ctx.settings.job_engine.max_retry_attempts,
        );
    }

    async fn fail_startup_timeout(&self, p: &MonitorInstancePayload) -> Result<(), Error> {
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Failed),
                last_error: Some(LastError {
                    code: ErrorKind::StartupTimeout.code().to_string(),
                    message: "instance did not reach RUNNING before maxWaitTime".to_string(),
                    phase: "monitor".to_string(),
                    timestamp: Utc::now(),
                }),
                ..Default::default()
            },
        )?;
        enqueue_webhook(
            &self.ctx,
            p.webhook_url.as_deref(),
            "instance.failed",
            &p.instance_id,
            "FAILED",
            json!({ "reason": "STARTUP_TIMEOUT" }),
        );
        Err(Error::new(ErrorKind::StartupTimeout, "instance startup timed out"))
    }

    fn mark_ready(&self, p: &MonitorInstancePayload) -> Result<(), Error> {
        self.ctx.instance_store.update(
            &p.instance_id,
            InstancePatch {
                status: Some(InstanceStatus::Ready),
                mark_ready_now: true,
                ..Default::default()
            },
        )?;
        enqueue_webhook(
            &self.ctx,
            p.webhook_url.as_deref(),
            "instance.ready",
            &p.instance_id,
            "READY",
            json!({}),
        );
        Ok(())
    }

    async fn run_health_check(
        &self,
        p: &MonitorInstancePayload,
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

        let result = crate::health::check(&self.http, port_mappings, config).await;
        match result.status {
            HealthStatus::Healthy => {
                self.ctx.instance_store.update(
                    &p.instance_id,
                    InstancePatch {
                        health_check: Some(result),
                        ..Default::default()
                    },
                )?;
                self.mark_ready(p)
            }
            HealthStatus::Partial | HealthStatus::Unhealthy => {
                let elapsed = Utc::now() - p.start_time;
                let max_wait = chrono::Duration::milliseconds(p.max_wait_time_ms as i64);
                self.ctx.instance_store.update(
                    &p.instance_id,
                    InstancePatch {
                        health_check: Some(result),
                        ..Default::default()
                    },
                )?;
                if elapsed < max_wait {
                    self.reschedule(p);
                    Ok(())
                } else {
                    self.ctx.instance_store.update(
                        &p.instance_id,
                        InstancePatch {
                            status: Some(InstanceStatus::Failed),
                            last_error: Some(LastError {
                                code: ErrorKind::HealthCheckFailed.code().to_string(),
                                message: "health checks did not pass before maxWaitTime".to_string(),
                                phase: "health_check".to_string(),
                                timestamp: Utc::now(),
                            }),
                            ..Default::default()
                        },
                    )?;
                    enqueue_webhook(
                        &self.ctx,
                        p.webhook_url.as_deref(),
                        "instance.failed",
                        &p.instance_id,
                        "FAILED",
                        json!({ "reason": "HEALTH_CHECK_FAILED" }),
                    );
                    Err(Error::new(ErrorKind::HealthCheckFailed, "health check failed"))
                }
            }
            HealthStatus::Pending | HealthStatus::InProgress => {
                self.reschedule(p);
                Ok(())
            }
        }
    }
}
