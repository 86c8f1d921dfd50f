//! SEND_WEBHOOK job handler (spec §6 Webhook payload).

use async_trait::async_trait;
use chrono::Utc;
use tracing::{instrument, warn};

use super::WorkflowContext;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::job::{JobPayload, SendWebhookPayload};
use crate::domain::webhook::{sign, WebhookPayload};
use crate::job_queue::job_processor::JobHandler;

pub struct SendWebhookHandler {
    ctx: WorkflowContext,
    http: reqwest::Client,
}

impl SendWebhookHandler {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl JobHandler for SendWebhookHandler {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: &JobPayload) -> Result<(), Error> {
        let JobPayload::SendWebhook(p) = payload else {
            return Err(Error::new(ErrorKind::Internal, "handler received mismatched payload"));
        };
        self.deliver(p).await
    }

    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ctx.settings.webhook.timeout_ms)
    }
}

impl SendWebhookHandler {
    async fn deliver(&self, p: &SendWebhookPayload) -> Result<(), Error> {
        let body = WebhookPayload {
            event: p.event.clone(),
            instance_id: p.instance_id.clone(),
            status: p.status.clone(),
            timestamp: Utc::now(),
            extra: p.extra.clone(),
        };
        let serialized = serde_json::to_vec(&body)?;

        let secret = self
            .ctx
            .settings
            .webhook
            .secret
            .as_ref()
            .map(|s| secrecy::ExposeSecret::expose_secret(s).to_string());
        let signature = sign(secret.as_deref(), &serialized);

        let mut req = self
            .http
            .post(&p.url)
            .timeout(std::time::Duration::from_millis(self.ctx.settings.webhook.timeout_ms))
            .header("Content-Type", "application/json")
            .body(serialized);
        if let Some(signature) = signature {
            req = req.header("X-Signature", signature);
        }

        let response = req.send().await.map_err(|err| {
            if err.is_timeout() || err.is_connect() {
                Error::with_detail(ErrorKind::NetworkError, "webhook delivery failed", err.to_string())
            } else {
                Error::from(err)
            }
        })?;

        if response.status().is_server_error() {
            return Err(Error::with_detail(
                ErrorKind::ProviderServerError,
                "webhook endpoint returned a server error",
                response.status().to_string(),
            ));
        }
        if !response.status().is_success() {
            warn!(status = %response.status(), url = %p.url, "webhook endpoint rejected delivery, not retrying");
        }
        Ok(())
    }
}

/// Enqueues a SEND_WEBHOOK job if `webhook_url` is set, used by every other
/// workflow to emit `instance.*` events. Webhook jobs for a given instance
/// are expected to be enqueued one at a time by its owning workflow (no
/// workflow stage runs two webhook-emitting steps concurrently for the same
/// instance), which is what keeps per-instance delivery order linear.
pub fn enqueue_webhook(
    ctx: &WorkflowContext,
    webhook_url: Option<&str>,
    event: &str,
    instance_id: &str,
    status: &str,
    extra: serde_json::Value,
) {
    let Some(url) = webhook_url.map(str::to_string).or_else(|| ctx.settings.webhook.default_url.clone()) else {
        return;
    };
    ctx.job_queue.enqueue(
        JobPayload::SendWebhook(SendWebhookPayload {
            url,
            event: event.to_string(),
            instance_id: instance_id.to_string(),
            status: status.to_string(),
            extra,
        }),
        crate::domain::job::JobPriority::Normal,
        ctx.settings.webhook.retries,
    );
}
