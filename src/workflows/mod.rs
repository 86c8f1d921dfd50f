//! CREATE / MONITOR / START / MIGRATE staged pipelines (spec §4.8), plus
//! webhook delivery.

pub mod create;
pub mod migrate;
pub mod monitor;
pub mod start;
pub mod webhook;

use std::sync::Arc;

use crate::domain::job::JobType;
use crate::job_queue::job_processor::HandlerRegistry;

use crate::cache::registry::CacheRegistry;
use crate::configuration::Settings;
use crate::instance_store::InstanceStore;
use crate::job_queue::JobQueue;
use crate::provider::service::ProviderService;

/// Handles shared by every workflow's stages: the Instance Store, Provider
/// Service, caches, job queue (for chaining the next job), and settings.
#[derive(Clone)]
pub struct WorkflowContext {
    pub instance_store: Arc<InstanceStore>,
    pub provider: Arc<ProviderService>,
    pub caches: Arc<CacheRegistry>,
    pub job_queue: Arc<JobQueue>,
    pub settings: Arc<Settings>,
}

/// Wires one `JobHandler` per `JobType` into a fresh registry, grounded on
/// the teacher's pattern of a distinct processor struct per job type
/// (`ModifierProcessor`, `ResourceProcessor`, ...).
pub fn register_handlers(ctx: WorkflowContext) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(JobType::CreateInstance, Arc::new(create::CreateInstanceHandler::new(ctx.clone())));
    registry.register(JobType::MonitorInstance, Arc::new(monitor::MonitorInstanceHandler::new(ctx.clone())));
    registry.register(JobType::StartInstance, Arc::new(start::StartInstanceHandler::new(ctx.clone())));
    registry.register(JobType::MonitorStartup, Arc::new(start::MonitorStartupHandler::new(ctx.clone())));
    registry.register(JobType::MigrateInstance, Arc::new(migrate::MigrateInstanceHandler::new(ctx.clone())));
    registry.register(JobType::SendWebhook, Arc::new(webhook::SendWebhookHandler::new(ctx)));
    registry
}
