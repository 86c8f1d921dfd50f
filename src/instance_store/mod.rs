//! Authoritative in-memory instance and startup-operation store (spec §4.5).
//!
//! Grounded on the teacher's `domain::app_state`/`job_queue` pattern of a
//! single owning component behind a lock, generalized per spec §9: the
//! Instance Store is the sole mutator, state transitions are serialized
//! per-instance, and readers see a value immediately before or after a
//! mutation, never a partial patch.

pub mod transitions;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{instrument, warn};

use crate::cache::registry::CacheRegistry;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::instance::{InstanceId, InstanceState, InstanceStatus, ProviderInstanceId};
use crate::domain::startup_operation::{OperationId, StartupOperation, StartupPhase, StartupStatus};
use crate::provider::service::ProviderService;

struct Store {
    instances: HashMap<InstanceId, InstanceState>,
    startup_operations: HashMap<OperationId, StartupOperation>,
    /// Index from instance id to its currently non-terminal operation, used
    /// to enforce the "at most one non-terminal StartupOperation" invariant.
    active_operation_by_instance: HashMap<InstanceId, OperationId>,
}

pub struct InstanceStore {
    inner: Mutex<Store>,
    caches: std::sync::Arc<CacheRegistry>,
}

#[derive(Debug, Default, Clone)]
pub struct ListFilter {
    pub status: Option<InstanceStatus>,
}

pub struct InstancePatch {
    pub status: Option<InstanceStatus>,
    pub provider_instance_id: Option<ProviderInstanceId>,
    pub port_mappings: Option<Vec<crate::domain::instance::PortMapping>>,
    pub health_check: Option<crate::domain::instance::HealthCheckState>,
    pub last_error: Option<crate::domain::instance::LastError>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub stopped_at: Option<chrono::DateTime<Utc>>,
    pub terminated_at: Option<chrono::DateTime<Utc>>,
    pub mark_ready_now: bool,
    pub spot_reclaim_time: Option<i64>,
    pub spot_status: Option<String>,
}

impl Default for InstancePatch {
    fn default() -> Self {
        Self {
            status: None,
            provider_instance_id: None,
            port_mappings: None,
            health_check: None,
            last_error: None,
            started_at: None,
            stopped_at: None,
            terminated_at: None,
            mark_ready_now: false,
            spot_reclaim_time: None,
            spot_status: None,
        }
    }
}

impl InstanceStore {
    pub fn new(caches: std::sync::Arc<CacheRegistry>) -> Self {
        Self {
            inner: Mutex::new(Store {
                instances: HashMap::new(),
                startup_operations: HashMap::new(),
                active_operation_by_instance: HashMap::new(),
            }),
            caches,
        }
    }

    #[instrument(skip(self, state))]
    pub fn create(&self, state: InstanceState) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        if inner.instances.contains_key(&state.id) {
            return Err(Error::new(ErrorKind::Validation, "instance id already exists"));
        }
        inner.instances.insert(state.id.clone(), state);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<InstanceState> {
        self.inner
            .lock()
            .expect("instance store lock poisoned")
            .instances
            .get(id)
            .cloned()
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<InstanceState> {
        self.inner
            .lock()
            .expect("instance store lock poisoned")
            .instances
            .values()
            .filter(|inst| filter.status.is_none_or(|s| inst.status == s))
            .cloned()
            .collect()
    }

    /// Applies `patch` under the transition table, invalidating the cached
    /// view for `id` on success.
    #[instrument(skip(self, patch))]
    pub fn update(&self, id: &str, patch: InstancePatch) -> Result<InstanceState, Error> {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        let instance = inner
            .instances
            .get_mut(id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;

        if let Some(next_status) = patch.status {
            if !instance.status.can_transition_to(next_status) {
                return Err(Error::with_detail(
                    ErrorKind::Validation,
                    "illegal instance state transition",
                    format!("{} -> {next_status}", instance.status),
                ));
            }
            instance.status = next_status;
        }
        if let Some(pid) = patch.provider_instance_id {
            // providerInstanceId is never cleared once set (spec §3).
            instance.provider_instance_id.get_or_insert(pid);
        }
        if let Some(mappings) = patch.port_mappings {
            instance.port_mappings = Some(mappings);
        }
        if let Some(health_check) = patch.health_check {
            instance.health_check = Some(health_check);
        }
        if let Some(last_error) = patch.last_error {
            instance.last_error = Some(last_error);
        }
        if let Some(started_at) = patch.started_at {
            instance.timestamps.started_at = Some(started_at);
        }
        if let Some(stopped_at) = patch.stopped_at {
            instance.timestamps.stopped_at = Some(stopped_at);
        }
        if let Some(terminated_at) = patch.terminated_at {
            instance.timestamps.terminated_at = Some(terminated_at);
        }
        if patch.mark_ready_now && instance.timestamps.ready_at.is_none() {
            // readyAt is set at most once, on first transition into READY.
            instance.timestamps.ready_at = Some(Utc::now());
        }
        if let Some(spot_reclaim_time) = patch.spot_reclaim_time {
            instance.spot_reclaim_time = Some(spot_reclaim_time);
        }
        if let Some(spot_status) = patch.spot_status {
            instance.spot_status = Some(spot_status);
        }

        let updated = instance.clone();
        self.caches.instance_details.delete(&id.to_string());
        self.caches.instance_states.delete(&id.to_string());
        Ok(updated)
    }

    /// Migration's one exception to "providerInstanceId is never cleared
    /// once set" (spec §3): the old provider id refers to an instance the
    /// Provider has already reclaimed, so it is wholesale replaced rather
    /// than merged via `update`'s `get_or_insert` semantics.
    #[instrument(skip(self))]
    pub fn replace_provider_instance_id(&self, id: &str, new_provider_instance_id: ProviderInstanceId) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        let instance = inner
            .instances
            .get_mut(id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "instance not found"))?;
        instance.provider_instance_id = Some(new_provider_instance_id);
        self.caches.instance_details.delete(&id.to_string());
        self.caches.instance_states.delete(&id.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn begin_startup_operation(&self, instance_id: &str) -> Result<OperationId, Error> {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        if inner.active_operation_by_instance.contains_key(instance_id) {
            return Err(Error::new(
                ErrorKind::StartupAlreadyInProgress,
                "a startup operation is already in progress for this instance",
            ));
        }
        let op = StartupOperation::new(uuid::Uuid::new_v4().to_string(), instance_id.to_string());
        let op_id = op.operation_id.clone();
        inner
            .active_operation_by_instance
            .insert(instance_id.to_string(), op_id.clone());
        inner.startup_operations.insert(op_id.clone(), op);
        Ok(op_id)
    }

    #[instrument(skip(self))]
    pub fn advance_startup_operation(
        &self,
        op_id: &str,
        status: StartupStatus,
        phase: StartupPhase,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        let op = inner
            .startup_operations
            .get_mut(op_id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "startup operation not found"))?;
        op.status = status;
        op.phase = phase;
        op.phase_timestamps
            .insert(format!("{phase:?}"), Utc::now());

        if status.is_terminal() {
            let instance_id = op.instance_id.clone();
            inner.active_operation_by_instance.remove(&instance_id);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn complete_startup_operation(&self, op_id: &str, failed: bool, error: Option<String>) -> Result<(), Error> {
        let status = if failed {
            StartupStatus::Failed
        } else {
            StartupStatus::Completed
        };
        let phase = if failed {
            StartupPhase::Failed
        } else {
            StartupPhase::Completed
        };
        self.advance_startup_operation(op_id, status, phase)?;
        if failed {
            let mut inner = self.inner.lock().expect("instance store lock poisoned");
            if let Some(op) = inner.startup_operations.get_mut(op_id) {
                op.error = error;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove(&self, id: &str) {
        let mut inner = self.inner.lock().expect("instance store lock poisoned");
        inner.instances.remove(id);
        inner.active_operation_by_instance.remove(id);
        self.caches.instance_details.delete(&id.to_string());
        self.caches.instance_states.delete(&id.to_string());
    }

    /// Pulls current Provider status for every tracked instance and
    /// reconciles divergent fields. Provider is authoritative for `status`,
    /// `portMappings`, `spotStatus`; never demotes `READY` based solely on a
    /// transient fetch error, and adopts orphaned Provider instances only by
    /// `providerInstanceId` match (spec §9 Open Question, resolved
    /// conservatively).
    #[instrument(skip(self, provider))]
    pub async fn sync_from_provider(&self, provider: &ProviderService, request_id: &str) {
        let tracked_provider_ids: Vec<(InstanceId, ProviderInstanceId)> = {
            let inner = self.inner.lock().expect("instance store lock poisoned");
            inner
                .instances
                .values()
                .filter_map(|inst| inst.provider_instance_id.clone().map(|pid| (inst.id.clone(), pid)))
                .collect()
        };

        for (instance_id, provider_instance_id) in tracked_provider_ids {
            match provider.get_instance(&provider_instance_id, request_id).await {
                Ok(remote) => {
                    let mut inner = self.inner.lock().expect("instance store lock poisoned");
                    if let Some(instance) = inner.instances.get_mut(&instance_id) {
                        if let Ok(remote_status) = remote.status.parse() {
                            let remote_status: InstanceStatus = remote_status;
                            if instance.status.can_transition_to(remote_status) {
                                instance.status = remote_status;
                            }
                        }
                        if let Some(mappings) = remote.port_mappings {
                            instance.port_mappings = Some(mappings);
                        }
                        instance.spot_status = remote.spot_status;
                        instance.spot_reclaim_time = remote.spot_reclaim_time;
                        instance.timestamps.last_synced_at = Some(Utc::now());
                        self.caches.instance_states.delete(&instance_id);
                        self.caches.instance_details.delete(&instance_id);
                    }
                }
                Err(err) => {
                    warn!(instance_id, error = %err, "transient sync failure, state left unchanged");
                }
            }
        }
    }
}
