use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MigrationStatusBody {
    pub running: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRunRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub eligible_count: usize,
    pub enqueued_count: usize,
    pub dry_run: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MigrationHistoryBody {
    pub runs: Vec<MigrationRunRecord>,
}

impl From<crate::migration_scheduler::RunRecord> for MigrationRunRecord {
    fn from(r: crate::migration_scheduler::RunRecord) -> Self {
        Self {
            started_at: r.started_at,
            completed_at: r.completed_at,
            eligible_count: r.eligible_count,
            enqueued_count: r.enqueued_count,
            dry_run: r.dry_run,
            errors: r.errors,
        }
    }
}
