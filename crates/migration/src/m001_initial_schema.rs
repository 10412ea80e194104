use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    patient_id TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    observation_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    triggered_at TEXT NOT NULL,
    claimed_by TEXT,
    claimed_at TEXT,
    acknowledged_at TEXT,
    resolved_by TEXT,
    resolved_at TEXT,
    resolution_note TEXT,
    time_spent_minutes INTEGER,
    cancelled_by TEXT,
    cancelled_at TEXT,
    cancel_reason TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_patient ON alerts(patient_id);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status);
CREATE INDEX IF NOT EXISTS idx_alerts_triggered_at ON alerts(triggered_at DESC);

-- Deduplication invariant: at most one open alert per (patient, rule).
-- The partial unique index is the source of truth; application-level
-- existence checks are only a fast path.
CREATE UNIQUE INDEX IF NOT EXISTS uq_alerts_open_per_rule
    ON alerts(patient_id, rule_id)
    WHERE status IN ('pending', 'acknowledged');
";

const DOWN_SQL: &str = "
DROP INDEX IF EXISTS uq_alerts_open_per_rule;
DROP INDEX IF EXISTS idx_alerts_triggered_at;
DROP INDEX IF EXISTS idx_alerts_status;
DROP INDEX IF EXISTS idx_alerts_patient;
DROP TABLE IF EXISTS alerts;
";
