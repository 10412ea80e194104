use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, SqlErr,
};

use carewatch_common::types::{Alert, AlertStatus, Severity};

use crate::entities::alert::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::AlertStore;

const OPEN_STATUSES: [&str; 2] = ["pending", "acknowledged"];

/// Retry bound for the evidence-attach compare-and-set. Each lost round
/// means another append committed, so contention this deep is pathological.
const ATTACH_RETRIES: usize = 8;

/// Inputs for materializing a new alert from a satisfied rule.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub patient_id: String,
    pub rule_id: String,
    pub observation_id: String,
    /// Copied from the rule at creation time; later rule edits must not
    /// retroactively alter open alerts.
    pub severity: Severity,
    pub triggered_at: chrono::DateTime<Utc>,
    /// Evaluation inputs (observation value, window data) for audit.
    pub evidence: serde_json::Value,
}

/// Result of the deduplicating create: either a fresh PENDING alert, or
/// the already-open alert the new observation was attached to.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Alert),
    Suppressed(Alert),
}

impl CreateOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            CreateOutcome::Created(a) | CreateOutcome::Suppressed(a) => a,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

fn to_alert(m: alert::Model) -> Result<Alert> {
    let severity: Severity = m.severity.parse().map_err(|_| StorageError::Corrupt {
        column: "severity",
        value: m.severity.clone(),
    })?;
    let status: AlertStatus = m.status.parse().map_err(|_| StorageError::Corrupt {
        column: "status",
        value: m.status.clone(),
    })?;
    let metadata =
        serde_json::from_str(&m.metadata_json).unwrap_or_else(|_| serde_json::json!({}));
    Ok(Alert {
        id: m.id,
        patient_id: m.patient_id,
        rule_id: m.rule_id,
        observation_id: m.observation_id,
        severity,
        status,
        triggered_at: m.triggered_at.with_timezone(&Utc),
        claimed_by: m.claimed_by,
        claimed_at: m.claimed_at.map(|t| t.with_timezone(&Utc)),
        acknowledged_at: m.acknowledged_at.map(|t| t.with_timezone(&Utc)),
        resolved_by: m.resolved_by,
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        resolution_note: m.resolution_note,
        time_spent_minutes: m.time_spent_minutes,
        cancelled_by: m.cancelled_by,
        cancelled_at: m.cancelled_at.map(|t| t.with_timezone(&Utc)),
        cancel_reason: m.cancel_reason,
        metadata,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

impl AlertStore {
    /// Get a single alert by ID.
    pub async fn get_alert(&self, alert_id: &str) -> Result<Alert> {
        let model = Entity::find_by_id(alert_id)
            .one(self.db())
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity: "alert",
                id: alert_id.to_string(),
            })?;
        to_alert(model)
    }

    /// The open (PENDING or ACKNOWLEDGED) alert for a (patient, rule)
    /// pair, if one exists. At most one can exist by the unique index.
    pub async fn get_open_alert(&self, patient_id: &str, rule_id: &str) -> Result<Option<Alert>> {
        let model = Entity::find()
            .filter(Column::PatientId.eq(patient_id))
            .filter(Column::RuleId.eq(rule_id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .one(self.db())
            .await?;
        model.map(to_alert).transpose()
    }

    /// Open alerts for the operator queue, most recent first.
    pub async fn list_open_alerts(
        &self,
        patient_id: Option<&str>,
        severity: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Alert>> {
        let mut q = Entity::find().filter(Column::Status.is_in(OPEN_STATUSES));
        if let Some(pid) = patient_id {
            q = q.filter(Column::PatientId.eq(pid));
        }
        if let Some(sev) = severity {
            q = q.filter(Column::Severity.eq(sev));
        }
        let rows = q
            .order_by(Column::TriggeredAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_alert).collect()
    }

    /// Create a PENDING alert, or attach the observation as supporting
    /// evidence to the already-open alert for the same (patient, rule).
    ///
    /// The fast-path lookup only avoids a doomed insert; the partial
    /// unique index is what actually prevents two racing observations
    /// from both creating alerts.
    pub async fn create_or_attach(&self, new: NewAlert) -> Result<CreateOutcome> {
        if let Some(open) = self.get_open_alert(&new.patient_id, &new.rule_id).await? {
            let updated = self.attach_evidence(&open.id, &new.evidence).await?;
            return Ok(CreateOutcome::Suppressed(updated));
        }

        let now = Utc::now().fixed_offset();
        let metadata = serde_json::json!({
            "trigger": new.evidence,
            "supporting_observations": [],
        });
        let am = alert::ActiveModel {
            id: Set(carewatch_common::id::next_id()),
            patient_id: Set(new.patient_id.clone()),
            rule_id: Set(new.rule_id.clone()),
            observation_id: Set(new.observation_id.clone()),
            severity: Set(new.severity.to_string()),
            status: Set(AlertStatus::Pending.to_string()),
            triggered_at: Set(new.triggered_at.fixed_offset()),
            claimed_by: Set(None),
            claimed_at: Set(None),
            acknowledged_at: Set(None),
            resolved_by: Set(None),
            resolved_at: Set(None),
            resolution_note: Set(None),
            time_spent_minutes: Set(None),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            metadata_json: Set(metadata.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match am.insert(self.db()).await {
            Ok(model) => Ok(CreateOutcome::Created(to_alert(model)?)),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Lost the dedup race; the winner's alert represents the
                // ongoing condition.
                tracing::debug!(
                    patient_id = %new.patient_id,
                    rule_id = %new.rule_id,
                    "Alert creation suppressed by unique index, attaching evidence"
                );
                let open = self
                    .get_open_alert(&new.patient_id, &new.rule_id)
                    .await?
                    .ok_or_else(|| StorageError::DedupReadback {
                        patient_id: new.patient_id.clone(),
                        rule_id: new.rule_id.clone(),
                    })?;
                let updated = self.attach_evidence(&open.id, &new.evidence).await?;
                Ok(CreateOutcome::Suppressed(updated))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append an observation's evaluation context to an alert's metadata.
    ///
    /// Compare-and-set on the metadata itself: two racing suppressed
    /// observations must both end up in `supporting_observations`, so the
    /// write only lands if the metadata is still what was read. A lost
    /// race means the other append committed; re-read and retry.
    async fn attach_evidence(
        &self,
        alert_id: &str,
        evidence: &serde_json::Value,
    ) -> Result<Alert> {
        for _ in 0..ATTACH_RETRIES {
            let model = Entity::find_by_id(alert_id)
                .one(self.db())
                .await?
                .ok_or_else(|| StorageError::NotFound {
                    entity: "alert",
                    id: alert_id.to_string(),
                })?;
            let seen = model.metadata_json.clone();

            let mut meta: serde_json::Value =
                serde_json::from_str(&seen).unwrap_or_else(|_| serde_json::json!({}));
            if !meta.is_object() {
                meta = serde_json::json!({});
            }
            if let Some(obj) = meta.as_object_mut() {
                let list = obj
                    .entry("supporting_observations")
                    .or_insert_with(|| serde_json::Value::Array(Vec::new()));
                match list.as_array_mut() {
                    Some(arr) => arr.push(evidence.clone()),
                    None => *list = serde_json::Value::Array(vec![evidence.clone()]),
                }
            }

            let res = Entity::update_many()
                .col_expr(Column::MetadataJson, Expr::value(meta.to_string()))
                .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
                .filter(Column::Id.eq(alert_id))
                .filter(Column::MetadataJson.eq(seen))
                .exec(self.db())
                .await?;
            if res.rows_affected == 1 {
                return self.get_alert(alert_id).await;
            }
        }
        Err(StorageError::Conflict {
            alert_id: alert_id.to_string(),
            reason: "evidence attachment kept losing to concurrent updates".to_string(),
        })
    }

    /// Claim an unclaimed open alert for `actor`.
    ///
    /// Compare-and-set: the claim is written only where `claimed_by` is
    /// still null, re-checked here regardless of what the caller's view
    /// showed. Exactly one of two simultaneous claims succeeds.
    pub async fn claim(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::ClaimedBy, Expr::value(actor))
            .col_expr(Column::ClaimedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::ClaimedBy.is_null())
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .exec(self.db())
            .await?;

        if res.rows_affected == 0 {
            return Err(self.diagnose_claim(alert_id).await?);
        }
        self.get_alert(alert_id).await
    }

    /// Move a PENDING alert claimed by `actor` to ACKNOWLEDGED.
    pub async fn acknowledge(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Acknowledged.to_string()))
            .col_expr(Column::AcknowledgedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::Status.eq(AlertStatus::Pending.to_string()))
            .filter(Column::ClaimedBy.eq(actor))
            .exec(self.db())
            .await?;

        if res.rows_affected == 0 {
            return Err(self.diagnose_owned(alert_id, actor, "acknowledge").await?);
        }
        self.get_alert(alert_id).await
    }

    /// Resolve an alert claimed by `actor`.
    ///
    /// Permitted from ACKNOWLEDGED, and from PENDING when claimed (the
    /// explicit acknowledge step may be skipped by the claim holder).
    pub async fn resolve(
        &self,
        alert_id: &str,
        actor: &str,
        resolution_note: &str,
        time_spent_minutes: Option<i64>,
    ) -> Result<Alert> {
        if resolution_note.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "resolution note must not be empty".to_string(),
            ));
        }

        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Resolved.to_string()))
            .col_expr(Column::ResolvedBy, Expr::value(actor))
            .col_expr(Column::ResolvedAt, Expr::value(now))
            .col_expr(Column::ResolutionNote, Expr::value(resolution_note))
            .col_expr(Column::TimeSpentMinutes, Expr::value(time_spent_minutes))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .filter(Column::ClaimedBy.eq(actor))
            .exec(self.db())
            .await?;

        if res.rows_affected == 0 {
            return Err(self.diagnose_owned(alert_id, actor, "resolve").await?);
        }
        self.get_alert(alert_id).await
    }

    /// Release the claim without advancing status (e.g. end of shift).
    pub async fn unclaim(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::ClaimedBy, Expr::value(Option::<String>::None))
            .col_expr(Column::ClaimedAt, Expr::value(Option::<chrono::DateTime<chrono::FixedOffset>>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .filter(Column::ClaimedBy.eq(actor))
            .exec(self.db())
            .await?;

        if res.rows_affected == 0 {
            return Err(self.diagnose_owned(alert_id, actor, "unclaim").await?);
        }
        self.get_alert(alert_id).await
    }

    /// Administrative cancellation of an open alert; no claim required.
    pub async fn cancel(&self, alert_id: &str, actor: &str, reason: &str) -> Result<Alert> {
        let now = Utc::now().fixed_offset();
        let res = Entity::update_many()
            .col_expr(Column::Status, Expr::value(AlertStatus::Cancelled.to_string()))
            .col_expr(Column::CancelledBy, Expr::value(actor))
            .col_expr(Column::CancelledAt, Expr::value(now))
            .col_expr(Column::CancelReason, Expr::value(reason))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(alert_id))
            .filter(Column::Status.is_in(OPEN_STATUSES))
            .exec(self.db())
            .await?;

        if res.rows_affected == 0 {
            let current = self.get_alert(alert_id).await?;
            return Err(StorageError::Conflict {
                alert_id: alert_id.to_string(),
                reason: format!("alert is already {}", current.status),
            });
        }
        self.get_alert(alert_id).await
    }

    /// Explain a failed claim with the current row state.
    async fn diagnose_claim(&self, alert_id: &str) -> Result<StorageError> {
        let current = self.get_alert(alert_id).await?;
        if let Some(claimed_by) = current.claimed_by {
            return Ok(StorageError::AlreadyClaimed {
                alert_id: alert_id.to_string(),
                claimed_by,
            });
        }
        if !current.status.is_open() {
            return Ok(StorageError::Conflict {
                alert_id: alert_id.to_string(),
                reason: format!("alert is {}", current.status),
            });
        }
        Ok(StorageError::Conflict {
            alert_id: alert_id.to_string(),
            reason: "lost a concurrent update, retry with fresh state".to_string(),
        })
    }

    /// Explain a failed claimant-guarded transition.
    async fn diagnose_owned(
        &self,
        alert_id: &str,
        actor: &str,
        transition: &str,
    ) -> Result<StorageError> {
        let current = self.get_alert(alert_id).await?;
        let reason = match current.claimed_by.as_deref() {
            _ if !current.status.is_open() => format!("alert is {}", current.status),
            None => format!("{transition} requires holding the claim"),
            Some(other) if other != actor => format!("claim is held by {other}"),
            Some(_) => format!("{transition} not valid from status {}", current.status),
        };
        Ok(StorageError::Conflict {
            alert_id: alert_id.to_string(),
            reason,
        })
    }
}
