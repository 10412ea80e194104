//! Condition evaluation engine for patient metric observations.
//!
//! An incoming [`Observation`](carewatch_common::types::Observation) is
//! checked against the patient's active [`AlertRule`]s. Instant rules are a
//! single typed comparison; consecutive-occurrence rules bucket the trailing
//! history window into calendar days and require the condition to hold on a
//! minimum number of them. Satisfied rules are returned most severe first.

pub mod condition;
pub mod evaluator;
pub mod window;


use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use carewatch_common::types::{Observation, ObservationValue, Severity};
use condition::RuleCondition;

/// Requirement that a condition holds on at least `min_days` of the
/// trailing `window_days` calendar days (observation day inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsecutiveSpec {
    pub window_days: u32,
    pub min_days: u32,
    /// When set, the qualifying days must form an unbroken run ending on
    /// the day of the triggering observation.
    #[serde(default)]
    pub require_adjacent: bool,
}

/// A configured alert rule, consumed read-only from the rule catalog.
///
/// Built and validated by the rule builder; malformed configurations are
/// rejected at load time so evaluation never has to re-check field shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric_key: String,
    pub condition: RuleCondition,
    pub unit: Option<String>,
    pub severity: Severity,
    /// Tie-break ordinal within a severity band; lower is more urgent.
    pub priority: i32,
    pub consecutive: Option<ConsecutiveSpec>,
    pub active: bool,
    /// Whether alert creation should spawn a follow-up task.
    pub spawn_task: bool,
}

/// Failure reaching an external collaborator (rule catalog or metric
/// history reader). Retried by the caller; never swallowed.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream: {collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Upstream: {collaborator} timed out after {timeout_ms}ms")]
    Timeout {
        collaborator: &'static str,
        timeout_ms: u64,
    },
}

/// Read-only view of the rules applicable to a patient, derived from the
/// patient's active condition enrollments. Owned externally.
#[async_trait]
pub trait RuleCatalog: Send + Sync {
    async fn applicable_rules(&self, patient_id: &str) -> Result<Vec<AlertRule>, UpstreamError>;
}

/// Queryable time-series of past observations per patient and metric.
/// Owned externally.
#[async_trait]
pub trait MetricHistory: Send + Sync {
    /// Observations in `[from, to)`, ordered by `recorded_at` ascending.
    async fn observations(
        &self,
        patient_id: &str,
        metric_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UpstreamError>;
}

/// Inputs that justified a rule firing, captured for alert audit metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub observation_id: String,
    pub observed: ObservationValue,
    /// Previous numeric reading, for relative-comparison rules.
    pub previous: Option<f64>,
    /// Calendar days that qualified, for consecutive-occurrence rules.
    pub qualifying_days: Option<Vec<NaiveDate>>,
}

impl EvaluationContext {
    pub fn instant(observation: &Observation) -> Self {
        Self {
            observation_id: observation.id.clone(),
            observed: observation.value.clone(),
            previous: None,
            qualifying_days: None,
        }
    }

    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "observation_id": self.observation_id,
            "observed": self.observed,
            "previous": self.previous,
            "qualifying_days": self.qualifying_days,
        })
    }
}

/// A satisfied rule paired with the evidence that satisfied it.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: AlertRule,
    pub context: EvaluationContext,
}
