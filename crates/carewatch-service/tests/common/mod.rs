#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use carewatch_alert::condition::{CompareOp, RuleCondition};
use carewatch_alert::{AlertRule, MetricHistory, RuleCatalog, UpstreamError};
use carewatch_common::types::{Observation, ObservationSource, ObservationValue, Severity};
use carewatch_storage::AlertStore;
use carewatch_tasks::error::Result as TaskResult;
use carewatch_tasks::{FollowUpTask, TaskSink};

pub struct StaticCatalog {
    pub rules: Vec<AlertRule>,
}

#[async_trait]
impl RuleCatalog for StaticCatalog {
    async fn applicable_rules(&self, _patient_id: &str) -> Result<Vec<AlertRule>, UpstreamError> {
        Ok(self.rules.clone())
    }
}

/// Fails the first `failures` lookups, then serves the rules. Models a
/// catalog outage that recovers.
pub struct FlakyCatalog {
    pub rules: Vec<AlertRule>,
    failures_remaining: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new(rules: Vec<AlertRule>, failures: usize) -> Self {
        Self {
            rules,
            failures_remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl RuleCatalog for FlakyCatalog {
    async fn applicable_rules(&self, _patient_id: &str) -> Result<Vec<AlertRule>, UpstreamError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(UpstreamError::Unavailable {
                collaborator: "rule catalog",
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.rules.clone())
    }
}

pub struct VecHistory {
    pub observations: Vec<Observation>,
}

#[async_trait]
impl MetricHistory for VecHistory {
    async fn observations(
        &self,
        patient_id: &str,
        metric_key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UpstreamError> {
        let mut out: Vec<Observation> = self
            .observations
            .iter()
            .filter(|o| {
                o.patient_id == patient_id
                    && o.metric_key == metric_key
                    && o.recorded_at >= from
                    && o.recorded_at < to
            })
            .cloned()
            .collect();
        out.sort_by_key(|o| o.recorded_at);
        Ok(out)
    }
}

/// Captures dispatched tasks for assertions.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<FollowUpTask>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FollowUpTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl TaskSink for RecordingSink {
    async fn create_task(&self, task: &FollowUpTask) -> TaskResult<()> {
        let _ = self.tx.send(task.clone());
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "recording"
    }
}

pub fn make_obs(patient_id: &str, metric_key: &str, value: f64) -> Observation {
    let now = Utc::now();
    Observation {
        id: carewatch_common::id::next_id(),
        patient_id: patient_id.to_string(),
        metric_key: metric_key.to_string(),
        value: ObservationValue::Numeric(value),
        unit: None,
        recorded_at: now,
        ingested_at: now,
        source: ObservationSource::Device,
    }
}

pub fn threshold_rule(id: &str, metric_key: &str, op: CompareOp, value: f64) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        name: format!("{metric_key} threshold"),
        metric_key: metric_key.to_string(),
        condition: RuleCondition::Threshold { op, value },
        unit: None,
        severity: Severity::High,
        priority: 0,
        consecutive: None,
        active: true,
        spawn_task: false,
    }
}

/// A store backed by a throwaway sqlite file. The `TempDir` must stay
/// alive for the store's lifetime.
pub async fn setup_store() -> (tempfile::TempDir, Arc<AlertStore>) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("alerts.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let store = AlertStore::connect(&url).await.unwrap();
    (dir, Arc::new(store))
}
