use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use carewatch_alert::evaluator::ConditionEvaluator;
use carewatch_alert::{MetricHistory, RuleCatalog, RuleMatch, UpstreamError};
use carewatch_common::types::{Alert, Observation};
use carewatch_storage::{AlertStore, CreateOutcome, NewAlert};
use carewatch_tasks::{FollowUpTask, TaskLinkage};

use crate::config::RetryConfig;
use crate::error::{Result, ServiceError};

/// Ceiling on exponential backoff growth; with the default 200ms base this
/// caps the delay near two minutes.
const MAX_BACKOFF_DOUBLINGS: u32 = 9;

/// The alerting core: evaluates observations, materializes deduplicated
/// alerts, drives their lifecycle, and spawns follow-up tasks.
///
/// Safe to share across ingestion workers behind an `Arc`.
pub struct AlertService {
    evaluator: ConditionEvaluator,
    store: Arc<AlertStore>,
    tasks: TaskLinkage,
    retry: RetryConfig,
    /// Observations whose evaluation exhausted retries; drained by a
    /// periodic re-evaluation pass.
    retry_queue: Mutex<VecDeque<Observation>>,
}

impl AlertService {
    pub fn new(
        catalog: Arc<dyn RuleCatalog>,
        history: Arc<dyn MetricHistory>,
        store: Arc<AlertStore>,
        tasks: TaskLinkage,
        retry: RetryConfig,
    ) -> Self {
        Self {
            evaluator: ConditionEvaluator::new(catalog, history),
            store,
            tasks,
            retry,
            retry_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Evaluate one observation and materialize an alert per satisfied
    /// rule, suppressing duplicates for conditions already alerted on.
    ///
    /// Upstream failures are retried with exponential backoff; if the
    /// collaborator stays down, the observation is queued for later
    /// re-evaluation and the error is returned. Alert creation itself is
    /// not retried here: the store's dedup guarantees make replaying the
    /// whole evaluation safe instead.
    pub async fn evaluate(&self, observation: &Observation) -> Result<Vec<CreateOutcome>> {
        let matches = self.evaluate_with_retry(observation).await?;
        self.materialize(observation, matches).await
    }

    async fn evaluate_with_retry(&self, observation: &Observation) -> Result<Vec<RuleMatch>> {
        let mut attempt = 0u32;
        loop {
            match self.evaluator.evaluate(observation).await {
                Ok(matches) => return Ok(matches),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        tracing::error!(
                            observation_id = %observation.id,
                            patient_id = %observation.patient_id,
                            attempts = attempt,
                            error = %e,
                            "Evaluation failed, queueing observation for re-evaluation"
                        );
                        self.enqueue_for_retry(observation.clone());
                        return Err(ServiceError::UpstreamUnavailable {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    // Doubling saturates rather than overflowing the shift
                    // when a caller configures a very high attempt count.
                    let delay = self
                        .retry
                        .base_delay_ms
                        .saturating_mul(1u64 << (attempt - 1).min(MAX_BACKOFF_DOUBLINGS));
                    tracing::warn!(
                        observation_id = %observation.id,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Evaluation upstream failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    async fn materialize(
        &self,
        observation: &Observation,
        matches: Vec<RuleMatch>,
    ) -> Result<Vec<CreateOutcome>> {
        let mut outcomes = Vec::with_capacity(matches.len());
        for m in matches {
            let outcome = self
                .store
                .create_or_attach(NewAlert {
                    patient_id: observation.patient_id.clone(),
                    rule_id: m.rule.id.clone(),
                    observation_id: observation.id.clone(),
                    severity: m.rule.severity,
                    triggered_at: Utc::now(),
                    evidence: m.context.to_metadata(),
                })
                .await?;

            match &outcome {
                CreateOutcome::Created(alert) => {
                    tracing::info!(
                        alert_id = %alert.id,
                        patient_id = %alert.patient_id,
                        rule_id = %alert.rule_id,
                        severity = %alert.severity,
                        "Alert created"
                    );
                    if m.rule.spawn_task && self.tasks.is_enabled() {
                        self.tasks.dispatch(FollowUpTask {
                            alert_id: alert.id.clone(),
                            patient_id: alert.patient_id.clone(),
                            rule_id: alert.rule_id.clone(),
                            severity: alert.severity,
                            summary: format!(
                                "{} alert for patient {}: {}",
                                alert.severity, alert.patient_id, m.rule.name
                            ),
                            triggered_at: alert.triggered_at,
                        });
                    }
                }
                CreateOutcome::Suppressed(alert) => {
                    tracing::debug!(
                        alert_id = %alert.id,
                        observation_id = %observation.id,
                        "Duplicate alert suppressed, evidence attached"
                    );
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn enqueue_for_retry(&self, observation: Observation) {
        if let Ok(mut q) = self.retry_queue.lock() {
            q.push_back(observation);
        }
    }

    /// Number of observations waiting for re-evaluation.
    pub fn queued_for_reevaluation(&self) -> usize {
        self.retry_queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Re-evaluate every queued observation. Failures re-queue; duplicate
    /// alerts from replays are absorbed by dedup.
    pub async fn drain_retry_queue(&self) -> usize {
        let pending: Vec<Observation> = match self.retry_queue.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => return 0,
        };

        let mut processed = 0;
        for observation in pending {
            match self.evaluate(&observation).await {
                Ok(_) => processed += 1,
                Err(e) => {
                    // evaluate() already re-queued it on upstream failure.
                    tracing::warn!(
                        observation_id = %observation.id,
                        error = %e,
                        "Re-evaluation failed"
                    );
                }
            }
        }
        processed
    }

    // Lifecycle transitions delegate to the store's compare-and-set
    // updates; conflicts surface as `ServiceError::Conflict`.

    pub async fn claim(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        Ok(self.store.claim(alert_id, actor).await?)
    }

    pub async fn acknowledge(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        Ok(self.store.acknowledge(alert_id, actor).await?)
    }

    pub async fn resolve(
        &self,
        alert_id: &str,
        actor: &str,
        resolution_note: &str,
        time_spent_minutes: Option<i64>,
    ) -> Result<Alert> {
        Ok(self
            .store
            .resolve(alert_id, actor, resolution_note, time_spent_minutes)
            .await?)
    }

    pub async fn unclaim(&self, alert_id: &str, actor: &str) -> Result<Alert> {
        Ok(self.store.unclaim(alert_id, actor).await?)
    }

    pub async fn cancel(&self, alert_id: &str, actor: &str, reason: &str) -> Result<Alert> {
        Ok(self.store.cancel(alert_id, actor, reason).await?)
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Alert> {
        Ok(self.store.get_alert(alert_id).await?)
    }

    pub async fn list_open_alerts(
        &self,
        patient_id: Option<&str>,
        severity: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Alert>> {
        Ok(self
            .store
            .list_open_alerts(patient_id, severity, limit, offset)
            .await?)
    }
}
