use chrono::{Duration, NaiveTime};
use std::sync::Arc;
use tracing;

use carewatch_common::types::{resolve_duplicates, Observation};

use crate::condition::RuleCondition;
use crate::window::{qualify_window, DayBuckets};
use crate::{AlertRule, EvaluationContext, MetricHistory, RuleCatalog, RuleMatch, UpstreamError};

/// How far back to look for the "immediately preceding" reading of a
/// relative-comparison rule.
const RELATIVE_LOOKBACK_DAYS: i64 = 30;

/// Evaluates incoming observations against the patient's applicable rules.
///
/// Collaborators are injected; the evaluator holds no global state and is
/// safe to share across ingestion workers.
pub struct ConditionEvaluator {
    catalog: Arc<dyn RuleCatalog>,
    history: Arc<dyn MetricHistory>,
}

impl ConditionEvaluator {
    pub fn new(catalog: Arc<dyn RuleCatalog>, history: Arc<dyn MetricHistory>) -> Self {
        Self { catalog, history }
    }

    /// Determine which of the patient's rules the observation satisfies.
    ///
    /// Returns matches ordered by severity descending, then priority rank
    /// ascending, so downstream sees the most urgent rule first. A
    /// type-incompatible rule is skipped and logged as a configuration
    /// defect; it never blocks evaluation of the others. Upstream failures
    /// propagate for the caller to retry.
    pub async fn evaluate(&self, observation: &Observation) -> Result<Vec<RuleMatch>, UpstreamError> {
        let rules = self.catalog.applicable_rules(&observation.patient_id).await?;

        let mut matches = Vec::new();
        for rule in rules {
            if !rule.active || rule.metric_key != observation.metric_key {
                continue;
            }
            if let Some(context) = self.evaluate_rule(&rule, observation).await? {
                matches.push(RuleMatch { rule, context });
            }
        }

        matches.sort_by(|a, b| {
            b.rule
                .severity
                .cmp(&a.rule.severity)
                .then_with(|| a.rule.priority.cmp(&b.rule.priority))
        });
        Ok(matches)
    }

    async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        observation: &Observation,
    ) -> Result<Option<EvaluationContext>, UpstreamError> {
        match &rule.consecutive {
            Some(spec) => self.evaluate_windowed(rule, spec, observation).await,
            None => self.evaluate_instant(rule, observation).await,
        }
    }

    async fn evaluate_instant(
        &self,
        rule: &AlertRule,
        observation: &Observation,
    ) -> Result<Option<EvaluationContext>, UpstreamError> {
        let previous = if rule.condition.needs_previous() {
            self.previous_reading(observation).await?
        } else {
            None
        };

        match rule.condition.satisfied_by(&observation.value, previous) {
            Ok(true) => {
                let mut context = EvaluationContext::instant(observation);
                context.previous = previous;
                Ok(Some(context))
            }
            Ok(false) => Ok(None),
            Err(mismatch) => {
                tracing::warn!(
                    rule_id = %rule.id,
                    rule_name = %rule.name,
                    metric_key = %rule.metric_key,
                    error = %mismatch,
                    "Skipping type-incompatible alert rule"
                );
                Ok(None)
            }
        }
    }

    async fn evaluate_windowed(
        &self,
        rule: &AlertRule,
        spec: &crate::ConsecutiveSpec,
        observation: &Observation,
    ) -> Result<Option<EvaluationContext>, UpstreamError> {
        // A relative condition has no meaning per calendar day; reject the
        // combination here in case a catalog hands one through.
        if matches!(rule.condition, RuleCondition::Relative { .. }) {
            tracing::warn!(
                rule_id = %rule.id,
                rule_name = %rule.name,
                "Skipping alert rule: relative comparison cannot be windowed"
            );
            return Ok(None);
        }

        let end_day = observation.recorded_at.date_naive();
        let start_day = end_day - chrono::Days::new(u64::from(spec.window_days.saturating_sub(1)));
        let from = start_day.and_time(NaiveTime::MIN).and_utc();
        let to = (end_day + chrono::Days::new(1))
            .and_time(NaiveTime::MIN)
            .and_utc();

        let mut window = self
            .history
            .observations(&observation.patient_id, &observation.metric_key, from, to)
            .await?;
        // The triggering observation counts toward its own day even when
        // the history reader has not seen it yet.
        if !window.iter().any(|o| o.id == observation.id) {
            window.push(observation.clone());
        }

        // Surface a type mismatch once per evaluation rather than silently
        // disqualifying every day.
        if let Err(mismatch) = rule.condition.satisfied_by(&observation.value, None) {
            tracing::warn!(
                rule_id = %rule.id,
                rule_name = %rule.name,
                metric_key = %rule.metric_key,
                error = %mismatch,
                "Skipping type-incompatible alert rule"
            );
            return Ok(None);
        }

        let buckets = DayBuckets::build(window);
        let condition = &rule.condition;
        let pred = |value: &carewatch_common::types::ObservationValue| {
            condition.satisfied_by(value, None).unwrap_or(false)
        };

        match qualify_window(spec, &buckets, end_day, &pred) {
            Some(qualifying_days) => {
                let mut context = EvaluationContext::instant(observation);
                context.qualifying_days = Some(qualifying_days);
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    /// The reading immediately preceding `observation`, if any exists in
    /// the lookback window. Non-numeric history counts as no prior reading.
    async fn previous_reading(
        &self,
        observation: &Observation,
    ) -> Result<Option<f64>, UpstreamError> {
        let from = observation.recorded_at - Duration::days(RELATIVE_LOOKBACK_DAYS);
        let history = self
            .history
            .observations(
                &observation.patient_id,
                &observation.metric_key,
                from,
                observation.recorded_at,
            )
            .await?;

        let mut history: Vec<Observation> = history
            .into_iter()
            .filter(|o| o.recorded_at < observation.recorded_at)
            .collect();
        history.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.ingested_at.cmp(&b.ingested_at))
        });
        let history = resolve_duplicates(history);

        Ok(history.last().and_then(|o| o.value.as_numeric()))
    }
}
