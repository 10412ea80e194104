//! Builds typed [`AlertRule`]s from stored rule-configuration rows.
//!
//! Rule definitions live in an external catalog as rows with a `rule_type`
//! discriminator and a JSON config blob. Everything shape-related is
//! validated here, once, so the evaluator can trust its inputs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use carewatch_alert::condition::{CompareOp, DeltaBasis, RuleCondition, TrendDirection};
use carewatch_alert::{AlertRule, ConsecutiveSpec};
use carewatch_common::types::Severity;

/// A raw rule row as stored in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfigRow {
    pub id: String,
    pub name: String,
    pub rule_type: String,
    pub metric_key: String,
    pub severity: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub spawn_task: bool,
    pub config_json: String,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ThresholdConfig {
    operator: String,
    value: f64,
    #[serde(default)]
    consecutive: Option<ConsecutiveConfig>,
}

#[derive(Debug, Deserialize)]
struct MembershipConfig {
    values: Vec<String>,
    #[serde(default)]
    negate: bool,
    #[serde(default)]
    consecutive: Option<ConsecutiveConfig>,
}

#[derive(Debug, Deserialize)]
struct RelativeConfig {
    direction: String,
    #[serde(default = "default_basis")]
    basis: String,
    threshold: f64,
}

fn default_basis() -> String {
    "absolute".to_string()
}

#[derive(Debug, Deserialize)]
struct ConsecutiveConfig {
    window_days: u32,
    min_days: u32,
    #[serde(default)]
    require_adjacent: bool,
}

impl ConsecutiveConfig {
    fn into_spec(self) -> Result<ConsecutiveSpec> {
        if self.min_days == 0 {
            bail!("consecutive min_days must be at least 1");
        }
        if self.min_days > self.window_days {
            bail!(
                "consecutive min_days {} exceeds window_days {}",
                self.min_days,
                self.window_days
            );
        }
        Ok(ConsecutiveSpec {
            window_days: self.window_days,
            min_days: self.min_days,
            require_adjacent: self.require_adjacent,
        })
    }
}

/// Build one typed rule from a catalog row, rejecting malformed configs.
pub fn build_rule(row: &RuleConfigRow) -> Result<AlertRule> {
    // A typo'd severity must not quietly become the least urgent band.
    let severity: Severity = row
        .severity
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let (condition, consecutive) = match row.rule_type.as_str() {
        "threshold" => {
            let cfg: ThresholdConfig =
                serde_json::from_str(&row.config_json).context("invalid threshold config")?;
            let op: CompareOp = cfg
                .operator
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let consecutive = cfg.consecutive.map(|c| c.into_spec()).transpose()?;
            (
                RuleCondition::Threshold {
                    op,
                    value: cfg.value,
                },
                consecutive,
            )
        }
        "membership" => {
            let cfg: MembershipConfig =
                serde_json::from_str(&row.config_json).context("invalid membership config")?;
            if cfg.values.is_empty() {
                bail!("membership rule needs at least one value");
            }
            let consecutive = cfg.consecutive.map(|c| c.into_spec()).transpose()?;
            (
                RuleCondition::Membership {
                    values: cfg.values,
                    negate: cfg.negate,
                },
                consecutive,
            )
        }
        "relative" => {
            let cfg: RelativeConfig =
                serde_json::from_str(&row.config_json).context("invalid relative config")?;
            let direction = match cfg.direction.as_str() {
                "increase" => TrendDirection::Increase,
                "decrease" => TrendDirection::Decrease,
                other => bail!("unknown trend direction: {other}"),
            };
            let basis = match cfg.basis.as_str() {
                "absolute" => DeltaBasis::Absolute,
                "percent" => DeltaBasis::Percent,
                other => bail!("unknown delta basis: {other}"),
            };
            (
                RuleCondition::Relative {
                    direction,
                    basis,
                    threshold: cfg.threshold,
                },
                None,
            )
        }
        other => bail!("unknown rule type: {other}"),
    };

    Ok(AlertRule {
        id: row.id.clone(),
        name: row.name.clone(),
        metric_key: row.metric_key.clone(),
        condition,
        unit: row.unit.clone(),
        severity,
        priority: row.priority,
        consecutive,
        active: row.active,
        spawn_task: row.spawn_task,
    })
}

/// Build all rules from a batch of rows, skipping (and logging) the
/// malformed ones so one bad config cannot take the catalog down.
pub fn build_rules(rows: &[RuleConfigRow]) -> Vec<AlertRule> {
    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        match build_rule(row) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(
                    rule_id = %row.id,
                    rule_name = %row.name,
                    rule_type = %row.rule_type,
                    error = %e,
                    "Skipping invalid alert rule"
                );
            }
        }
    }
    rules
}
