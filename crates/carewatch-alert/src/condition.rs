use serde::{Deserialize, Serialize};
use std::str::FromStr;

use carewatch_common::types::ObservationValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Equal,
    NotEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | "gt" => Ok(Self::GreaterThan),
            "greater_equal" | "gte" => Ok(Self::GreaterEqual),
            "less_than" | "lt" => Ok(Self::LessThan),
            "less_equal" | "lte" => Ok(Self::LessEqual),
            "equal" | "eq" => Ok(Self::Equal),
            "not_equal" | "neq" => Ok(Self::NotEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, "greater_than"),
            Self::GreaterEqual => write!(f, "greater_equal"),
            Self::LessThan => write!(f, "less_than"),
            Self::LessEqual => write!(f, "less_equal"),
            Self::Equal => write!(f, "equal"),
            Self::NotEqual => write!(f, "not_equal"),
        }
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
            Self::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// How a relative comparison measures the delta against the previous reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaBasis {
    Absolute,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increase,
    Decrease,
}

/// A rule condition, one closed variant per operator kind.
///
/// Each variant carries only the fields it needs; malformed combinations
/// are rejected when the rule is built, not during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Numeric comparison against a fixed threshold.
    Threshold { op: CompareOp, value: f64 },
    /// Coded value set-membership. Coded equality is a single-element set;
    /// `negate` turns it into not-in (coded inequality).
    Membership {
        values: Vec<String>,
        #[serde(default)]
        negate: bool,
    },
    /// Delta against the immediately preceding reading.
    Relative {
        direction: TrendDirection,
        basis: DeltaBasis,
        threshold: f64,
    },
}

/// The observation's value type does not match what the condition needs.
/// A configuration defect: the rule is skipped and logged, never fatal.
#[derive(Debug, thiserror::Error)]
#[error("rule expects a {expected} value but observation is {got}")]
pub struct TypeMismatch {
    pub expected: &'static str,
    pub got: &'static str,
}

impl RuleCondition {
    /// Whether evaluation needs the preceding observation.
    pub fn needs_previous(&self) -> bool {
        matches!(self, RuleCondition::Relative { .. })
    }

    /// Evaluate this condition against a single observation value.
    ///
    /// `previous` is the preceding numeric reading, only consulted by
    /// `Relative`; a relative rule with no prior reading is not satisfied
    /// (not an error).
    pub fn satisfied_by(
        &self,
        value: &ObservationValue,
        previous: Option<f64>,
    ) -> Result<bool, TypeMismatch> {
        match self {
            RuleCondition::Threshold { op, value: threshold } => {
                let v = value.as_numeric().ok_or(TypeMismatch {
                    expected: "numeric",
                    got: value.kind(),
                })?;
                Ok(op.check(v, *threshold))
            }
            RuleCondition::Membership { values, negate } => {
                let code = value.as_coded().ok_or(TypeMismatch {
                    expected: "coded",
                    got: value.kind(),
                })?;
                let member = values.iter().any(|v| v == code);
                Ok(member != *negate)
            }
            RuleCondition::Relative {
                direction,
                basis,
                threshold,
            } => {
                let v = value.as_numeric().ok_or(TypeMismatch {
                    expected: "numeric",
                    got: value.kind(),
                })?;
                let Some(prev) = previous else {
                    return Ok(false);
                };
                let delta = match basis {
                    DeltaBasis::Absolute => v - prev,
                    DeltaBasis::Percent => {
                        if prev.abs() < f64::EPSILON {
                            return Ok(false);
                        }
                        (v - prev) / prev * 100.0
                    }
                };
                let signed = match direction {
                    TrendDirection::Increase => delta,
                    TrendDirection::Decrease => -delta,
                };
                Ok(signed > *threshold)
            }
        }
    }
}
