use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clinical alert severity, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use carewatch_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Alert lifecycle status.
///
/// `Pending` and `Acknowledged` are "open" states; `Resolved` and
/// `Cancelled` are terminal. Status never regresses.
///
/// # Examples
///
/// ```
/// use carewatch_common::types::AlertStatus;
///
/// let status: AlertStatus = "acknowledged".parse().unwrap();
/// assert!(status.is_open());
/// assert!(!AlertStatus::Resolved.is_open());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Resolved,
    Cancelled,
}

impl AlertStatus {
    /// Whether this status still occupies an operator's queue.
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Pending | AlertStatus::Acknowledged)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Pending => write!(f, "pending"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AlertStatus::Pending),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            "cancelled" => Ok(AlertStatus::Cancelled),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// A single typed measurement value. Exactly one representation is
/// populated per observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ObservationValue {
    Numeric(f64),
    Coded(String),
    Text(String),
}

impl ObservationValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            ObservationValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_coded(&self) -> Option<&str> {
        match self {
            ObservationValue::Coded(c) => Some(c.as_str()),
            _ => None,
        }
    }

    /// Short type name used in logs and type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ObservationValue::Numeric(_) => "numeric",
            ObservationValue::Coded(_) => "coded",
            ObservationValue::Text(_) => "text",
        }
    }
}

/// How an observation entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    Manual,
    Device,
    Clinician,
}

/// An immutable patient metric reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub patient_id: String,
    pub metric_key: String,
    pub value: ObservationValue,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub source: ObservationSource,
}

/// Collapse duplicate readings so that at most one observation per
/// `recorded_at` instant survives, keeping the latest `ingested_at`.
///
/// Input must be sorted ascending by `recorded_at` (the order the history
/// reader returns); output preserves that order.
pub fn resolve_duplicates(observations: Vec<Observation>) -> Vec<Observation> {
    let mut out: Vec<Observation> = Vec::with_capacity(observations.len());
    for obs in observations {
        match out.last_mut() {
            Some(prev) if prev.recorded_at == obs.recorded_at => {
                if obs.ingested_at >= prev.ingested_at {
                    *prev = obs;
                }
            }
            _ => out.push(obs),
        }
    }
    out
}

/// The mutable record produced when a rule is satisfied.
///
/// Mutated only through the lifecycle transitions in the alert store;
/// never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub patient_id: String,
    pub rule_id: String,
    pub observation_id: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub triggered_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub time_spent_minutes: Option<i64>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Evaluation inputs captured at trigger time plus any supporting
    /// observations attached by deduplication, kept for audit.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
