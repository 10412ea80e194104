//! Follow-up task creation boundary.
//!
//! When a newly created alert's rule asks for a follow-up task, the
//! [`linkage::TaskLinkage`] dispatches a one-way notification to a
//! [`TaskSink`]. The coupling is strictly one-directional: task failures
//! are logged and suppressed, and alert state is never read back from or
//! blocked on the task system.

pub mod error;
pub mod linkage;
pub mod sinks;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carewatch_common::types::Severity;
use error::Result;

pub use linkage::TaskLinkage;

/// The payload handed to the external task system when an alert is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub alert_id: String,
    pub patient_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub summary: String,
    pub triggered_at: DateTime<Utc>,
}

/// Destination for follow-up task creation requests (e.g. a care-plan
/// task service reached over HTTP).
#[async_trait]
pub trait TaskSink: Send + Sync {
    /// Requests creation of a follow-up task.
    ///
    /// # Errors
    ///
    /// Returns an error if the task system rejects or fails the request;
    /// the dispatcher logs and suppresses it.
    async fn create_task(&self, task: &FollowUpTask) -> Result<()>;

    /// Returns the sink type name (e.g. `"webhook"`).
    fn sink_name(&self) -> &str;
}
