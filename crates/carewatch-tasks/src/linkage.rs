use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::error::TaskError;
use crate::{FollowUpTask, TaskSink};

/// Fire-and-forget dispatcher for follow-up task creation.
///
/// Every dispatch is spawned and bounded by a timeout so that a slow or
/// unreachable task system can never block or roll back the alert
/// creation that already committed.
pub struct TaskLinkage {
    sinks: Vec<Arc<dyn TaskSink>>,
    timeout_secs: u64,
}

impl TaskLinkage {
    pub fn new(sinks: Vec<Arc<dyn TaskSink>>, timeout_secs: u64) -> Self {
        Self {
            sinks,
            timeout_secs,
        }
    }

    /// A linkage with no sinks; dispatch becomes a no-op.
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            timeout_secs: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Request follow-up task creation for a newly created alert.
    ///
    /// Returns immediately; delivery happens on spawned tasks and
    /// failures are logged, never surfaced.
    pub fn dispatch(&self, task: FollowUpTask) {
        for sink in &self.sinks {
            let sink = sink.clone();
            let task = task.clone();
            let timeout_secs = self.timeout_secs;
            tokio::spawn(async move {
                let attempt = tokio::time::timeout(
                    Duration::from_secs(timeout_secs),
                    sink.create_task(&task),
                );
                let result = match attempt.await {
                    Ok(result) => result,
                    Err(_) => Err(TaskError::Timeout {
                        sink: sink.sink_name().to_string(),
                        timeout_secs,
                    }),
                };
                match result {
                    Ok(()) => {
                        tracing::debug!(
                            sink = sink.sink_name(),
                            alert_id = %task.alert_id,
                            "Follow-up task created"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            sink = sink.sink_name(),
                            alert_id = %task.alert_id,
                            error = %e,
                            "Failed to create follow-up task"
                        );
                    }
                }
            });
        }
    }
}
