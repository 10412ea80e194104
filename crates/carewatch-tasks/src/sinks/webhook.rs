use async_trait::async_trait;

use crate::error::{Result, TaskError};
use crate::{FollowUpTask, TaskSink};

/// Posts follow-up task requests to an HTTP endpoint as JSON.
#[derive(Debug)]
pub struct WebhookTaskSink {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookTaskSink {
    pub fn new(endpoint: &str) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(TaskError::InvalidConfig(
                "missing webhook endpoint url".to_string(),
            ));
        }
        Ok(Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        })
    }

    fn render_body(&self, task: &FollowUpTask) -> String {
        serde_json::json!({
            "alert_id": task.alert_id,
            "patient_id": task.patient_id,
            "rule_id": task.rule_id,
            "severity": task.severity.to_string(),
            "summary": task.summary,
            "triggered_at": task.triggered_at.to_rfc3339(),
        })
        .to_string()
    }
}

#[async_trait]
impl TaskSink for WebhookTaskSink {
    async fn create_task(&self, task: &FollowUpTask) -> Result<()> {
        let body = self.render_body(task);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaskError::Api {
                sink: "webhook".to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "webhook"
    }
}
