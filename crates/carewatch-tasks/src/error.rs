/// Errors that can occur within the task linkage boundary.
///
/// These never propagate into alert lifecycle results; the dispatcher
/// logs them and moves on.
///
/// # Examples
///
/// ```rust
/// use carewatch_tasks::error::TaskError;
///
/// let err = TaskError::InvalidConfig("missing endpoint url".to_string());
/// assert!(err.to_string().contains("endpoint"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Sink configuration is missing a required field or is invalid.
    #[error("Tasks: invalid sink configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to the external task endpoint failed.
    #[error("Tasks: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The task system returned a non-success response.
    #[error("Tasks: API error from {sink}: status={status}, body={body}")]
    Api {
        sink: String,
        status: u16,
        body: String,
    },

    /// The request did not complete within the dispatch timeout.
    #[error("Tasks: sink '{sink}' timed out after {timeout_secs}s")]
    Timeout { sink: String, timeout_secs: u64 },

    /// Generic task linkage error for cases not covered by other variants.
    #[error("Tasks: {0}")]
    Other(String),
}

/// Convenience `Result` alias for task linkage operations.
pub type Result<T> = std::result::Result<T, TaskError>;
