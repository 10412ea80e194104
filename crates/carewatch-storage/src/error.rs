/// Errors that can occur within the alert storage layer.
///
/// Conflict-class variants ([`StorageError::AlreadyClaimed`],
/// [`StorageError::Conflict`]) represent a legitimate race the caller must
/// re-resolve with fresh state; they are surfaced immediately and never
/// retried automatically.
///
/// # Examples
///
/// ```rust
/// use carewatch_storage::error::StorageError;
///
/// let err = StorageError::AlreadyClaimed {
///     alert_id: "alert-7".to_string(),
///     claimed_by: "dr-lee".to_string(),
/// };
/// assert!(err.to_string().contains("dr-lee"));
/// assert!(err.is_conflict());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A claim attempt lost to another actor who already holds the claim.
    #[error("Storage: alert {alert_id} already claimed by {claimed_by}")]
    AlreadyClaimed {
        alert_id: String,
        claimed_by: String,
    },

    /// A lifecycle guard failed (wrong status, wrong claimant, or a
    /// concurrent transition won the race).
    #[error("Storage: conflicting transition on alert {alert_id}: {reason}")]
    Conflict { alert_id: String, reason: String },

    /// Creation raced another qualifying observation and no open alert
    /// could be read back afterwards, which should be unreachable.
    #[error("Storage: open alert for patient {patient_id} rule {rule_id} vanished during dedup")]
    DedupReadback {
        patient_id: String,
        rule_id: String,
    },

    /// A caller-supplied argument failed validation (e.g. empty
    /// resolution note).
    #[error("Storage: invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored column contained a value the domain types cannot parse.
    #[error("Storage: corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (metadata_json).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Whether this error is a guard/claim conflict the caller should
    /// surface to the user rather than treat as a system failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::AlreadyClaimed { .. } | StorageError::Conflict { .. }
        )
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
