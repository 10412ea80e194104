use carewatch_alert::UpstreamError;
use carewatch_storage::StorageError;

/// Errors surfaced by [`crate::AlertService`] operations.
///
/// Conflicts are returned to the caller immediately and never retried
/// automatically: they represent a legitimate race (another clinician got
/// there first) that must be re-resolved with fresh state.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A lifecycle guard failed; see the inner error for who holds the
    /// claim or which state blocked the transition.
    #[error(transparent)]
    Conflict(StorageError),

    /// An external collaborator stayed unreachable through all retry
    /// attempts. The observation was queued for re-evaluation.
    #[error("upstream unavailable after {attempts} attempts: {source}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },

    /// A non-conflict storage failure.
    #[error(transparent)]
    Storage(StorageError),
}

impl ServiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        if err.is_conflict() {
            ServiceError::Conflict(err)
        } else {
            ServiceError::Storage(err)
        }
    }
}

/// Convenience `Result` alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
