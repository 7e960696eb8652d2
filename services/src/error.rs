use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("store error: {0}")]
    Store(#[from] nodegraph_store::StoreError),

    #[error("upstream error: {0}")]
    Upstream(#[from] nodegraph_upstream::UpstreamError),

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] nodegraph_types::TypesError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("no tokio runtime available to run {0}")]
    NoRuntime(&'static str),

    #[error("background task {task} failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Whether the failed operation is worth retrying.
    ///
    /// Upstream fetch failures and attempt timeouts are; datastore failures
    /// surface immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Upstream(e) => e.is_transient(),
            ServiceError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegraph_store::StoreError;
    use nodegraph_upstream::UpstreamError;

    #[test]
    fn only_upstream_and_timeouts_are_transient() {
        assert!(ServiceError::from(UpstreamError::Unreachable("x".into())).is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ServiceError::from(StoreError::Backend("x".into())).is_transient());
        assert!(!ServiceError::Config("x".into()).is_transient());
    }
}
