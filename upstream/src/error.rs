use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Timed out or could not connect.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

impl UpstreamError {
    /// Whether retrying the same request may succeed.
    ///
    /// Every fetch failure counts, including HTTP error statuses; only a bad
    /// client configuration is permanent.
    pub fn is_transient(&self) -> bool {
        !matches!(self, UpstreamError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_are_transient_config_is_not() {
        let status = |status| UpstreamError::Status {
            status,
            url: "http://x".into(),
        };
        assert!(status(503).is_transient());
        assert!(status(404).is_transient());
        assert!(UpstreamError::Unreachable("timeout".into()).is_transient());
        assert!(!UpstreamError::Config("bad url".into()).is_transient());
    }
}
