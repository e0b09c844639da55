use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request could not be sent or the response could not be received.
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}")]
    Http { status: u16 },
    /// The response body was not the expected shape.
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("a job is already in flight on this machine")]
    AlreadyRunning,
}

impl ClientError {
    /// Failures worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Http { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_and_http_are_transient() {
        assert!(ClientError::Network("reset".into()).is_transient());
        assert!(ClientError::Http { status: 503 }.is_transient());
        assert!(!ClientError::Parse("eof".into()).is_transient());
        assert!(!ClientError::Validation("empty".into()).is_transient());
        assert!(!ClientError::AlreadyRunning.is_transient());
    }
}
