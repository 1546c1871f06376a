use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Blockchain RPC unavailable: {0}")]
    RpcUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User rejected the signature request")]
    UserRejected,

    #[error("Transaction broadcast but not confirmed within budget")]
    ConfirmationTimeout,

    #[error("Transaction reverted on-chain")]
    Reverted,

    #[error("Backend sync failed after on-chain success: {0}")]
    BackendSync(String),

    #[error("Backend API error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Transport-class failures are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::RpcUnavailable(_) => true,
            EngineError::Backend(message) => looks_like_transient_rpc_error(message),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return EngineError::RpcUnavailable(err.to_string());
        }
        EngineError::Backend(err.to_string())
    }
}

/// Matches the transport-failure shapes public RPC providers actually emit.
pub fn looks_like_transient_rpc_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("too many requests")
        || lower.contains("429")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("gateway")
        || lower.contains("temporarily unavailable")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("error sending request")
        || lower.contains("eof while parsing")
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_transport_failures() {
        assert!(EngineError::RpcUnavailable("timed out".into()).is_transient());
        assert!(!EngineError::InvalidInput("bad address".into()).is_transient());
        assert!(!EngineError::UserRejected.is_transient());
        assert!(!EngineError::Reverted.is_transient());
    }

    #[test]
    fn transient_matcher_recognizes_common_shapes() {
        assert!(looks_like_transient_rpc_error("HTTP 429 Too Many Requests"));
        assert!(looks_like_transient_rpc_error("connection reset by peer"));
        assert!(!looks_like_transient_rpc_error("execution reverted"));
    }
}
