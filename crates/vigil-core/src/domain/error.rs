//! Engine-level error taxonomy.
//!
//! Stage, classification and strategy failures are recovered inside the engine
//! and never show up here. `EngineError` covers what is left: problems with the
//! engine's own inputs and resources.

/// Errors surfaced to callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid stage config: {0}")]
    InvalidStage(String),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("another invocation holds the lock on {0}")]
    Busy(String),

    #[error("audit sink error: {0}")]
    Audit(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("stage task failed: {0}")]
    StageTask(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::InvalidStage("stage 'lint' has empty command".to_string());
        assert!(err.to_string().contains("invalid stage config"));

        let err = EngineError::Busy("/tmp/audit/.vigil.lock".to_string());
        assert!(err.to_string().contains("holds the lock"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = EngineError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io.into();
        assert!(err.to_string().contains("io error"));
    }
}
