//! Error taxonomy shared across the daemon.
//!
//! Each variant maps to one HTTP status / control-channel error kind; the
//! mapping lives with the transport (`shelld-http`, `shelld-control`), not
//! here, so this crate stays transport-agnostic.

#[derive(thiserror::Error, Debug)]
pub enum ShelldError {
    #[error("no {kind} with id '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("resource limit reached: {resource}")]
    ResourceLimit { resource: &'static str },

    #[error("execution failed: {reasoning}")]
    ExecutionFailure { reasoning: String },

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ShelldError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn execution_failure(reasoning: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            reasoning: reasoning.into(),
        }
    }

    /// Stable string tag for structured logging and control-channel responses.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::ResourceLimit { .. } => "resource_limit",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::Timeout { .. } => "timeout",
            Self::Forbidden { .. } => "forbidden",
            Self::BadRequest { .. } => "bad_request",
            Self::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, ShelldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message() {
        let err = ShelldError::not_found("execution", "abc-123");
        assert_eq!(err.to_string(), "no execution with id 'abc-123'");
        assert_eq!(err.kind_tag(), "not_found");
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: ShelldError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind_tag(), "internal");
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShelldError>();
    }
}
