use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IR error: {0}")]
    Ir(#[from] repolens_ir::IrError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Lock held by another rebuilder: {0}")]
    LockHeld(String),

    #[error("Rebuild cancelled")]
    Cancelled,

    #[error("Impact classification failed: {0}")]
    ImpactClassification(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn storage<E: std::fmt::Display>(e: E) -> Self {
        Self::Storage(e.to_string())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Storage(_) | OrchestratorError::LockHeld(_) => {
                ErrorCategory::Transient
            }
            OrchestratorError::Io(_) => ErrorCategory::Infrastructure,
            _ => ErrorCategory::Permanent,
        }
    }
}

/// Error category driving retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Retry with backoff (timeouts, connection loss)
    Transient,
    /// Do not retry (invalid input, parse failure)
    Permanent,
    /// Alert operations (OOM, disk full)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(ErrorCategory::Transient),
            "permanent" => Ok(ErrorCategory::Permanent),
            "infrastructure" => Ok(ErrorCategory::Infrastructure),
            _ => Err(OrchestratorError::Config(format!(
                "invalid error category: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_round_trip() {
        for category in &[
            ErrorCategory::Transient,
            ErrorCategory::Permanent,
            ErrorCategory::Infrastructure,
        ] {
            assert_eq!(ErrorCategory::parse(category.as_str()).unwrap(), *category);
        }
        assert!(ErrorCategory::parse("bogus").is_err());
    }

    #[test]
    fn test_lock_errors_are_transient() {
        let err = OrchestratorError::LockHeld("repo:s1".into());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }
}
