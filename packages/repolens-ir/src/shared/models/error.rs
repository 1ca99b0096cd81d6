//! Unified error type for the IR core
//!
//! Errors are typed values; nothing escapes a component boundary as a
//! panic. Per-file failures are contained at the file boundary, per-stage
//! failures at the stage boundary when a best-effort output exists.

use std::fmt;

/// Error kind categorization, mirroring the stage taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable; the tree contains error nodes and downstream continues
    Parse,
    /// Scoped to a subtree; the rest of the file's IR is still produced
    IrGeneration,
    /// An import or reference could not be resolved
    Resolution,
    /// Classifier failure; callers fall back to GLOBAL
    ImpactClassification,
    /// Per-file rebuild failure; old IR retained
    Rebuild,
    FlowAnalysis,
    TypeResolution,
    DataFlow,
    OverlayApply,
    Fusion,
    Lock,
    Storage,
    Config,
    Io,
    /// Bugs
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::IrGeneration => "ir_generation",
            ErrorKind::Resolution => "resolution",
            ErrorKind::ImpactClassification => "impact_classification",
            ErrorKind::Rebuild => "rebuild",
            ErrorKind::FlowAnalysis => "flow_analysis",
            ErrorKind::TypeResolution => "type_resolution",
            ErrorKind::DataFlow => "data_flow",
            ErrorKind::OverlayApply => "overlay_apply",
            ErrorKind::Fusion => "fusion",
            ErrorKind::Lock => "lock",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Unified error type
#[derive(Debug)]
pub struct IrError {
    pub kind: ErrorKind,
    pub message: String,
    pub file_path: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl IrError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_path: None,
            source: None,
        }
    }

    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn ir_generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IrGeneration, message)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, message)
    }

    pub fn overlay(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OverlayApply, message)
    }

    pub fn fusion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fusion, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn lock(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lock, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref file) = self.file_path {
            write!(f, " in {}", file)?;
        }
        Ok(())
    }
}

impl std::error::Error for IrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for IrError {
    fn from(err: serde_json::Error) -> Self {
        IrError::storage(format!("JSON serialization error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for IrError {
    fn from(err: std::io::Error) -> Self {
        IrError::new(ErrorKind::Io, err.to_string()).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IrError::parse("unexpected token").with_file("test.py");
        let msg = format!("{}", err);
        assert!(msg.contains("parse"));
        assert!(msg.contains("unexpected token"));
        assert!(msg.contains("test.py"));
    }
}
