//! Diagnostics collected during generation and analysis
//!
//! Malformed code never aborts a build; the offending subtree is skipped
//! and a diagnostic is recorded on the document.

use serde::{Deserialize, Serialize};

use super::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Producing stage ("parse", "ir_generation", "resolution", ...)
    pub source: String,
}

impl Diagnostic {
    pub fn error(
        source: impl Into<String>,
        file_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file_path: file_path.into(),
            span: None,
            source: source.into(),
        }
    }

    pub fn warning(
        source: impl Into<String>,
        file_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file_path: file_path.into(),
            span: None,
            source: source.into(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}
