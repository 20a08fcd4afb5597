use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::SourceSpan;
use crate::types::TypeConstructionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

impl DiagnosticLevel {
    pub fn label(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub level: DiagnosticLevel,
    pub filename: Option<String>,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    pub fn from_error(error: TypedSyntaxError, level: DiagnosticLevel) -> Self {
        Self {
            message: error.message,
            level,
            filename: error.filename,
            span: error.span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&strix_support::format_location(
            self.filename.as_deref(),
            self.span.map(|span| (span.line, span.column)),
            self.level.label(),
            &self.message,
        ))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.push_error_with_span(message, None);
    }

    pub fn push_error_with_span<S: Into<String>>(&mut self, message: S, span: Option<SourceSpan>) {
        self.entries.push(Diagnostic {
            message: message.into(),
            level: DiagnosticLevel::Error,
            filename: None,
            span,
        });
    }

    pub fn push_warning_with_span<S: Into<String>>(
        &mut self,
        message: S,
        span: Option<SourceSpan>,
    ) {
        self.entries.push(Diagnostic {
            message: message.into(),
            level: DiagnosticLevel::Warning,
            filename: None,
            span,
        });
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|diagnostic| diagnostic.level == DiagnosticLevel::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.entries
            .iter()
            .any(|diagnostic| diagnostic.level == DiagnosticLevel::Warning)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|diagnostic| diagnostic.level == DiagnosticLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|diagnostic| diagnostic.level == DiagnosticLevel::Warning)
    }

    /// Promotes every warning to an error.
    pub fn escalate_warnings(&mut self) {
        for diagnostic in &mut self.entries {
            diagnostic.level = DiagnosticLevel::Error;
        }
    }
}

/// A binding or type error. Errors raised without a position pick one up from
/// the nearest enclosing node being visited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.filename, .span, .message))]
pub struct TypedSyntaxError {
    pub message: String,
    pub filename: Option<String>,
    pub span: Option<SourceSpan>,
}

fn render(filename: &Option<String>, span: &Option<SourceSpan>, message: &str) -> String {
    strix_support::format_location(
        filename.as_deref(),
        span.map(|span| (span.line, span.column)),
        "error",
        message,
    )
}

impl TypedSyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            filename: None,
            span: None,
        }
    }

    pub fn at(message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            message: message.into(),
            filename: None,
            span: Some(span),
        }
    }

    /// Attaches `span` unless a more specific position is already known.
    pub fn located(mut self, span: SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn in_file(mut self, filename: &str) -> Self {
        if self.filename.is_none() {
            self.filename = Some(filename.to_string());
        }
        self
    }
}

impl From<TypeConstructionError> for TypedSyntaxError {
    fn from(error: TypeConstructionError) -> Self {
        TypedSyntaxError::new(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Stop at the first error and hand it back to the caller.
    FailFast,
    /// Record every error and keep going.
    #[default]
    Collect,
}

/// Receives the errors raised while binding one module.
#[derive(Debug)]
pub struct ErrorSink {
    mode: ErrorMode,
    filename: Option<String>,
    diagnostics: Diagnostics,
}

impl ErrorSink {
    pub fn new(mode: ErrorMode, filename: Option<String>) -> Self {
        Self {
            mode,
            filename,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Fails with the error in fail-fast mode, otherwise records it.
    pub fn error(&mut self, error: TypedSyntaxError) -> Result<(), TypedSyntaxError> {
        let error = self.attach_file(error);
        match self.mode {
            ErrorMode::FailFast => Err(error),
            ErrorMode::Collect => {
                self.diagnostics
                    .push_diagnostic(Diagnostic::from_error(error, DiagnosticLevel::Error));
                Ok(())
            }
        }
    }

    /// Warnings never interrupt traversal.
    pub fn warning(&mut self, warning: TypedSyntaxError) {
        let warning = self.attach_file(warning);
        self.diagnostics
            .push_diagnostic(Diagnostic::from_error(warning, DiagnosticLevel::Warning));
    }

    fn attach_file(&self, error: TypedSyntaxError) -> TypedSyntaxError {
        match &self.filename {
            Some(filename) => error.in_file(filename),
            None => error,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn located_keeps_the_innermost_position() {
        let inner = SourceSpan::single_point(4, 8);
        let outer = SourceSpan::single_point(2, 0);
        let error = TypedSyntaxError::at("boom", inner).located(outer);
        assert_eq!(error.span, Some(inner));

        let unpositioned = TypedSyntaxError::new("boom").located(outer);
        assert_eq!(unpositioned.span, Some(outer));
    }

    #[test]
    fn fail_fast_sink_returns_the_error() {
        let mut sink = ErrorSink::new(ErrorMode::FailFast, Some("foo.py".into()));
        let err = sink
            .error(TypedSyntaxError::new("bad"))
            .expect_err("fail-fast sink should propagate");
        assert_eq!(err.filename.as_deref(), Some("foo.py"));
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn collecting_sink_records_in_order() {
        let mut sink = ErrorSink::new(ErrorMode::Collect, None);
        sink.error(TypedSyntaxError::new("first")).unwrap();
        sink.warning(TypedSyntaxError::new("second"));
        sink.error(TypedSyntaxError::new("third")).unwrap();
        let messages: Vec<_> = sink
            .diagnostics()
            .entries()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(messages, ["first", "second", "third"]);
        assert!(sink.has_errors());
    }

    #[test]
    fn renders_with_location() {
        let error = TypedSyntaxError::at("bad", SourceSpan::single_point(3, 4)).in_file("m.py");
        assert_eq!(error.to_string(), "m.py:3:4: error: bad");
    }
}
