//! Source positions and compile diagnostics.
//!
//! Every token and AST node carries a [`Position`]. Errors abort the
//! current compile and surface as a [`CompileError`] with a kind, a
//! position and a message; warnings and notes flow through [`Diagnostic`]
//! records printed on the error stream as
//! `<line>, <column>: <severity>: <text>`.

use std::fmt;

/// A 1-based line/column pair in the input translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// The position of the first character of a translation unit.
    pub fn start() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.line, self.column)
    }
}

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A single diagnostic message tied to a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub position: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn error(position: Position, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.position, self.severity, self.message)
    }
}

/// Render a batch of diagnostics, one per line.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for d in diagnostics {
        out.push_str(&d.to_string());
        out.push('\n');
    }
    out
}

/// Classification of a compile failure.
///
/// The kind decides the process exit code; the position and message are
/// what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed lexeme (unterminated string, bad escape, ...).
    Lexical,
    /// Unexpected or missing token.
    Syntax,
    /// Type, lvalue, scope or label error.
    Semantic,
    /// Failure reading the input or writing the output.
    Io,
}

/// A fatal compile error. Aborts the current compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub position: Position,
    pub message: String,
}

impl CompileError {
    pub fn lexical(position: Position, message: impl Into<String>) -> Self {
        CompileError {
            kind: ErrorKind::Lexical,
            position,
            message: message.into(),
        }
    }

    pub fn syntax(position: Position, message: impl Into<String>) -> Self {
        CompileError {
            kind: ErrorKind::Syntax,
            position,
            message: message.into(),
        }
    }

    pub fn semantic(position: Position, message: impl Into<String>) -> Self {
        CompileError {
            kind: ErrorKind::Semantic,
            position,
            message: message.into(),
        }
    }

    /// The diagnostic form of this error.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.position, self.message.clone())
    }
}

impl fmt::Display for CompileError {
    // Same rendering as an error-severity diagnostic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: error: {}", self.position, self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<fmt::Error> for CompileError {
    fn from(e: fmt::Error) -> Self {
        CompileError {
            kind: ErrorKind::Io,
            position: Position::default(),
            message: format!("output formatting failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_format() {
        let d = Diagnostic::error(Position::new(3, 14), "unterminated string constant");
        assert_eq!(d.to_string(), "3, 14: error: unterminated string constant");
    }

    #[test]
    fn test_severity_names() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(Severity::Info.to_string(), "info");
    }

    #[test]
    fn test_compile_error_display_matches_diagnostic() {
        let e = CompileError::semantic(Position::new(7, 2), "undeclared identifier 'x'");
        assert_eq!(e.to_string(), e.to_diagnostic().to_string());
    }

    #[test]
    fn test_format_diagnostics_batches_lines() {
        let ds = vec![
            Diagnostic::error(Position::new(1, 1), "first"),
            Diagnostic::error(Position::new(2, 5), "second"),
        ];
        assert_eq!(format_diagnostics(&ds), "1, 1: error: first\n2, 5: error: second\n");
    }
}
