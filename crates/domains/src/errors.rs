//! # DomainError
//!
//! Centralized error handling for tagbot.
//! Maps component failures to the outcomes callers are expected to handle.

use std::fmt;

use thiserror::Error;

/// Why a tag body failed to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A `{` without its `}`, or an `{if}` without its `{endif}`.
    Unterminated,
    UnknownDirective,
    /// `{arg0}`, `{argX}`, `{arg:}` and similar.
    InvalidArgument,
    InvalidPredicate,
    UnexpectedElse,
    UnexpectedEndif,
    EmptyDirective,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ParseErrorKind::Unterminated => "unterminated directive",
            ParseErrorKind::UnknownDirective => "unknown directive",
            ParseErrorKind::InvalidArgument => "invalid argument reference",
            ParseErrorKind::InvalidPredicate => "invalid condition",
            ParseErrorKind::UnexpectedElse => "`else` outside of `if`",
            ParseErrorKind::UnexpectedEndif => "`endif` without matching `if`",
            ParseErrorKind::EmptyDirective => "empty directive",
        };
        f.write_str(text)
    }
}

/// A template compilation failure. `position` is a byte offset into the body.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} at offset {position}")]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, position: usize) -> Self {
        Self { position, kind }
    }
}

/// The bound an evaluation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    OutputLength,
    Depth,
    NodeCount,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::OutputLength => f.write_str("output length"),
            LimitKind::Depth => f.write_str("nesting depth"),
            LimitKind::NodeCount => f.write_str("node count"),
        }
    }
}

/// The primary error type for all tagbot operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Absent tag, guild or command target. Expected and non-fatal.
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },

    /// Command name or alias registered twice. Fatal at startup.
    #[error("duplicate command name or alias `{0}`")]
    DuplicateName(String),

    /// Tag body authoring error, reported to the editor.
    #[error("template error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation limit exceeded: {0}")]
    EvaluationLimitExceeded(LimitKind),

    /// Storage timed out or failed. Transient.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Malformed user input (ids, names, durations).
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A handler panicked or a task was lost.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        DomainError::NotFound { entity, key: key.to_string() }
    }

    /// Worth one retry of the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::StorageUnavailable(_))
    }
}

/// A specialized Result type for tagbot logic.
pub type DomainResult<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_convert_into_domain_errors() {
        let err: DomainError = ParseError::new(ParseErrorKind::Unterminated, 4).into();
        assert_eq!(err.to_string(), "template error: unterminated directive at offset 4");
        assert!(!err.is_transient());
    }

    #[test]
    fn storage_failures_are_transient() {
        assert!(DomainError::StorageUnavailable("timeout".into()).is_transient());
    }
}
