use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A syntax error that prevented one file from being parsed.
///
/// Fatal for the file only: workspace-wide scans record it as a warning and
/// move on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub path: PathBuf,
    /// 1-based line of the first syntax error (0 when the file was rejected before parsing)
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.message)
    }
}

/// Main error type for Codescope operations
#[derive(Error, Debug)]
pub enum CodescopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse failure: {0}")]
    Parse(ParseFailure),

    #[error("Symbol not found: {name}")]
    SymbolNotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Operation timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u128, limit_ms: u128 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),
}

impl CodescopeError {
    pub fn symbol_not_found(name: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::SymbolNotFound {
            name: name.into(),
            suggestions,
        }
    }

    /// Stable machine-readable kind, used in structured failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Parse(_) => "parse_failure",
            Self::SymbolNotFound { .. } => "symbol_not_found",
            Self::Timeout { .. } => "timeout",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::FileSystem(_) => "file_system",
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::SymbolNotFound { suggestions, .. } => suggestions,
            _ => &[],
        }
    }
}

impl From<ParseFailure> for CodescopeError {
    fn from(failure: ParseFailure) -> Self {
        Self::Parse(failure)
    }
}

pub type Result<T> = std::result::Result<T, CodescopeError>;
