//! Language front-ends.
//!
//! Each language gets its own module that lowers a tree-sitter syntax tree
//! into the shared [`SourceUnit`] model.

mod java;

pub use java::JavaParser;

use crate::error::Result;
use super::model::SourceUnit;

/// Trait that all language parsers must implement
pub trait LanguageParser {
    /// Parse source code into an owned syntax model.
    ///
    /// Fails with a [`ParseFailure`](crate::error::ParseFailure) when the file
    /// contains syntax errors.
    fn parse(&mut self, content: &str, file_path: &std::path::Path) -> Result<SourceUnit>;

    /// Get the file extensions this parser handles
    fn file_extensions(&self) -> &[&str];

    /// Get the language name
    fn language_name(&self) -> &str;
}
