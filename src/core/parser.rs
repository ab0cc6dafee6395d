use std::path::{Path, PathBuf};
use sha2::{Sha256, Digest};
use walkdir::WalkDir;
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::config::ParsingConfig;
use crate::error::{CodescopeError, ParseFailure, Result};
use super::languages::{LanguageParser, JavaParser};
use super::model::SourceUnit;

/// Discovers source files and turns them into [`SourceUnit`]s.
///
/// Tree-sitter parsers are stateful, so a fresh [`JavaParser`] is created per
/// file; this keeps `CodeParser` shareable between threads.
#[derive(Debug, Clone)]
pub struct CodeParser {
    config: ParsingConfig,
    ignore_patterns: Vec<String>,
}

impl CodeParser {
    pub fn new(config: &ParsingConfig, ignore_patterns: &[String]) -> Self {
        Self {
            config: config.clone(),
            ignore_patterns: ignore_patterns.to_vec(),
        }
    }

    /// List every parseable file under the given source directories, sorted
    /// so that declaration order is deterministic across runs.
    pub fn discover(&self, root: &Path, source_dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for dir in source_dirs {
            let dir = if dir.is_absolute() { dir.clone() } else { root.join(dir) };
            if !dir.exists() {
                warn!(dir = %dir.display(), "source directory does not exist, skipping");
                continue;
            }

            if self.config.respect_gitignore {
                // Use ignore crate to respect .gitignore and custom patterns
                let walker = WalkBuilder::new(&dir)
                    .hidden(false)
                    .git_ignore(true)
                    .build();

                for entry in walker {
                    let entry = entry.map_err(|e| CodescopeError::FileSystem(e.to_string()))?;
                    let path = entry.path();
                    if path.is_file() && self.should_parse_file(root, path) {
                        files.push(path.to_path_buf());
                    }
                }
            } else {
                for entry in WalkDir::new(&dir).follow_links(false) {
                    let entry = entry.map_err(|e| CodescopeError::FileSystem(e.to_string()))?;
                    let path = entry.path();
                    if entry.file_type().is_file() && self.should_parse_file(root, path) {
                        files.push(path.to_path_buf());
                    }
                }
            }
        }

        files.sort();
        files.dedup();
        debug!(count = files.len(), "discovered source files");
        Ok(files)
    }

    /// Parse a single source file from disk
    pub fn parse_file(&self, path: &Path) -> Result<SourceUnit> {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() as usize > self.config.max_file_size {
            return Err(ParseFailure {
                path: path.to_path_buf(),
                line: 0,
                message: format!(
                    "file exceeds maximum size limit of {} bytes",
                    self.config.max_file_size
                ),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        self.parse_source(path, &content)
    }

    /// Parse source text that is already in memory.
    pub fn parse_source(&self, path: &Path, content: &str) -> Result<SourceUnit> {
        let mut parser = JavaParser::new()?;
        let mut unit = parser.parse(content, path)?;
        unit.content_hash = content_hash(content);
        debug!(
            file = %path.display(),
            language = parser.language_name(),
            types = unit.types.len(),
            "parsed source file"
        );
        Ok(unit)
    }

    /// Determine if a file should be parsed based on configuration
    pub fn should_parse_file(&self, root: &Path, path: &Path) -> bool {
        let extension = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext,
            None => return false,
        };
        if !self.config.file_extensions.iter().any(|e| e == extension) {
            return false;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        !self.is_ignored(relative)
    }

    /// Patterns ending in `/` match a whole directory component; anything
    /// else matches as a substring of the root-relative path.
    fn is_ignored(&self, relative: &Path) -> bool {
        let normalized = relative.to_string_lossy().replace('\\', "/");
        let directories: Vec<&str> = match normalized.rsplit_once('/') {
            Some((dirs, _)) => dirs.split('/').collect(),
            None => Vec::new(),
        };

        self.ignore_patterns.iter().any(|pattern| match pattern.strip_suffix('/') {
            Some(dir) => directories.iter().any(|component| *component == dir),
            None => normalized.contains(pattern.as_str()),
        })
    }
}

/// Calculate SHA256 hash of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
