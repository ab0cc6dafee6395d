//! Session-scoped workspace index.
//!
//! Files are parsed lazily, the first time anything refers to them. Each
//! path owns one `OnceLock` slot, so concurrent requests for the same file
//! block on a single parse instead of duplicating it. Type entries are only
//! ever added. Answers are ordered by source position (file discovery order,
//! then offset), so they do not depend on which request loaded a file first.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CodescopeError, ParseFailure, Result};
use super::deadline::Deadline;
use super::model::{SourceUnit, TypeDecl};
use super::parser::{content_hash, CodeParser};
use super::suggest::nearest_names;

type ParseSlot = Arc<OnceLock<std::result::Result<Arc<SourceUnit>, ParseFailure>>>;

/// A type declaration together with the file that declares it.
#[derive(Debug, Clone)]
pub struct TypeEntry {
    pub decl: Arc<TypeDecl>,
    pub unit: Arc<SourceUnit>,
}

pub struct WorkspaceIndex {
    root: PathBuf,
    source_dirs: Vec<PathBuf>,
    parser: CodeParser,
    files: Mutex<HashMap<PathBuf, ParseSlot>>,
    /// Qualified name -> every declaration of it, earliest in source order first
    types: RwLock<HashMap<String, Vec<TypeEntry>>>,
    /// Simple name -> qualified names
    simple_names: RwLock<HashMap<String, Vec<String>>>,
    /// (file stem, package filter) pairs already loaded by name convention
    loaded_stems: Mutex<HashSet<(String, Option<String>)>>,
    discovered: OnceLock<Vec<PathBuf>>,
    /// Display path -> position in discovery order
    file_order: OnceLock<HashMap<PathBuf, usize>>,
}

/// Sort key placing a declaration in workspace source order.
type SourcePosition = (usize, PathBuf, usize);

impl WorkspaceIndex {
    pub fn new(root: &Path, config: &Config) -> Self {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| clean_path(root));
        info!(root = %root.display(), "opening workspace index");

        Self {
            parser: CodeParser::new(&config.parsing, &config.project.ignore_patterns),
            source_dirs: config.project.source_dirs.clone(),
            root,
            files: Mutex::new(HashMap::new()),
            types: RwLock::new(HashMap::new()),
            simple_names: RwLock::new(HashMap::new()),
            loaded_stems: Mutex::new(HashSet::new()),
            discovered: OnceLock::new(),
            file_order: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a root-relative or absolute path to the absolute key used by the index.
    pub fn normalize_path(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let cleaned = clean_path(&joined);
        std::fs::canonicalize(&cleaned).unwrap_or(cleaned)
    }

    /// Path as reported back to callers: relative to the workspace root when possible.
    pub fn display_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Every source file under the configured source directories, sorted.
    pub fn discovered_files(&self) -> Result<&[PathBuf]> {
        if let Some(files) = self.discovered.get() {
            return Ok(files);
        }
        let files: Vec<PathBuf> = self
            .parser
            .discover(&self.root, &self.source_dirs)?
            .iter()
            .map(|p| self.normalize_path(p))
            .collect();
        Ok(self.discovered.get_or_init(|| files))
    }

    fn file_order(&self) -> &HashMap<PathBuf, usize> {
        self.file_order.get_or_init(|| match self.discovered_files() {
            Ok(files) => files
                .iter()
                .enumerate()
                .map(|(i, path)| (self.display_path(path), i))
                .collect(),
            Err(err) => {
                warn!(error = %err, "source discovery failed");
                HashMap::new()
            }
        })
    }

    /// Files outside the discovered set sort after it, by path.
    fn source_position(&self, entry: &TypeEntry) -> SourcePosition {
        let path = &entry.unit.path;
        let rank = self.file_order().get(path).copied().unwrap_or(usize::MAX);
        (rank, path.clone(), entry.decl.span.start_byte)
    }

    /// Parse a file once per session. Later callers get the cached outcome,
    /// failures included.
    pub fn load_file(&self, path: &Path) -> std::result::Result<Arc<SourceUnit>, ParseFailure> {
        let key = self.normalize_path(path);
        let slot = {
            let mut files = self.files.lock();
            files.entry(key.clone()).or_default().clone()
        };

        slot.get_or_init(|| self.parse_and_register(&key)).clone()
    }

    /// Load a file that a request named directly. Failures propagate.
    pub fn open_file(&self, path: &Path) -> Result<Arc<SourceUnit>> {
        let key = self.normalize_path(path);
        if !key.is_file() {
            let known: Vec<PathBuf> = self
                .discovered_files()?
                .iter()
                .map(|p| self.display_path(p))
                .collect();
            // Compare without extensions so the dot is not read as a namespace separator
            let stems: Vec<String> = known
                .iter()
                .map(|p| p.with_extension("").to_string_lossy().to_string())
                .collect();
            let query = path.with_extension("").to_string_lossy().to_string();
            let suggestions = nearest_names(&query, stems.iter().map(String::as_str))
                .into_iter()
                .filter_map(|stem| {
                    let i = stems.iter().position(|s| *s == stem)?;
                    Some(known[i].to_string_lossy().to_string())
                })
                .collect();
            return Err(CodescopeError::symbol_not_found(
                path.to_string_lossy(),
                suggestions,
            ));
        }
        Ok(self.load_file(&key)?)
    }

    fn parse_and_register(&self, key: &Path) -> std::result::Result<Arc<SourceUnit>, ParseFailure> {
        let display = self.display_path(key);
        let parsed = self.parser.parse_file(key).map_err(|err| match err {
            CodescopeError::Parse(failure) => ParseFailure {
                path: display.clone(),
                ..failure
            },
            other => ParseFailure {
                path: display.clone(),
                line: 0,
                message: other.to_string(),
            },
        });

        let mut unit = match parsed {
            Ok(unit) => unit,
            Err(failure) => {
                warn!(file = %failure.path.display(), line = failure.line, "{}", failure.message);
                return Err(failure);
            }
        };
        unit.path = display;
        let unit = Arc::new(unit);

        let entries: Vec<(SourcePosition, TypeEntry)> = unit
            .all_types()
            .into_iter()
            .map(|decl| {
                let entry = TypeEntry {
                    decl,
                    unit: unit.clone(),
                };
                (self.source_position(&entry), entry)
            })
            .collect();

        let mut types = self.types.write();
        let mut simple_names = self.simple_names.write();
        for (position, entry) in entries {
            let qualified = entry.decl.qualified_name.clone();
            let declarations = types.entry(qualified.clone()).or_default();
            if declarations.is_empty() {
                simple_names.entry(entry.decl.name.clone()).or_default().push(qualified);
            } else {
                debug!(type_name = %qualified, file = %unit.path.display(), "duplicate declaration");
            }
            let at = declarations.partition_point(|existing| self.source_position(existing) <= position);
            declarations.insert(at, entry);
        }

        Ok(unit)
    }

    /// Look up a type by qualified name, parsing the file that conventionally
    /// declares it if it is not indexed yet.
    pub fn lookup(&self, qualified_name: &str) -> Option<TypeEntry> {
        if let Some(entry) = self.indexed(qualified_name) {
            return Some(entry);
        }

        // `a.b.Outer.Inner` may live in `a/b/Outer.java`
        let segments: Vec<&str> = qualified_name.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            if segment.chars().next().map_or(false, char::is_uppercase) {
                let package = segments[..i].join(".");
                self.load_by_stem(segment, Some(&package));
                break;
            }
        }
        if let Some(entry) = self.indexed(qualified_name) {
            return Some(entry);
        }

        // Fall back to any file named after the simple name
        if let Some(simple) = segments.last() {
            self.load_by_stem(simple, None);
        }
        self.indexed(qualified_name)
    }

    /// The winning declaration of an already indexed type.
    fn indexed(&self, qualified_name: &str) -> Option<TypeEntry> {
        self.types
            .read()
            .get(qualified_name)
            .and_then(|declarations| declarations.first())
            .cloned()
    }

    /// Every indexed type with the given simple name, in source order.
    pub fn lookup_simple(&self, simple_name: &str) -> Vec<TypeEntry> {
        self.load_by_stem(simple_name, None);
        let names = self
            .simple_names
            .read()
            .get(simple_name)
            .cloned()
            .unwrap_or_default();
        let mut found: Vec<TypeEntry> = names.iter().filter_map(|q| self.indexed(q)).collect();
        found.sort_by_cached_key(|entry| self.source_position(entry));
        found
    }

    fn load_by_stem(&self, stem: &str, package: Option<&str>) {
        let key = (stem.to_string(), package.map(str::to_string));
        if self.loaded_stems.lock().contains(&key) {
            return;
        }

        let files = match self.discovered_files() {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "source discovery failed");
                return;
            }
        };

        let package_dir = package.map(|p| p.replace('.', "/"));
        for file in files {
            if file.file_stem().and_then(|s| s.to_str()) != Some(stem) {
                continue;
            }
            if let Some(dir) = &package_dir {
                let parent = file
                    .parent()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                if !dir.is_empty() && !parent.ends_with(dir.as_str()) {
                    continue;
                }
            }
            let _ = self.load_file(file);
        }
        self.loaded_stems.lock().insert(key);
    }

    /// Parse every discovered file. Per-file failures come back as warnings.
    pub fn scan_all(&self, deadline: &Deadline) -> Result<Vec<ParseFailure>> {
        let mut warnings = Vec::new();
        for file in self.discovered_files()? {
            deadline.check()?;
            if let Err(failure) = self.load_file(file) {
                warnings.push(failure);
            }
        }
        debug!(warnings = warnings.len(), "workspace scan complete");
        Ok(warnings)
    }

    /// Successfully parsed units, in path order.
    pub fn parsed_units(&self) -> Vec<Arc<SourceUnit>> {
        let files = self.files.lock();
        let mut entries: Vec<(&PathBuf, &ParseSlot)> = files.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .filter_map(|(_, slot)| slot.get().and_then(|r| r.as_ref().ok()).cloned())
            .collect()
    }

    /// Indexed types in source order (file path, then declaration order).
    pub fn types_in_source_order(&self) -> Vec<TypeEntry> {
        let types = self.types.read();
        self.parsed_units()
            .iter()
            .flat_map(|unit| unit.all_types())
            .filter_map(|decl| {
                types
                    .get(&decl.qualified_name)
                    .and_then(|declarations| declarations.first())
                    .filter(|entry| Arc::ptr_eq(&entry.decl, &decl))
                    .cloned()
            })
            .collect()
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Files whose on-disk content no longer matches what was parsed.
    pub fn stale_files(&self) -> Vec<PathBuf> {
        let files = self.files.lock();
        let mut stale: Vec<PathBuf> = files
            .iter()
            .filter_map(|(path, slot)| {
                let unit = slot.get()?.as_ref().ok()?;
                let changed = match std::fs::read_to_string(path) {
                    Ok(content) => content_hash(&content) != unit.content_hash,
                    Err(_) => true,
                };
                changed.then(|| unit.path.clone())
            })
            .collect();
        stale.sort();
        stale
    }
}

/// Lexically remove `.` and `..` components.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(files: &[(&str, &str)]) -> (tempfile::TempDir, WorkspaceIndex) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let index = WorkspaceIndex::new(dir.path(), &Config::default());
        (dir, index)
    }

    #[test]
    fn test_lookup_parses_conventional_file_lazily() {
        let (_dir, index) = workspace(&[
            ("src/com/shop/Order.java", "package com.shop; public class Order { static class Line {} }"),
            ("src/com/shop/Other.java", "package com.shop; class Other {}"),
        ]);

        let entry = index.lookup("com.shop.Order.Line").unwrap();
        assert_eq!(entry.decl.name, "Line");
        assert_eq!(entry.unit.path, Path::new("src/com/shop/Order.java"));
        assert_eq!(index.parsed_units().len(), 1);
    }

    #[test]
    fn test_load_file_is_cached_per_path() {
        let (_dir, index) = workspace(&[("A.java", "class A {}")]);
        let first = index.load_file(Path::new("A.java")).unwrap();
        let second = index.load_file(&index.root().join("./A.java")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_scan_collects_parse_failures_as_warnings() {
        let (_dir, index) = workspace(&[
            ("Good.java", "class Good {}"),
            ("Bad.java", "class Bad { void run( { }"),
        ]);
        let warnings = index.scan_all(&Deadline::unbounded()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, Path::new("Bad.java"));
        assert!(index.lookup("Good").is_some());
    }

    #[test]
    fn test_first_declaration_wins() {
        let (_dir, index) = workspace(&[
            ("a/Dup.java", "class Dup { int a; }"),
            ("b/Dup.java", "class Dup { int b; }"),
        ]);
        index.scan_all(&Deadline::unbounded()).unwrap();
        let entry = index.lookup("Dup").unwrap();
        assert_eq!(entry.unit.path, Path::new("a/Dup.java"));
        assert_eq!(index.lookup_simple("Dup").len(), 1);
    }

    #[test]
    fn test_source_order_wins_regardless_of_load_order() {
        let (_dir, index) = workspace(&[
            ("a/Dup.java", "class Dup { int a; }"),
            ("b/Dup.java", "class Dup { int b; }"),
            ("com/a/Order.java", "package com.a; class Order {}"),
            ("com/b/Order.java", "package com.b; class Order {}"),
        ]);
        index.load_file(Path::new("b/Dup.java")).unwrap();
        assert_eq!(index.lookup("Dup").unwrap().unit.path, Path::new("b/Dup.java"));

        index.load_file(Path::new("a/Dup.java")).unwrap();
        assert_eq!(index.lookup("Dup").unwrap().unit.path, Path::new("a/Dup.java"));

        assert!(index.lookup("com.b.Order").is_some());
        let names: Vec<String> = index
            .lookup_simple("Order")
            .iter()
            .map(|e| e.decl.qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["com.a.Order", "com.b.Order"]);
    }

    #[test]
    fn test_stale_files_detects_edits() {
        let (dir, index) = workspace(&[("A.java", "class A {}")]);
        index.load_file(Path::new("A.java")).unwrap();
        assert!(index.stale_files().is_empty());

        std::fs::write(dir.path().join("A.java"), "class A { int x; }").unwrap();
        assert_eq!(index.stale_files(), vec![PathBuf::from("A.java")]);
    }

    #[test]
    fn test_open_file_suggests_known_paths() {
        let (_dir, index) = workspace(&[("src/OrderService.java", "class OrderService {}")]);
        let err = index.open_file(Path::new("src/OrderServce.java")).unwrap_err();
        assert_eq!(err.kind(), "symbol_not_found");
        assert_eq!(err.suggestions(), ["src/OrderService.java"]);
    }
}
