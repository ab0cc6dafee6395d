// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tracing::{info, debug};

use crate::config::Config;
use crate::error::{CodescopeError, Result};
use super::branches::{analyze_block, analyze_method, parse_snippet, BranchReport};
use super::call_graph::{CallChainTracer, CallTrace};
use super::deadline::Deadline;
use super::dependencies::{DependencyClassifier, DependencyReport};
use super::endpoints::{compose_flow, EndpointFlow, HttpVerb, RouteIndex};
use super::index::WorkspaceIndex;
use super::model::Location;
use super::resolver::{MethodRef, Overload, SymbolResolution, TypeResolver};
use super::shape::{ShapeExtractor, ShapeTree};
use super::suggest::nearest_names;
use super::usages::{find_usages, UsageReport};

/// Upper bound on any requested traversal depth
const MAX_REQUEST_DEPTH: usize = 64;

/// Full text and signature of one method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSource {
    pub type_name: String,
    pub method: String,
    pub signature: String,
    pub location: Location,
    pub annotations: Vec<String>,
    pub source: String,
    pub ambiguous: bool,
    /// Every overload that matched the request, the chosen one first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

/// One analysis session over a workspace root.
///
/// The configuration is validated once here. Parsed files and the route
/// index live as long as the engine; [`Engine::stale_files`] reports files
/// edited on disk since they were parsed.
pub struct Engine {
    config: Config,
    index: WorkspaceIndex,
    routes: Mutex<Option<Arc<RouteIndex>>>,
}

impl Engine {
    pub fn new(root: &Path, config: Config) -> Result<Self> {
        config.validate()?;
        if !root.is_dir() {
            return Err(CodescopeError::Config(format!(
                "workspace root is not a directory: {}",
                root.display()
            )));
        }

        let index = WorkspaceIndex::new(root, &config);
        info!(root = %index.root().display(), "🔍 analysis session started");

        Ok(Self {
            config,
            index,
            routes: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    fn resolver(&self) -> TypeResolver<'_> {
        TypeResolver::new(&self.index, &self.config)
    }

    /// Deadline for one request; starts counting immediately.
    fn deadline(&self, timeout: Option<Duration>) -> Deadline {
        Deadline::after(timeout.unwrap_or(Duration::from_millis(self.config.analysis.default_timeout_ms)))
    }

    fn check_depth(depth: usize, what: &str) -> Result<usize> {
        if depth > MAX_REQUEST_DEPTH {
            return Err(CodescopeError::InvalidRequest(format!(
                "{} {} exceeds the maximum of {}",
                what, depth, MAX_REQUEST_DEPTH
            )));
        }
        Ok(depth)
    }

    /// Resolve `name` as seen from `file` (root-relative or absolute).
    pub fn resolve_symbol(
        &self,
        name: &str,
        file: &Path,
        line: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<SymbolResolution> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let resolution = self.resolver().resolve_symbol(name, file, line)?;
        deadline.check()?;
        debug!(symbol = name, kind = ?resolution.declaration_kind, "symbol resolved");
        Ok(resolution)
    }

    /// Locate a method by type and name, pinned to an arity when given.
    fn locate_method(
        &self,
        resolver: &TypeResolver,
        type_name: &str,
        method: &str,
        arity: Option<usize>,
        deadline: &Deadline,
    ) -> Result<Overload> {
        let found = resolver.find_type(type_name, deadline)?;
        resolver.find_method(&found.entry, method, arity)
    }

    pub fn method_source(
        &self,
        type_name: &str,
        method: &str,
        arity: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<MethodSource> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let resolver = self.resolver();
        let overload = self.locate_method(&resolver, type_name, method, arity, &deadline)?;
        let target = &overload.target;
        let decl = target.method();

        Ok(MethodSource {
            type_name: target.entry.decl.qualified_name.clone(),
            method: decl.name.clone(),
            signature: decl.signature.clone(),
            location: target.location(),
            annotations: decl.annotations.iter().map(|a| a.raw.clone()).collect(),
            source: target.entry.unit.text(decl.span).to_string(),
            ambiguous: overload.ambiguous,
            candidates: candidate_names(&overload),
        })
    }

    pub fn extract_shape(
        &self,
        type_name: &str,
        max_depth: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<ShapeTree> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let depth = Self::check_depth(max_depth.unwrap_or(self.config.analysis.max_shape_depth), "shape depth")?;
        let resolver = self.resolver();
        ShapeExtractor::new(&resolver, depth, deadline).extract(type_name)
    }

    pub fn analyze_branches(
        &self,
        type_name: &str,
        method: &str,
        arity: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<BranchReport> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let resolver = self.resolver();
        let overload = self.locate_method(&resolver, type_name, method, arity, &deadline)?;
        let target = &overload.target;
        let mut report = analyze_method(target.method(), Some(target.location()));
        report.subject = target.key().display_name();
        deadline.check()?;
        Ok(report)
    }

    /// Branch analysis of a free-standing statement block.
    pub fn analyze_snippet(&self, code: &str, timeout: Option<Duration>) -> Result<BranchReport> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let block = parse_snippet(code)?;
        Ok(analyze_block(&block, "snippet"))
    }

    pub fn trace_calls(
        &self,
        type_name: &str,
        method: &str,
        arity: Option<usize>,
        max_depth: Option<usize>,
        boundary_namespaces: Option<&[String]>,
        timeout: Option<Duration>,
    ) -> Result<CallTrace> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let depth = Self::check_depth(max_depth.unwrap_or(self.config.analysis.max_call_depth), "call depth")?;
        let boundaries = boundary_namespaces.unwrap_or(&self.config.analysis.boundary_namespaces);

        let resolver = self.resolver();
        let overload = self.locate_method(&resolver, type_name, method, arity, &deadline)?;
        info!(entry = %overload.target.key(), depth, "🔗 tracing call chain");

        let mut trace = CallChainTracer::new(&resolver, depth, boundaries, deadline).trace(&overload.target)?;
        if overload.ambiguous {
            trace.entry_candidates = overload.candidates.iter().map(MethodRef::key).collect();
        }
        Ok(trace)
    }

    pub fn classify_dependencies(&self, type_name: &str, timeout: Option<Duration>) -> Result<DependencyReport> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let resolver = self.resolver();
        let report = DependencyClassifier::new(&resolver).classify(type_name, &deadline)?;
        deadline.check()?;
        Ok(report)
    }

    /// The route index, built on first use. A failed or timed-out build
    /// leaves nothing cached.
    pub fn list_routes(&self, timeout: Option<Duration>) -> Result<Arc<RouteIndex>> {
        let deadline = self.deadline(timeout);
        self.routes(&deadline)
    }

    fn routes(&self, deadline: &Deadline) -> Result<Arc<RouteIndex>> {
        let mut cached = self.routes.lock();
        if let Some(routes) = cached.as_ref() {
            return Ok(routes.clone());
        }
        deadline.check()?;
        let built = Arc::new(RouteIndex::build(&self.index, deadline)?);
        *cached = Some(built.clone());
        Ok(built)
    }

    pub fn trace_endpoint(&self, verb: HttpVerb, path: &str, timeout: Option<Duration>) -> Result<EndpointFlow> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        let routes = self.routes(&deadline)?;
        let matches = routes.find(verb, path);

        let top = match matches.first() {
            Some(top) => top.route.handler.clone(),
            None => {
                let query = format!("{} {}", verb, path);
                let known = routes.describe();
                return Err(CodescopeError::symbol_not_found(
                    query.clone(),
                    nearest_names(&query, known.iter().map(String::as_str)),
                ));
            }
        };
        if matches.len() > 1 {
            info!(verb = %verb, path, matches = matches.len(), "several handlers match, tracing the most specific");
        }

        let resolver = self.resolver();
        let overload = self.locate_method(&resolver, &top.declaring_type, &top.method_name, Some(top.arity), &deadline)?;
        let trace = CallChainTracer::new(
            &resolver,
            self.config.analysis.max_call_depth,
            &self.config.analysis.boundary_namespaces,
            deadline,
        )
        .trace(&overload.target)?;

        let mut warnings = routes.warnings.clone();
        for warning in &trace.warnings {
            if !warnings.contains(warning) {
                warnings.push(warning.clone());
            }
        }
        Ok(compose_flow(&resolver, verb, path, matches, Some(trace), warnings))
    }

    pub fn find_usages(&self, symbol: &str, timeout: Option<Duration>) -> Result<UsageReport> {
        let deadline = self.deadline(timeout);
        deadline.check()?;
        find_usages(&self.resolver(), symbol, &deadline)
    }

    /// Parsed files whose on-disk content has changed since this session read them.
    pub fn stale_files(&self) -> Vec<PathBuf> {
        self.index.stale_files()
    }
}

fn candidate_names(overload: &Overload) -> Vec<String> {
    if !overload.ambiguous {
        return Vec::new();
    }
    overload
        .candidates
        .iter()
        .map(|m| format!("{} ({})", m.method().signature, m.location()))
        .collect()
}
