// src/core/endpoints/route_index.rs - Annotation-declared routes and template matching
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::error::{CodescopeError, ParseFailure, Result};
use super::super::deadline::Deadline;
use super::super::index::{TypeEntry, WorkspaceIndex};
use super::super::model::{find_annotation, Annotation, MethodDecl};
use super::super::call_graph::MethodKey;

/// Spring mapping annotations with a fixed verb
const SPRING_VERB_MAPPINGS: &[(&str, HttpVerb)] = &[
    ("GetMapping", HttpVerb::Get),
    ("PostMapping", HttpVerb::Post),
    ("PutMapping", HttpVerb::Put),
    ("DeleteMapping", HttpVerb::Delete),
    ("PatchMapping", HttpVerb::Patch),
];

/// JAX-RS verb annotations
const JAXRS_VERBS: &[(&str, HttpVerb)] = &[
    ("GET", HttpVerb::Get),
    ("POST", HttpVerb::Post),
    ("PUT", HttpVerb::Put),
    ("DELETE", HttpVerb::Delete),
    ("PATCH", HttpVerb::Patch),
    ("HEAD", HttpVerb::Head),
    ("OPTIONS", HttpVerb::Options),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        };
        f.write_str(name)
    }
}

impl FromStr for HttpVerb {
    type Err = CodescopeError;

    /// Accepts `get`, `GET` and `RequestMethod.GET`.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().rsplit('.').next().unwrap_or(s).to_ascii_uppercase();
        JAXRS_VERBS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, verb)| *verb)
            .ok_or_else(|| CodescopeError::InvalidRequest(format!("unknown HTTP verb: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `{name}` or `{name:regex}`; also `*`
    Variable(String),
}

/// Route template such as `/api/users/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = path_segments(template)
            .into_iter()
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') {
                    let inner = &segment[1..segment.len() - 1];
                    let name = inner.split(':').next().unwrap_or(inner).trim();
                    Segment::Variable(name.to_string())
                } else if segment == "*" || segment == "**" {
                    Segment::Variable(segment.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    pub fn variable_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Variable(_)))
            .count()
    }

    /// Bind a concrete path. Every literal must match exactly and every
    /// variable takes exactly one segment, so segment counts must agree.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let concrete = path_segments(path);
        if concrete.len() != self.segments.len() {
            return None;
        }

        let mut bindings = BTreeMap::new();
        for (segment, value) in self.segments.iter().zip(concrete) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Variable(name) => {
                    bindings.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(bindings)
    }
}

/// Non-empty path segments, ignoring any query string.
fn path_segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a type-level and a method-level fragment into one normalized path.
pub fn join_paths(class_path: &str, method_path: &str) -> String {
    let segments: Vec<&str> = path_segments(class_path)
        .into_iter()
        .chain(path_segments(method_path))
        .collect();
    format!("/{}", segments.join("/"))
}

/// One handler method mapped to a path.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub path: String,
    /// Empty when the mapping accepts any verb
    pub verbs: Vec<HttpVerb>,
    pub handler: MethodKey,
    pub file: PathBuf,
    pub line: usize,
    /// Position in workspace source order
    pub order: usize,
    #[serde(skip)]
    template: RouteTemplate,
}

impl Route {
    pub fn accepts(&self, verb: HttpVerb) -> bool {
        self.verbs.is_empty() || self.verbs.contains(&verb)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMatch {
    pub route: Route,
    pub bindings: BTreeMap<String, String>,
    /// Number of variable segments; fewer is more specific
    pub variable_segments: usize,
    pub explicit_verb: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteIndex {
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseFailure>,
}

impl RouteIndex {
    /// Scan the whole workspace for mapped handler methods.
    pub fn build(index: &WorkspaceIndex, deadline: &Deadline) -> Result<Self> {
        let warnings = index.scan_all(deadline)?;
        let mut routes = Vec::new();

        for entry in index.types_in_source_order() {
            deadline.check()?;
            collect_routes(&entry, &mut routes);
        }

        info!(routes = routes.len(), warnings = warnings.len(), "route index built");
        Ok(Self { routes, warnings })
    }

    /// Routes matching `verb` and `path`, most specific first. Ties prefer
    /// an explicit verb, then source order.
    pub fn find(&self, verb: HttpVerb, path: &str) -> Vec<RouteMatch> {
        let mut matches: Vec<RouteMatch> = self
            .routes
            .iter()
            .filter(|route| route.accepts(verb))
            .filter_map(|route| {
                let bindings = route.template.matches(path)?;
                Some(RouteMatch {
                    route: route.clone(),
                    bindings,
                    variable_segments: route.template.variable_count(),
                    explicit_verb: !route.verbs.is_empty(),
                })
            })
            .collect();

        matches.sort_by_key(|m| (m.variable_segments, !m.explicit_verb, m.route.order));
        debug!(verb = %verb, path, matches = matches.len(), "matched routes");
        matches
    }

    /// Every indexed route as `VERB /path`, for suggestions.
    pub fn describe(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|route| {
                let verbs = if route.verbs.is_empty() {
                    "ANY".to_string()
                } else {
                    route.verbs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("|")
                };
                format!("{} {}", verbs, route.path)
            })
            .collect()
    }
}

fn collect_routes(entry: &TypeEntry, routes: &mut Vec<Route>) {
    let decl = &entry.decl;
    let class_paths = type_level_paths(&decl.annotations);

    for method in &decl.methods {
        let Some((method_paths, verbs)) = method_mapping(method) else {
            continue;
        };
        for class_path in &class_paths {
            for method_path in &method_paths {
                let path = join_paths(class_path, method_path);
                routes.push(Route {
                    template: RouteTemplate::parse(&path),
                    path,
                    verbs: verbs.clone(),
                    handler: MethodKey::new(&decl.qualified_name, &method.name, method.arity()),
                    file: entry.unit.path.clone(),
                    line: method.span.start_line,
                    order: routes.len(),
                });
            }
        }
    }
}

fn type_level_paths(annotations: &[Annotation]) -> Vec<String> {
    let paths = find_annotation(annotations, "RequestMapping")
        .map(mapping_paths)
        .or_else(|| find_annotation(annotations, "Path").map(mapping_paths))
        .unwrap_or_default();
    if paths.is_empty() {
        vec![String::new()]
    } else {
        paths
    }
}

/// Paths declared on a mapping annotation; an annotation without one maps the empty fragment.
fn mapping_paths(annotation: &Annotation) -> Vec<String> {
    let paths: Vec<String> = annotation
        .values("value")
        .iter()
        .chain(annotation.values("path"))
        .cloned()
        .collect();
    if paths.is_empty() {
        vec![String::new()]
    } else {
        paths
    }
}

/// Method-level fragments and verbs, or `None` when the method is not a handler.
fn method_mapping(method: &MethodDecl) -> Option<(Vec<String>, Vec<HttpVerb>)> {
    let annotations = &method.annotations;

    for (name, verb) in SPRING_VERB_MAPPINGS {
        if let Some(annotation) = find_annotation(annotations, name) {
            return Some((mapping_paths(annotation), vec![*verb]));
        }
    }

    if let Some(annotation) = find_annotation(annotations, "RequestMapping") {
        let verbs = annotation
            .values("method")
            .iter()
            .filter_map(|v| v.parse::<HttpVerb>().ok())
            .collect();
        return Some((mapping_paths(annotation), verbs));
    }

    let verbs: Vec<HttpVerb> = JAXRS_VERBS
        .iter()
        .filter(|(name, _)| find_annotation(annotations, name).is_some())
        .map(|(_, verb)| *verb)
        .collect();
    if verbs.is_empty() {
        return None;
    }
    let paths = find_annotation(annotations, "Path")
        .map(mapping_paths)
        .unwrap_or_else(|| vec![String::new()]);
    Some((paths, verbs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_requires_exact_segment_count() {
        let template = RouteTemplate::parse("/api/users/{id}");
        let bindings = template.matches("/api/users/42").unwrap();
        assert_eq!(bindings.get("id").map(String::as_str), Some("42"));
        assert!(template.matches("/api/users/42/orders").is_none());
        assert!(template.matches("/api/users").is_none());
        assert!(template.matches("/api/groups/42").is_none());
    }

    #[test]
    fn test_ignores_query_and_trailing_slash() {
        let template = RouteTemplate::parse("/api/orders/{orderId:\\d+}/items");
        assert!(template.matches("/api/orders/7/items/").is_some());
        assert!(template.matches("/api/orders/7/items?page=2").is_some());
        assert_eq!(template.variable_count(), 1);
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("api", "{id}"), "/api/{id}");
        assert_eq!(join_paths("", ""), "/");
        assert_eq!(join_paths("/orders", ""), "/orders");
    }

    #[test]
    fn test_verb_parsing() {
        assert_eq!("get".parse::<HttpVerb>().unwrap(), HttpVerb::Get);
        assert_eq!("RequestMethod.DELETE".parse::<HttpVerb>().unwrap(), HttpVerb::Delete);
        assert!("FETCH".parse::<HttpVerb>().is_err());
        assert_eq!(HttpVerb::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_root_template_matches_root_only() {
        let template = RouteTemplate::parse("/");
        assert!(template.matches("/").is_some());
        assert!(template.matches("").is_some());
        assert!(template.matches("/x").is_none());
    }
}
