// src/core/call_graph/call_chain_tracer.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::config::matches_namespace;
use crate::error::{ParseFailure, Result};
use super::super::deadline::Deadline;
use super::super::model::{collect_calls, Expr, ExprKind, TypeKind};
use super::super::resolver::{MethodRef, Scope, TypeResolver, TypeTarget};
use super::{CallEdge, CallGraph, CallNode, EdgeKind, MethodKey, TerminalMarker};

/// A terminal of the traced graph: boundary hit, unresolved call or empty body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    pub kind: TerminalMarker,
    /// `Type.method` as far as it is known
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<MethodKey>,
    pub file: PathBuf,
    pub line: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

/// Full result of tracing from one entry method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTrace {
    pub entry: MethodKey,
    /// Other overloads the entry could have meant, when the request was ambiguous
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub entry_candidates: Vec<MethodKey>,
    pub max_depth: usize,
    pub root: CallNode,
    pub edges: Vec<CallEdge>,
    pub leaves: Vec<Leaf>,
    /// Boundary methods reached, in first-hit order
    pub boundary_hits: Vec<String>,
    pub cycles: Vec<Vec<MethodKey>>,
    pub rendered_tree: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseFailure>,
}

/// How a single call site resolved
enum CallResolution {
    Resolved {
        target: MethodRef,
        kind: EdgeKind,
    },
    /// Interface or abstract call with zero or several implementations
    Dispatch {
        declared: MethodRef,
        kind: EdgeKind,
        implementations: Vec<MethodRef>,
    },
    Boundary {
        type_name: String,
        method_name: String,
        arity: usize,
        receiver: String,
    },
    Unresolved {
        type_name: Option<String>,
        method_name: String,
    },
}

/// Depth-first tracer over resolved call sites.
///
/// A method already on the current path becomes a `cyclic` terminal; one
/// expanded elsewhere becomes `visited`. Each (caller, call site) pair
/// yields at most one edge.
pub struct CallChainTracer<'r, 'a> {
    resolver: &'r TypeResolver<'a>,
    /// Maximum depth to trace (prevents infinite recursion)
    max_depth: usize,
    boundary_namespaces: Vec<String>,
    deadline: Deadline,
    visited: HashSet<MethodKey>,
    on_path: HashSet<MethodKey>,
    seen_sites: HashSet<(MethodKey, usize, usize)>,
    edges: Vec<CallEdge>,
    leaves: Vec<Leaf>,
    boundary_hits: Vec<String>,
    scanned: bool,
    warnings: Vec<ParseFailure>,
}

impl<'r, 'a> CallChainTracer<'r, 'a> {
    pub fn new(
        resolver: &'r TypeResolver<'a>,
        max_depth: usize,
        boundary_namespaces: &[String],
        deadline: Deadline,
    ) -> Self {
        Self {
            resolver,
            max_depth,
            boundary_namespaces: boundary_namespaces.to_vec(),
            deadline,
            visited: HashSet::new(),
            on_path: HashSet::new(),
            seen_sites: HashSet::new(),
            edges: Vec::new(),
            leaves: Vec::new(),
            boundary_hits: Vec::new(),
            scanned: false,
            warnings: Vec::new(),
        }
    }

    /// Trace from an entry method
    pub fn trace(mut self, entry: &MethodRef) -> Result<CallTrace> {
        let entry_key = entry.key();
        debug!(entry = %entry_key, max_depth = self.max_depth, "tracing call chain");

        let line = entry.method().span.start_line;
        let root = self.expand(entry, line, 0, EdgeKind::Direct)?;
        let graph = CallGraph::from_edges(&self.edges);
        let rendered_tree = root.render();

        debug!(
            edges = self.edges.len(),
            leaves = self.leaves.len(),
            cycles = graph.cycles.len(),
            "call chain traced"
        );

        Ok(CallTrace {
            entry: entry_key,
            entry_candidates: Vec::new(),
            max_depth: self.max_depth,
            root,
            edges: graph.edges,
            leaves: self.leaves,
            boundary_hits: self.boundary_hits,
            cycles: graph.cycles,
            rendered_tree,
            warnings: self.warnings,
        })
    }

    fn expand(&mut self, method_ref: &MethodRef, line: usize, depth: usize, kind: EdgeKind) -> Result<CallNode> {
        self.deadline.check()?;

        let key = method_ref.key();
        let method = method_ref.method();
        let file = method_ref.entry.unit.path.clone();

        let mut node = CallNode::new(key.display_name(), line, depth, kind);
        node.key = Some(key.clone());
        node.file = Some(file.clone());

        self.visited.insert(key.clone());

        let body = match &method.body {
            Some(body) => body,
            None => {
                self.push_leaf(TerminalMarker::Unresolved, &key, None, None, &file, method.span.start_line, Vec::new());
                return Ok(node.terminal(TerminalMarker::Unresolved));
            }
        };

        if body.stmts.is_empty() {
            self.push_leaf(TerminalMarker::EmptyBody, &key, None, None, &file, method.span.start_line, Vec::new());
            return Ok(node.terminal(TerminalMarker::EmptyBody));
        }

        let calls = collect_calls(body);
        if calls.is_empty() {
            return Ok(node);
        }
        if depth >= self.max_depth {
            return Ok(node.terminal(TerminalMarker::DepthLimit));
        }

        self.on_path.insert(key.clone());
        let scope = Scope {
            entry: &method_ref.entry,
            method: Some(method),
        };

        for call in calls {
            let site = (key.clone(), call.span.start_line, call.span.start_column);
            if !self.seen_sites.insert(site) {
                continue;
            }
            let child = self.follow_call(&scope, &key, call, depth + 1)?;
            node.children.push(child);
        }

        self.on_path.remove(&key);
        Ok(node)
    }

    fn follow_call(&mut self, scope: &Scope, caller: &MethodKey, call: &Expr, depth: usize) -> Result<CallNode> {
        let name = match &call.kind {
            ExprKind::Call { name, .. } => name.clone(),
            _ => call.text.clone(),
        };
        let line = call.span.start_line;
        let file = scope.entry.unit.path.clone();

        let mut edge = CallEdge {
            caller: caller.clone(),
            file: file.clone(),
            line,
            column: call.span.start_column,
            callee: None,
            callee_name: name.clone(),
            receiver_type: None,
            kind: EdgeKind::Unresolved,
            depth,
        };

        match self.resolve_call(scope, call)? {
            CallResolution::Resolved { target, kind } => {
                let target_key = target.key();
                edge.receiver_type = Some(target_key.declaring_type.clone());
                edge.callee = Some(target_key.clone());
                edge.kind = kind;
                self.edges.push(edge);

                if self.on_path.contains(&target_key) {
                    let mut node = CallNode::new(target_key.display_name(), line, depth, kind);
                    node.key = Some(target_key);
                    return Ok(node.terminal(TerminalMarker::Cyclic));
                }
                if self.visited.contains(&target_key) {
                    let mut node = CallNode::new(target_key.display_name(), line, depth, kind);
                    node.note = Some(format!("already expanded: {}", target_key));
                    node.key = Some(target_key);
                    return Ok(node.terminal(TerminalMarker::Visited));
                }
                self.expand(&target, line, depth, kind)
            }
            CallResolution::Dispatch {
                declared,
                kind,
                implementations,
            } => {
                let declared_key = declared.key();
                edge.receiver_type = Some(declared_key.declaring_type.clone());
                edge.callee = Some(declared_key.clone());
                edge.kind = kind;
                self.edges.push(edge);

                let candidates: Vec<String> = implementations.iter().map(|m| m.key().to_string()).collect();
                let mut node = CallNode::new(declared_key.display_name(), line, depth, kind);
                node.note = Some(if candidates.is_empty() {
                    "no implementation found in workspace".to_string()
                } else {
                    format!("{} implementations, not guessing", candidates.len())
                });
                node.candidates = candidates.clone();
                node.key = Some(declared_key.clone());
                self.push_leaf(
                    TerminalMarker::Unresolved,
                    &declared_key,
                    Some(caller),
                    Some(declared_key.declaring_type.clone()),
                    &file,
                    line,
                    candidates,
                );
                Ok(node.terminal(TerminalMarker::Unresolved))
            }
            CallResolution::Boundary {
                type_name,
                method_name,
                arity,
                receiver,
            } => {
                let key = MethodKey::new(&type_name, &method_name, arity);
                edge.receiver_type = Some(receiver);
                edge.callee = Some(key.clone());
                edge.kind = EdgeKind::Direct;
                self.edges.push(edge);

                let qualified = format!("{}.{}", type_name, method_name);
                if !self.boundary_hits.contains(&qualified) {
                    self.boundary_hits.push(qualified);
                }
                self.push_leaf(TerminalMarker::Boundary, &key, Some(caller), Some(type_name), &file, line, Vec::new());

                let mut node = CallNode::new(key.display_name(), line, depth, EdgeKind::Direct);
                node.key = Some(key);
                Ok(node.terminal(TerminalMarker::Boundary))
            }
            CallResolution::Unresolved {
                type_name,
                method_name,
            } => {
                edge.receiver_type = type_name.clone();
                self.edges.push(edge);
                let label = match &type_name {
                    Some(t) => format!("{}.{}", t.rsplit('.').next().unwrap_or(t), method_name),
                    None => method_name.clone(),
                };
                self.leaves.push(Leaf {
                    kind: TerminalMarker::Unresolved,
                    method: match &type_name {
                        Some(t) => format!("{}.{}", t, method_name),
                        None => method_name.clone(),
                    },
                    callee_type: type_name,
                    caller: Some(caller.clone()),
                    file,
                    line,
                    candidates: Vec::new(),
                });
                Ok(CallNode::new(label, line, depth, EdgeKind::Unresolved).terminal(TerminalMarker::Unresolved))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_leaf(
        &mut self,
        kind: TerminalMarker,
        key: &MethodKey,
        caller: Option<&MethodKey>,
        callee_type: Option<String>,
        file: &Path,
        line: usize,
        candidates: Vec<String>,
    ) {
        self.leaves.push(Leaf {
            kind,
            method: format!("{}.{}", key.declaring_type, key.method_name),
            callee_type,
            caller: caller.cloned(),
            file: file.to_path_buf(),
            line,
            candidates,
        });
    }

    fn is_boundary(&self, qualified_name: &str) -> bool {
        self.boundary_namespaces
            .iter()
            .any(|prefix| matches_namespace(qualified_name, prefix))
    }

    fn resolve_call(&mut self, scope: &Scope, call: &Expr) -> Result<CallResolution> {
        let (target, name, args) = match &call.kind {
            ExprKind::Call { target, name, args } => (target, name, args),
            _ => {
                return Ok(CallResolution::Unresolved {
                    type_name: None,
                    method_name: call.text.clone(),
                })
            }
        };

        let receiver = match target {
            None => Some(TypeTarget::Project(scope.entry.clone())),
            Some(t) => self.resolver.infer_expr_type(scope, t),
        };

        let owner = match receiver {
            Some(TypeTarget::Project(owner)) => owner,
            Some(TypeTarget::External(type_name)) => {
                return Ok(self.external_call(type_name.clone(), type_name, name, args.len()));
            }
            Some(other) => {
                return Ok(CallResolution::Unresolved {
                    type_name: Some(other.qualified_name().to_string()),
                    method_name: name.clone(),
                })
            }
            None => {
                return Ok(CallResolution::Unresolved {
                    type_name: None,
                    method_name: name.clone(),
                })
            }
        };

        // Unqualified calls may also target enclosing types
        let mut candidates = self.resolver.find_methods(&owner, name);
        if candidates.is_empty() && target.is_none() {
            for outer in self.resolver.enclosing_chain(&owner).into_iter().skip(1) {
                candidates = self.resolver.find_methods(&outer, name);
                if !candidates.is_empty() {
                    break;
                }
            }
        }

        let overload = match self.resolver.select_overload(candidates, args, Some(scope)) {
            Some(overload) => overload,
            None => {
                // Inherited from a supertype outside the workspace
                let external_parent = self
                    .resolver
                    .ancestors(&owner)
                    .into_iter()
                    .find(|a| matches!(a, TypeTarget::External(_)));
                return Ok(match external_parent {
                    Some(TypeTarget::External(parent)) => {
                        self.external_call(parent, owner.decl.qualified_name.clone(), name, args.len())
                    }
                    _ => CallResolution::Unresolved {
                        type_name: Some(owner.decl.qualified_name.clone()),
                        method_name: name.clone(),
                    },
                });
            }
        };

        let target_ref = overload.target;
        let declaring = target_ref.entry.decl.qualified_name.clone();
        if self.is_boundary(&declaring) {
            return Ok(CallResolution::Boundary {
                type_name: declaring,
                method_name: name.clone(),
                arity: args.len(),
                receiver: owner.decl.qualified_name.clone(),
            });
        }

        let method = target_ref.method();
        let overridable = !method.has_modifier("static") && !method.has_modifier("private");
        let kind = if target_ref.entry.decl.kind == TypeKind::Interface && overridable {
            EdgeKind::InterfaceDispatch
        } else if method.body.is_none() && method.has_modifier("abstract") {
            EdgeKind::AbstractDispatch
        } else {
            return Ok(CallResolution::Resolved {
                target: target_ref,
                kind: EdgeKind::Direct,
            });
        };

        self.ensure_scanned()?;
        let mut implementations = self.resolver.implementations(&target_ref);
        match implementations.len() {
            1 => Ok(CallResolution::Resolved {
                target: implementations.remove(0),
                kind,
            }),
            // A default method nobody overrides runs its own body
            0 if method.body.is_some() => Ok(CallResolution::Resolved {
                target: target_ref,
                kind,
            }),
            _ => Ok(CallResolution::Dispatch {
                declared: target_ref,
                kind,
                implementations,
            }),
        }
    }

    /// A call landing on a type outside the workspace; `receiver` is the
    /// static type the call was made through.
    fn external_call(&self, type_name: String, receiver: String, name: &str, arity: usize) -> CallResolution {
        if self.is_boundary(&type_name) {
            CallResolution::Boundary {
                type_name,
                method_name: name.to_string(),
                arity,
                receiver,
            }
        } else {
            CallResolution::Unresolved {
                type_name: Some(type_name),
                method_name: name.to_string(),
            }
        }
    }

    /// Implementation lookup needs every file indexed once.
    fn ensure_scanned(&mut self) -> Result<()> {
        if !self.scanned {
            self.warnings = self.resolver.index().scan_all(&self.deadline)?;
            self.scanned = true;
        }
        Ok(())
    }
}
