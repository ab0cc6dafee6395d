//! Workspace-wide reference search.
//!
//! A query is either a type (`OrderService`, `com.shop.OrderService`), a
//! member of a type (`OrderService.placeOrder`) or a bare member name
//! (`placeOrder`). Files that fail to parse are reported as warnings and
//! skipped.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CodescopeError, ParseFailure, Result};
use super::deadline::Deadline;
use super::index::TypeEntry;
use super::model::*;
use super::resolver::{Scope, TypeResolver, TypeTarget};
use super::type_ref::TypeReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    TypeReference,
    Instantiation,
    MethodCall,
    FieldAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub kind: UsageKind,
    pub file: PathBuf,
    pub line: usize,
    /// Enclosing `Type` or `Type.method`
    pub context: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub symbol: String,
    /// Qualified type the query resolved to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
    pub usages: Vec<Usage>,
    pub files_scanned: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseFailure>,
}

/// What a query names.
enum Query {
    Type(String),
    Member { owner: Option<String>, name: String },
}

impl Query {
    fn simple_type_name(&self) -> Option<&str> {
        match self {
            Query::Type(q) => Some(q.rsplit('.').next().unwrap_or(q)),
            Query::Member { .. } => None,
        }
    }
}

pub fn find_usages(resolver: &TypeResolver, symbol: &str, deadline: &Deadline) -> Result<UsageReport> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(CodescopeError::InvalidRequest("symbol must not be empty".to_string()));
    }

    let warnings = resolver.index().scan_all(deadline)?;
    let query = parse_query(resolver, symbol, deadline)?;

    let mut usages = Vec::new();
    let units = resolver.index().parsed_units();
    for unit in &units {
        deadline.check()?;
        for decl in unit.all_types() {
            let entry = TypeEntry {
                decl,
                unit: unit.clone(),
            };
            UsageCollector::new(resolver, &query, &entry, &mut usages).collect_type();
        }
    }

    debug!(symbol, usages = usages.len(), files = units.len(), "usage search complete");
    Ok(UsageReport {
        symbol: symbol.to_string(),
        resolved_type: match &query {
            Query::Type(q) => Some(q.clone()),
            Query::Member { owner, .. } => owner.clone(),
        },
        usages,
        files_scanned: units.len(),
        warnings,
    })
}

fn parse_query(resolver: &TypeResolver, symbol: &str, deadline: &Deadline) -> Result<Query> {
    let starts_upper = |s: &str| s.chars().next().map_or(false, char::is_uppercase);
    let last = symbol.rsplit('.').next().unwrap_or(symbol);

    if starts_upper(last) {
        let found = resolver.find_type(symbol, deadline)?;
        return Ok(Query::Type(found.entry.decl.qualified_name.clone()));
    }

    match symbol.rsplit_once('.') {
        Some((owner, member)) => {
            let found = resolver.find_type(owner, deadline)?;
            Ok(Query::Member {
                owner: Some(found.entry.decl.qualified_name.clone()),
                name: member.to_string(),
            })
        }
        None => Ok(Query::Member {
            owner: None,
            name: symbol.to_string(),
        }),
    }
}

struct UsageCollector<'c, 'r, 'a> {
    resolver: &'r TypeResolver<'a>,
    query: &'c Query,
    entry: &'c TypeEntry,
    method: Option<&'c MethodDecl>,
    out: &'c mut Vec<Usage>,
}

impl<'c, 'r, 'a> UsageCollector<'c, 'r, 'a> {
    fn new(resolver: &'r TypeResolver<'a>, query: &'c Query, entry: &'c TypeEntry, out: &'c mut Vec<Usage>) -> Self {
        Self {
            resolver,
            query,
            entry,
            method: None,
            out,
        }
    }

    fn collect_type(&mut self) {
        let entry: &'c TypeEntry = self.entry;
        let decl = &entry.decl;
        let header = decl.span.start_line;
        for ty in decl.superclass.iter().chain(decl.interfaces.iter()) {
            self.check_type_ref(ty, header, UsageKind::TypeReference);
        }

        for field in &decl.fields {
            self.check_type_ref(&field.ty, field.span.start_line, UsageKind::TypeReference);
            if let Some(init) = &field.initializer {
                self.visit_expr(init);
            }
        }

        for method in &decl.methods {
            self.method = Some(method);
            if let Some(ret) = &method.return_type {
                self.check_type_ref(ret, method.span.start_line, UsageKind::TypeReference);
            }
            for param in &method.params {
                self.check_type_ref(&param.ty, param.span.start_line, UsageKind::TypeReference);
            }
            if let Some(body) = &method.body {
                walk_block(self, body);
            }
            self.method = None;
        }
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            entry: self.entry,
            method: self.method,
        }
    }

    fn check_type_ref(&mut self, ty: &TypeReference, line: usize, kind: UsageKind) {
        let Some(simple) = self.query.simple_type_name() else {
            return;
        };
        let hit = ty.mentioned_names().into_iter().any(|mentioned| {
            let mentioned_simple = mentioned.rsplit('.').next().unwrap_or(mentioned);
            mentioned_simple == simple && self.resolves_to_query(mentioned)
        });
        if hit {
            self.record(kind, line);
        }
    }

    fn resolves_to_query(&self, name: &str) -> bool {
        let Query::Type(qualified) = self.query else {
            return false;
        };
        let target = self
            .resolver
            .resolve_type_name(name, &self.entry.unit, Some(&self.entry.decl));
        target.qualified_name() == qualified
    }

    /// Whether a member access through `receiver` can land on the queried owner.
    fn receiver_matches(&self, receiver: Option<&Expr>) -> bool {
        let Query::Member { owner: Some(owner), .. } = self.query else {
            return true;
        };
        let target = match receiver {
            None => Some(TypeTarget::Project(self.entry.clone())),
            Some(expr) => self.resolver.infer_expr_type(&self.scope(), expr),
        };
        match target {
            Some(TypeTarget::Project(entry)) => self.resolver.is_subtype_of(&entry, owner),
            Some(other) => other.qualified_name() == owner,
            // Receiver type unknown
            None => true,
        }
    }

    fn record(&mut self, kind: UsageKind, line: usize) {
        let context = match self.method {
            Some(method) => format!("{}.{}", self.entry.decl.name, method.name),
            None => self.entry.decl.name.clone(),
        };
        let snippet = self
            .entry
            .unit
            .source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .trim()
            .to_string();
        self.out.push(Usage {
            kind,
            file: self.entry.unit.path.clone(),
            line,
            context,
            snippet,
        });
    }
}

impl Visitor for UsageCollector<'_, '_, '_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::LocalVar(local) => {
                self.check_type_ref(&local.ty, stmt.span.start_line, UsageKind::TypeReference)
            }
            StmtKind::ForEach { var, .. } => {
                if let Some(ty) = &var.ty {
                    self.check_type_ref(ty, stmt.span.start_line, UsageKind::TypeReference);
                }
            }
            StmtKind::Try(try_stmt) => {
                for catch in &try_stmt.catches {
                    for ty in &catch.types {
                        self.check_type_ref(ty, catch.span.start_line, UsageKind::TypeReference);
                    }
                }
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        let line = expr.span.start_line;
        match &expr.kind {
            ExprKind::New { ty, .. } => self.check_type_ref(ty, line, UsageKind::Instantiation),
            ExprKind::Cast { ty, .. } => self.check_type_ref(ty, line, UsageKind::TypeReference),
            ExprKind::Name(name) => {
                // Static access through a bare type name: `OrderStatus.OPEN`, `Util.call()`
                if self.query.simple_type_name() == Some(name.as_str()) && self.resolves_to_query(name) {
                    self.record(UsageKind::TypeReference, line);
                }
            }
            ExprKind::Call { target, name, .. } => {
                if let Query::Member { name: wanted, .. } = self.query {
                    if wanted == name && self.receiver_matches(target.as_deref()) {
                        self.record(UsageKind::MethodCall, line);
                    }
                }
            }
            ExprKind::FieldAccess { target, field } => {
                if let Query::Member { name: wanted, .. } = self.query {
                    if wanted == field && self.receiver_matches(Some(&**target)) {
                        self.record(UsageKind::FieldAccess, line);
                    }
                }
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}
