// src/core/endpoints/flow.rs - Route to handler to persistence flow
use std::collections::HashSet;
use serde::{Serialize, Deserialize};

use super::super::call_graph::{CallEdge, CallNode, CallTrace, EdgeKind, MethodKey};
use super::super::dependencies::is_persistence_name;
use super::super::resolver::{TypeResolver, TypeTarget};
use super::super::shape::TypeTag;
use super::route_index::{HttpVerb, RouteMatch};
use crate::error::ParseFailure;

const CREATE_PREFIXES: &[&str] = &["save", "insert", "create", "persist", "add", "store"];
const READ_PREFIXES: &[&str] = &[
    "find", "get", "read", "load", "fetch", "query", "search", "count", "exists", "select", "list", "stream",
];
const UPDATE_PREFIXES: &[&str] = &["update", "merge", "modify", "patch", "upsert", "set"];
const DELETE_PREFIXES: &[&str] = &["delete", "remove", "purge", "erase"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl CrudOperation {
    /// Classify a method name by its leading word.
    pub fn from_method_name(name: &str) -> Option<Self> {
        let table: [(&[&str], Self); 4] = [
            (CREATE_PREFIXES, Self::Create),
            (READ_PREFIXES, Self::Read),
            (UPDATE_PREFIXES, Self::Update),
            (DELETE_PREFIXES, Self::Delete),
        ];
        table
            .iter()
            .find(|(prefixes, _)| prefixes.iter().any(|p| starts_with_word(name, p)))
            .map(|(_, op)| *op)
    }
}

/// `findById` starts with the word `find`; `finder` does not.
fn starts_with_word(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()),
        None => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceOperation {
    pub operation: CrudOperation,
    /// `Repository.method`
    pub method: String,
    pub repository_type: String,
    pub caller: MethodKey,
    pub line: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTouch {
    pub type_name: String,
    pub tag: TypeTag,
    pub operations: Vec<CrudOperation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointFlow {
    pub verb: HttpVerb,
    pub path: String,
    /// Every matching handler, most specific first
    pub matches: Vec<RouteMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<MethodKey>,
    /// Workspace methods reached below the handler, in first-call order
    pub business_logic: Vec<MethodKey>,
    pub persistence_operations: Vec<PersistenceOperation>,
    pub entities: Vec<EntityTouch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_trace: Option<CallTrace>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ParseFailure>,
}

/// Stitch business-logic steps, persistence operations and touched entities
/// out of the handler's traced call graph.
pub fn compose_flow(
    resolver: &TypeResolver,
    verb: HttpVerb,
    path: &str,
    matches: Vec<RouteMatch>,
    trace: Option<CallTrace>,
    warnings: Vec<ParseFailure>,
) -> EndpointFlow {
    let mut business_logic: Vec<MethodKey> = Vec::new();
    let mut persistence_operations: Vec<PersistenceOperation> = Vec::new();
    let mut entities: Vec<EntityTouch> = Vec::new();

    if let Some(trace) = &trace {
        let mut stopped = HashSet::new();
        terminal_callees(&trace.root, &mut stopped);

        for edge in &trace.edges {
            let terminal = edge.callee.as_ref().map_or(true, |callee| stopped.contains(callee));
            if let Some(op) = terminal.then(|| persistence_operation(resolver, edge)).flatten() {
                for entity in &op.entities {
                    record_entity(resolver, &mut entities, entity, op.operation);
                }
                persistence_operations.push(op);
                continue;
            }
            if let Some(callee) = &edge.callee {
                let in_workspace = resolver.index().lookup(&callee.declaring_type).is_some();
                let step = edge.kind != EdgeKind::Unresolved && in_workspace;
                if step && edge.depth >= 1 && !business_logic.contains(callee) {
                    business_logic.push(callee.clone());
                }
            }
        }
    }

    EndpointFlow {
        verb,
        path: path.to_string(),
        handler: matches.first().map(|m| m.route.handler.clone()),
        matches,
        business_logic,
        persistence_operations,
        entities,
        call_trace: trace,
        warnings,
    }
}

/// Callees the trace stopped at without expanding: boundary hits,
/// unresolved or undecidable dispatch, empty bodies.
fn terminal_callees(node: &CallNode, out: &mut HashSet<MethodKey>) {
    if let (Some(marker), Some(key)) = (node.terminal, &node.key) {
        if marker.is_leaf() {
            out.insert(key.clone());
        }
    }
    for child in &node.children {
        terminal_callees(child, out);
    }
}

/// A terminal call is persistence-shaped when it goes through a repository-named
/// type and its name starts with a CRUD verb.
fn persistence_operation(resolver: &TypeResolver, edge: &CallEdge) -> Option<PersistenceOperation> {
    let receiver = edge
        .receiver_type
        .clone()
        .or_else(|| edge.callee.as_ref().map(|c| c.declaring_type.clone()))?;
    let simple = receiver.rsplit('.').next().unwrap_or(&receiver);
    if !is_persistence_name(simple) {
        return None;
    }
    let operation = CrudOperation::from_method_name(&edge.callee_name)?;

    Some(PersistenceOperation {
        operation,
        method: format!("{}.{}", simple, edge.callee_name),
        entities: repository_entities(resolver, &receiver),
        repository_type: receiver,
        caller: edge.caller.clone(),
        line: edge.line,
    })
}

/// Entity-like types named in the repository's supertype arguments,
/// e.g. `Order` in `JpaRepository<Order, Long>`.
fn repository_entities(resolver: &TypeResolver, repository: &str) -> Vec<String> {
    let Some(entry) = resolver.index().lookup(repository) else {
        return Vec::new();
    };
    let decl = &entry.decl;
    let mut out: Vec<String> = Vec::new();

    for supertype in decl.superclass.iter().chain(decl.interfaces.iter()) {
        for argument in &supertype.arguments {
            if let TypeTarget::Project(found) = resolver.resolve_type_ref(argument, &entry.unit, Some(decl)) {
                let name = found.decl.qualified_name.clone();
                if TypeTag::of(&found.decl) == TypeTag::EntityLike && !out.contains(&name) {
                    out.push(name);
                }
            }
        }
    }
    out
}

fn record_entity(resolver: &TypeResolver, entities: &mut Vec<EntityTouch>, name: &str, operation: CrudOperation) {
    if let Some(existing) = entities.iter_mut().find(|e| e.type_name == name) {
        if !existing.operations.contains(&operation) {
            existing.operations.push(operation);
        }
        return;
    }
    let tag = resolver
        .index()
        .lookup(name)
        .map(|e| TypeTag::of(&e.decl))
        .unwrap_or(TypeTag::Plain);
    entities.push(EntityTouch {
        type_name: name.to_string(),
        tag,
        operations: vec![operation],
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_prefixes() {
        assert_eq!(CrudOperation::from_method_name("save"), Some(CrudOperation::Create));
        assert_eq!(CrudOperation::from_method_name("findById"), Some(CrudOperation::Read));
        assert_eq!(CrudOperation::from_method_name("existsByEmail"), Some(CrudOperation::Read));
        assert_eq!(CrudOperation::from_method_name("updateStatus"), Some(CrudOperation::Update));
        assert_eq!(CrudOperation::from_method_name("deleteAll"), Some(CrudOperation::Delete));
        assert_eq!(CrudOperation::from_method_name("finder"), None);
        assert_eq!(CrudOperation::from_method_name("recalculate"), None);
    }
}
