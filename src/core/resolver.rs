//! Cross-file symbol and type resolution.
//!
//! Names resolve innermost-first: locals in the nearest enclosing block,
//! then parameters, then fields of the enclosing types (inherited ones
//! included), then methods, then type names reachable through the file's
//! own declarations, imports, package and `java.lang`. Anything outside the
//! workspace becomes a synthetic external declaration.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{CodescopeError, Result};
use super::call_graph::MethodKey;
use super::deadline::Deadline;
use super::index::{TypeEntry, WorkspaceIndex};
use super::model::*;
use super::suggest::nearest_names;
use super::type_ref::{ContainerKind, TypeReference};

const JAVA_LANG: &[&str] = &[
    "AutoCloseable", "ArithmeticException", "Boolean", "Byte", "Character", "CharSequence",
    "Class", "ClassCastException", "Cloneable", "Comparable", "Deprecated", "Double", "Enum",
    "Error", "Exception", "Float", "FunctionalInterface", "IllegalArgumentException",
    "IllegalStateException", "IndexOutOfBoundsException", "Integer", "InterruptedException",
    "Iterable", "Long", "Math", "NullPointerException", "Number", "Object", "Override",
    "Record", "Runnable", "RuntimeException", "Short", "String", "StringBuilder",
    "StringBuffer", "SuppressWarnings", "System", "Thread", "Throwable",
    "UnsupportedOperationException", "Void",
];

const BOXED: &[(&str, &str)] = &[
    ("int", "Integer"),
    ("long", "Long"),
    ("short", "Short"),
    ("byte", "Byte"),
    ("char", "Character"),
    ("boolean", "Boolean"),
    ("float", "Float"),
    ("double", "Double"),
];

/// What a type name resolved to.
#[derive(Debug, Clone)]
pub enum TypeTarget {
    Project(TypeEntry),
    External(String),
    Primitive(String),
    Unknown(String),
}

impl TypeTarget {
    pub fn qualified_name(&self) -> &str {
        match self {
            Self::Project(entry) => &entry.decl.qualified_name,
            Self::External(name) | Self::Primitive(name) | Self::Unknown(name) => name,
        }
    }

    pub fn simple_name(&self) -> &str {
        let name = self.qualified_name();
        name.rsplit('.').next().unwrap_or(name)
    }

    pub fn entry(&self) -> Option<&TypeEntry> {
        match self {
            Self::Project(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

/// A method declaration addressed through the type that owns it.
#[derive(Debug, Clone)]
pub struct MethodRef {
    pub entry: TypeEntry,
    pub index: usize,
}

impl MethodRef {
    pub fn method(&self) -> &MethodDecl {
        &self.entry.decl.methods[self.index]
    }

    pub fn key(&self) -> MethodKey {
        let method = self.method();
        MethodKey::new(&self.entry.decl.qualified_name, &method.name, method.arity())
    }

    pub fn location(&self) -> Location {
        Location::new(self.entry.unit.path.clone(), self.method().span)
    }
}

/// Outcome of overload selection.
#[derive(Debug, Clone)]
pub struct Overload {
    pub target: MethodRef,
    pub ambiguous: bool,
    pub candidates: Vec<MethodRef>,
}

/// A type picked by name from a request.
#[derive(Debug, Clone)]
pub struct TypeMatch {
    pub entry: TypeEntry,
    /// Other types sharing the same simple name
    pub alternatives: Vec<String>,
}

/// Where a method body is being analysed from.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'s> {
    pub entry: &'s TypeEntry,
    pub method: Option<&'s MethodDecl>,
}

/// A local variable visible at some line.
#[derive(Debug, Clone)]
pub struct LocalBinding<'b> {
    pub name: &'b str,
    pub ty: Option<&'b TypeReference>,
    pub init: Option<&'b Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolResolution {
    pub name: String,
    pub declaration_kind: DeclarationKind,
    /// Qualified type of the symbol (the type itself for type declarations)
    pub resolved_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_reference: Option<TypeReference>,
    pub declaration_site: Option<Location>,
    pub declaring_type: Option<String>,
    pub is_external: bool,
    pub ambiguous: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Location>,
}

pub struct TypeResolver<'a> {
    index: &'a WorkspaceIndex,
    config: &'a Config,
}

impl<'a> TypeResolver<'a> {
    pub fn new(index: &'a WorkspaceIndex, config: &'a Config) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &'a WorkspaceIndex {
        self.index
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Resolve a type name as written inside `unit`, optionally from within `enclosing`.
    pub fn resolve_type_name(
        &self,
        name: &str,
        unit: &SourceUnit,
        enclosing: Option<&TypeDecl>,
    ) -> TypeTarget {
        let name = name.split('<').next().unwrap_or(name).trim();
        if name.is_empty() || name == "var" || name == "?" {
            return TypeTarget::Unknown(name.to_string());
        }
        if TypeReference::parse(name).is_primitive() {
            return TypeTarget::Primitive(name.to_string());
        }

        if let Some((head, rest)) = name.split_once('.') {
            return self.resolve_dotted_type(name, head, rest, unit, enclosing);
        }

        // Type parameters shadow everything else
        if let Some(decl) = enclosing {
            if self
                .enclosing_decls(decl)
                .iter()
                .any(|d| d.type_parameters.iter().any(|p| p == name))
            {
                return TypeTarget::Unknown(name.to_string());
            }
        }

        // Enclosing types and their members
        if let Some(decl) = enclosing {
            for outer in self.enclosing_decls(decl) {
                if outer.name == name {
                    if let Some(entry) = self.index.lookup(&outer.qualified_name) {
                        return TypeTarget::Project(entry);
                    }
                }
                if let Some(entry) = self.index.lookup(&format!("{}.{}", outer.qualified_name, name)) {
                    return TypeTarget::Project(entry);
                }
            }
        }

        // Declared anywhere in the same file
        if let Some(decl) = unit.all_types().iter().find(|t| t.name == name) {
            if let Some(entry) = self.index.lookup(&decl.qualified_name) {
                return TypeTarget::Project(entry);
            }
        }

        // Single-type imports
        if let Some(import) = unit
            .imports
            .iter()
            .find(|i| !i.is_static && !i.is_wildcard && i.simple_name() == name)
        {
            return match self.index.lookup(&import.path) {
                Some(entry) => TypeTarget::Project(entry),
                None => TypeTarget::External(import.path.clone()),
            };
        }

        // Same package
        if let Some(entry) = self.index.lookup(&unit.qualify(name)) {
            return TypeTarget::Project(entry);
        }

        // Wildcard imports
        let wildcards: Vec<&Import> = unit
            .imports
            .iter()
            .filter(|i| !i.is_static && i.is_wildcard)
            .collect();
        for import in &wildcards {
            if let Some(entry) = self.index.lookup(&format!("{}.{}", import.path, name)) {
                return TypeTarget::Project(entry);
            }
        }

        if JAVA_LANG.contains(&name) {
            return TypeTarget::External(format!("java.lang.{}", name));
        }

        let external: Vec<&&Import> = wildcards
            .iter()
            .filter(|i| !self.config.is_custom_namespace(&i.path))
            .collect();
        if let [only] = external.as_slice() {
            return TypeTarget::External(format!("{}.{}", only.path, name));
        }

        TypeTarget::Unknown(name.to_string())
    }

    fn resolve_dotted_type(
        &self,
        name: &str,
        head: &str,
        rest: &str,
        unit: &SourceUnit,
        enclosing: Option<&TypeDecl>,
    ) -> TypeTarget {
        if let Some(entry) = self.index.lookup(name) {
            return TypeTarget::Project(entry);
        }

        // `Outer.Inner` where `Outer` is itself resolvable
        if starts_uppercase(head) {
            return match self.resolve_type_name(head, unit, enclosing) {
                TypeTarget::Project(entry) => {
                    let nested = format!("{}.{}", entry.decl.qualified_name, rest);
                    match self.index.lookup(&nested) {
                        Some(entry) => TypeTarget::Project(entry),
                        None => TypeTarget::Unknown(nested),
                    }
                }
                TypeTarget::External(qualified) => {
                    TypeTarget::External(format!("{}.{}", qualified, rest))
                }
                _ => TypeTarget::Unknown(name.to_string()),
            };
        }

        if self.config.is_custom_namespace(name) {
            TypeTarget::Unknown(name.to_string())
        } else {
            TypeTarget::External(name.to_string())
        }
    }

    pub fn resolve_type_ref(
        &self,
        ty: &TypeReference,
        unit: &SourceUnit,
        enclosing: Option<&TypeDecl>,
    ) -> TypeTarget {
        self.resolve_type_name(ty.base_name(), unit, enclosing)
    }

    /// Copy of `ty` with `resolved` filled in at every level.
    pub fn annotate(
        &self,
        ty: &TypeReference,
        unit: &SourceUnit,
        enclosing: Option<&TypeDecl>,
    ) -> TypeReference {
        let resolved = match ty.container {
            ContainerKind::Array => None,
            _ => match self.resolve_type_ref(ty, unit, enclosing) {
                TypeTarget::Unknown(_) => None,
                target => Some(target.qualified_name().to_string()),
            },
        };

        TypeReference {
            raw: ty.raw.clone(),
            resolved,
            arguments: ty
                .arguments
                .iter()
                .map(|arg| self.annotate(arg, unit, enclosing))
                .collect(),
            container: ty.container,
        }
    }

    /// `decl` followed by the types lexically enclosing it, innermost first.
    fn enclosing_decls(&self, decl: &TypeDecl) -> Vec<std::sync::Arc<TypeDecl>> {
        let mut out = Vec::new();
        let mut current = self.index.lookup(&decl.qualified_name).map(|e| e.decl);
        while let Some(d) = current {
            current = d
                .enclosing
                .as_ref()
                .and_then(|outer| self.index.lookup(outer))
                .map(|e| e.decl);
            out.push(d);
            if out.len() > 32 {
                break;
            }
        }
        out
    }

    /// `entry` followed by the types lexically enclosing it.
    pub fn enclosing_chain(&self, entry: &TypeEntry) -> Vec<TypeEntry> {
        let mut out = vec![entry.clone()];
        let mut outer = entry.decl.enclosing.clone();
        while let Some(name) = outer {
            match self.index.lookup(&name) {
                Some(e) => {
                    outer = e.decl.enclosing.clone();
                    out.push(e);
                }
                None => break,
            }
        }
        out
    }

    /// Direct supertypes: superclass first, then interfaces in declaration order.
    pub fn supertypes(&self, entry: &TypeEntry) -> Vec<TypeTarget> {
        let decl = &entry.decl;
        decl.superclass
            .iter()
            .chain(decl.interfaces.iter())
            .map(|ty| self.resolve_type_ref(ty, &entry.unit, Some(decl)))
            .collect()
    }

    /// Every supertype reachable from `entry`, breadth-first, each once.
    pub fn ancestors(&self, entry: &TypeEntry) -> Vec<TypeTarget> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(entry.decl.qualified_name.clone());
        let mut queue = vec![entry.clone()];
        let mut out = Vec::new();

        while !queue.is_empty() {
            let current = queue.remove(0);
            for parent in self.supertypes(&current) {
                if !seen.insert(parent.qualified_name().to_string()) {
                    continue;
                }
                if let TypeTarget::Project(parent_entry) = &parent {
                    queue.push(parent_entry.clone());
                }
                out.push(parent);
            }
        }
        out
    }

    /// Superclasses from nearest to farthest, stopping at the first one
    /// outside the workspace.
    pub fn superclass_chain(&self, entry: &TypeEntry) -> Vec<TypeEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(entry.decl.qualified_name.clone());
        let mut out = Vec::new();
        let mut current = entry.clone();

        while let Some(superclass) = &current.decl.superclass {
            let next = match self.resolve_type_ref(superclass, &current.unit, Some(&current.decl)) {
                TypeTarget::Project(next) => next,
                _ => break,
            };
            if !seen.insert(next.decl.qualified_name.clone()) {
                break;
            }
            out.push(next.clone());
            current = next;
        }
        out
    }

    pub fn is_subtype_of(&self, entry: &TypeEntry, qualified_name: &str) -> bool {
        entry.decl.qualified_name == qualified_name
            || self
                .ancestors(entry)
                .iter()
                .any(|a| a.qualified_name() == qualified_name)
    }

    /// A field visible on `entry`, searching superclasses and interfaces.
    pub fn find_field(&self, entry: &TypeEntry, name: &str) -> Option<(TypeEntry, usize)> {
        if let Some(i) = entry.decl.fields.iter().position(|f| f.name == name) {
            return Some((entry.clone(), i));
        }
        self.ancestors(entry).into_iter().find_map(|ancestor| {
            let ancestor = ancestor.entry()?.clone();
            let i = ancestor.decl.fields.iter().position(|f| f.name == name)?;
            Some((ancestor, i))
        })
    }

    /// Methods named `name` visible on `entry`. Declarations in subtypes hide
    /// inherited ones with the same parameter list.
    pub fn find_methods(&self, entry: &TypeEntry, name: &str) -> Vec<MethodRef> {
        let mut out: Vec<MethodRef> = Vec::new();
        let owners = std::iter::once(entry.clone()).chain(
            self.ancestors(entry)
                .into_iter()
                .filter_map(|a| a.entry().cloned()),
        );

        for owner in owners {
            for (index, method) in owner.decl.methods_named(name) {
                if method.is_constructor {
                    continue;
                }
                let params = param_simple_names(method);
                let hidden = out
                    .iter()
                    .any(|existing| param_simple_names(existing.method()) == params);
                if !hidden {
                    out.push(MethodRef {
                        entry: owner.clone(),
                        index,
                    });
                }
            }
        }
        out
    }

    /// Pick one overload for a call: argument count first, then a
    /// structural match of argument types. Ties fall back to source order
    /// and are flagged ambiguous.
    pub fn select_overload(
        &self,
        candidates: Vec<MethodRef>,
        args: &[Expr],
        scope: Option<&Scope>,
    ) -> Option<Overload> {
        let by_arity: Vec<MethodRef> = candidates
            .into_iter()
            .filter(|m| m.method().accepts_arity(args.len()))
            .collect();

        match by_arity.len() {
            0 => return None,
            1 => {
                return Some(Overload {
                    target: by_arity[0].clone(),
                    ambiguous: false,
                    candidates: by_arity,
                })
            }
            _ => {}
        }

        let arg_types: Vec<Option<TypeTarget>> = args
            .iter()
            .map(|arg| scope.and_then(|s| self.infer_expr_type(s, arg)))
            .collect();

        let structural: Vec<MethodRef> = by_arity
            .iter()
            .filter(|m| self.params_accept(m, &arg_types))
            .cloned()
            .collect();

        match structural.as_slice() {
            [only] => Some(Overload {
                target: only.clone(),
                ambiguous: false,
                candidates: by_arity,
            }),
            [first, ..] => Some(Overload {
                target: first.clone(),
                ambiguous: true,
                candidates: structural.clone(),
            }),
            [] => Some(Overload {
                target: by_arity[0].clone(),
                ambiguous: true,
                candidates: by_arity,
            }),
        }
    }

    fn params_accept(&self, method: &MethodRef, arg_types: &[Option<TypeTarget>]) -> bool {
        let decl = method.method();
        arg_types.iter().enumerate().all(|(i, arg)| {
            let arg = match arg {
                Some(arg) if arg.is_known() => arg,
                _ => return true,
            };
            let param = match decl.params.get(i).or_else(|| decl.params.last()) {
                Some(param) => param,
                None => return false,
            };
            let param_ty = if param.varargs && i + 1 >= decl.params.len() {
                param.ty.arguments.first().unwrap_or(&param.ty)
            } else {
                &param.ty
            };
            self.type_accepts(method, param_ty, arg)
        })
    }

    fn type_accepts(&self, method: &MethodRef, param: &TypeReference, arg: &TypeTarget) -> bool {
        let param_name = param.simple_name();
        let arg_name = arg.simple_name();

        if param_name == arg_name || param_name == "Object" {
            return true;
        }
        if method.method().type_parameters.iter().any(|p| p == param_name)
            || method.entry.decl.type_parameters.iter().any(|p| p == param_name)
        {
            return true;
        }
        if BOXED
            .iter()
            .any(|(p, b)| (*p == param_name && *b == arg_name) || (*b == param_name && *p == arg_name))
        {
            return true;
        }
        match arg {
            TypeTarget::Project(entry) => {
                let param_target = self.resolve_type_ref(param, &method.entry.unit, Some(&method.entry.decl));
                self.is_subtype_of(entry, param_target.qualified_name())
            }
            _ => false,
        }
    }

    /// Concrete workspace methods that can receive a call dispatched to `declared`.
    ///
    /// Only types already indexed are considered, so callers that need a
    /// workspace-wide answer scan first.
    pub fn implementations(&self, declared: &MethodRef) -> Vec<MethodRef> {
        let target_type = declared.entry.decl.qualified_name.clone();
        let name = declared.method().name.clone();
        let arity = declared.method().arity();
        let mut out: Vec<MethodRef> = Vec::new();

        for entry in self.index.types_in_source_order() {
            let decl = &entry.decl;
            if decl.is_abstract()
                || decl.kind == TypeKind::Annotation
                || decl.qualified_name == target_type
                || !self.is_subtype_of(&entry, &target_type)
            {
                continue;
            }
            let concrete = self
                .find_methods(&entry, &name)
                .into_iter()
                .find(|m| m.method().arity() == arity && m.method().body.is_some());
            if let Some(found) = concrete {
                if !out.iter().any(|m| m.key() == found.key()) {
                    out.push(found);
                }
            }
        }

        debug!(method = %declared.key(), implementations = out.len(), "dispatch targets");
        out
    }

    /// Static type of an expression, as far as it can be inferred without a
    /// full type checker.
    pub fn infer_expr_type(&self, scope: &Scope, expr: &Expr) -> Option<TypeTarget> {
        self.infer(scope, expr, 0)
    }

    fn infer(&self, scope: &Scope, expr: &Expr, depth: usize) -> Option<TypeTarget> {
        if depth > 16 {
            return None;
        }
        let unit = &scope.entry.unit;
        let decl = &scope.entry.decl;

        match &expr.kind {
            ExprKind::This => Some(TypeTarget::Project(scope.entry.clone())),
            ExprKind::Super => decl
                .superclass
                .as_ref()
                .map(|s| self.resolve_type_ref(s, unit, Some(decl))),
            ExprKind::Name(name) => self.infer_name(scope, name, expr.span.start_line, depth),
            ExprKind::FieldAccess { target, field } => {
                match self.infer(scope, target, depth + 1) {
                    Some(TypeTarget::Project(owner)) => {
                        if let Some((holder, i)) = self.find_field(&owner, field) {
                            let f = &holder.decl.fields[i];
                            return Some(self.resolve_type_ref(&f.ty, &holder.unit, Some(&holder.decl)));
                        }
                        self.index
                            .lookup(&format!("{}.{}", owner.decl.qualified_name, field))
                            .map(TypeTarget::Project)
                    }
                    _ => match self.resolve_type_name(&expr.text, unit, Some(decl)) {
                        TypeTarget::Unknown(_) => None,
                        target => Some(target),
                    },
                }
            }
            ExprKind::Call { target, name, args } => {
                let receiver = match target {
                    None => Some(TypeTarget::Project(scope.entry.clone())),
                    Some(t) => self.infer(scope, t, depth + 1),
                };
                let owner = match receiver? {
                    TypeTarget::Project(owner) => owner,
                    _ => return None,
                };
                let overload = self.select_overload(self.find_methods(&owner, name), args, Some(scope))?;
                let method = overload.target.method();
                let return_type = method.return_type.as_ref()?;
                if method.type_parameters.iter().any(|p| p == return_type.base_name()) {
                    return None;
                }
                let holder = &overload.target.entry;
                match self.resolve_type_ref(return_type, &holder.unit, Some(&holder.decl)) {
                    TypeTarget::Unknown(_) => None,
                    target => Some(target),
                }
            }
            ExprKind::New { ty, .. } | ExprKind::Cast { ty, .. } => {
                match self.resolve_type_ref(ty, unit, Some(decl)) {
                    TypeTarget::Unknown(_) => None,
                    target => Some(target),
                }
            }
            ExprKind::Literal(kind) => match kind {
                LiteralKind::String => Some(TypeTarget::External("java.lang.String".to_string())),
                LiteralKind::Class => Some(TypeTarget::External("java.lang.Class".to_string())),
                LiteralKind::Char => Some(TypeTarget::Primitive("char".to_string())),
                LiteralKind::Integer => Some(TypeTarget::Primitive("int".to_string())),
                LiteralKind::Float => Some(TypeTarget::Primitive("double".to_string())),
                LiteralKind::Boolean => Some(TypeTarget::Primitive("boolean".to_string())),
                LiteralKind::Null => None,
            },
            ExprKind::Conditional { then_expr, .. } => self.infer(scope, then_expr, depth + 1),
            ExprKind::Composite(children) if children.len() == 1 => {
                self.infer(scope, &children[0], depth + 1)
            }
            _ => None,
        }
    }

    fn infer_name(&self, scope: &Scope, name: &str, line: usize, depth: usize) -> Option<TypeTarget> {
        let unit = &scope.entry.unit;
        let decl = &scope.entry.decl;

        if let Some(method) = scope.method {
            if let Some(body) = &method.body {
                let locals = visible_locals(body, line);
                if let Some(local) = locals.iter().rev().find(|l| l.name == name) {
                    return match local.ty {
                        Some(ty) if ty.raw != "var" => Some(self.resolve_type_ref(ty, unit, Some(decl))),
                        _ => local.init.and_then(|init| self.infer(scope, init, depth + 1)),
                    };
                }
            }
            if let Some(param) = method.params.iter().find(|p| p.name == name) {
                return Some(self.resolve_type_ref(&param.ty, unit, Some(decl)));
            }
        }

        for scope_entry in self.enclosing_chain(scope.entry) {
            if let Some((holder, i)) = self.find_field(&scope_entry, name) {
                let field = &holder.decl.fields[i];
                return Some(self.resolve_type_ref(&field.ty, &holder.unit, Some(&holder.decl)));
            }
        }

        if starts_uppercase(name) {
            return match self.resolve_type_name(name, unit, Some(decl)) {
                TypeTarget::Unknown(_) => None,
                target => Some(target),
            };
        }
        None
    }

    /// Find a type named in a request. Qualified names are looked up
    /// directly; simple names pick the first indexed declaration and report
    /// the others as alternatives. Falling back to a full scan counts
    /// against `deadline`.
    pub fn find_type(&self, name: &str, deadline: &Deadline) -> Result<TypeMatch> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CodescopeError::InvalidRequest("type name must not be empty".to_string()));
        }

        if let Some(entry) = self.index.lookup(name) {
            return Ok(TypeMatch {
                entry,
                alternatives: Vec::new(),
            });
        }

        let simple = name.rsplit('.').next().unwrap_or(name);
        let mut matches = self.index.lookup_simple(simple);
        if matches.is_empty() {
            // Declared in a file not named after it
            deadline.check()?;
            self.index.scan_all(deadline)?;
            if let Some(entry) = self.index.lookup(name) {
                return Ok(TypeMatch {
                    entry,
                    alternatives: Vec::new(),
                });
            }
            matches = self.index.lookup_simple(simple);
        }

        // A qualified query must match by suffix
        if name.contains('.') {
            matches.retain(|e| e.decl.qualified_name.ends_with(name));
        }

        let mut iter = matches.into_iter();
        match iter.next() {
            Some(entry) => Ok(TypeMatch {
                entry,
                alternatives: iter.map(|e| e.decl.qualified_name.clone()).collect(),
            }),
            None => {
                let known = self.index.type_names();
                Err(CodescopeError::symbol_not_found(
                    name,
                    nearest_names(name, known.iter().map(String::as_str)),
                ))
            }
        }
    }

    /// Find a method on a type, optionally pinned to an arity.
    pub fn find_method(&self, entry: &TypeEntry, name: &str, arity: Option<usize>) -> Result<Overload> {
        let candidates: Vec<MethodRef> = if name == entry.decl.name || name == "<init>" {
            entry
                .decl
                .methods
                .iter()
                .enumerate()
                .filter(|(_, m)| m.is_constructor)
                .map(|(index, _)| MethodRef {
                    entry: entry.clone(),
                    index,
                })
                .collect()
        } else {
            self.find_methods(entry, name)
        };

        let matching: Vec<MethodRef> = candidates
            .into_iter()
            .filter(|m| arity.map_or(true, |a| m.method().arity() == a))
            .collect();

        match matching.first() {
            Some(first) => Ok(Overload {
                target: first.clone(),
                ambiguous: matching.len() > 1,
                candidates: matching.clone(),
            }),
            None => {
                let mut names: Vec<String> = entry.decl.methods.iter().map(|m| m.name.clone()).collect();
                for ancestor in self.ancestors(entry) {
                    if let Some(a) = ancestor.entry() {
                        names.extend(a.decl.methods.iter().map(|m| m.name.clone()));
                    }
                }
                names.dedup();
                let query = format!("{}.{}", entry.decl.qualified_name, name);
                Err(CodescopeError::symbol_not_found(
                    query,
                    nearest_names(name, names.iter().map(String::as_str))
                        .into_iter()
                        .map(|m| format!("{}.{}", entry.decl.qualified_name, m))
                        .collect(),
                ))
            }
        }
    }

    /// Resolve `name` as seen from `file`, at `line` when given.
    pub fn resolve_symbol(&self, name: &str, file: &Path, line: Option<usize>) -> Result<SymbolResolution> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CodescopeError::InvalidRequest("symbol name must not be empty".to_string()));
        }

        let unit = self.index.open_file(file)?;
        let enclosing = match line {
            Some(l) => unit.type_at_line(l),
            None => unit.primary_type(),
        };
        let enclosing_entry = enclosing.as_ref().map(|decl| TypeEntry {
            decl: decl.clone(),
            unit: unit.clone(),
        });

        debug!(symbol = name, file = %unit.path.display(), line = ?line, "resolving symbol");

        // Locals and parameters of the method covering the line
        if let (Some(line), Some(entry)) = (line, &enclosing_entry) {
            if let Some(method) = entry.decl.methods.iter().find(|m| m.span.contains_line(line)) {
                let scope = Scope {
                    entry,
                    method: Some(method),
                };
                if let Some(body) = &method.body {
                    let locals = visible_locals(body, line);
                    if let Some(local) = locals.iter().rev().find(|l| l.name == name) {
                        return Ok(self.local_resolution(&scope, local));
                    }
                }
                if let Some(param) = method.params.iter().find(|p| p.name == name) {
                    return Ok(self.param_resolution(entry, param));
                }
            }
        }

        if name.contains('.') {
            return self.resolve_qualified_symbol(name, &unit, enclosing_entry.as_ref(), file, line);
        }

        if let Some(entry) = &enclosing_entry {
            let chain = self.enclosing_chain(entry);
            for scope_entry in &chain {
                if let Some((holder, i)) = self.find_field(scope_entry, name) {
                    return Ok(self.field_resolution(&holder, i));
                }
            }
            for scope_entry in &chain {
                let methods = self.find_methods(scope_entry, name);
                if !methods.is_empty() {
                    return Ok(self.method_resolution(methods));
                }
            }
        }

        match self.resolve_type_name(name, &unit, enclosing.as_deref()) {
            TypeTarget::Project(entry) => return Ok(self.type_resolution(&entry)),
            TypeTarget::External(qualified) => return Ok(external_resolution(name, DeclarationKind::Type, Some(qualified))),
            _ => {}
        }

        if let Some(found) = self.resolve_static_import(name, &unit) {
            return Ok(found);
        }

        Err(self.not_found(name, &unit, enclosing_entry.as_ref(), line))
    }

    fn resolve_qualified_symbol(
        &self,
        name: &str,
        unit: &std::sync::Arc<SourceUnit>,
        enclosing: Option<&TypeEntry>,
        file: &Path,
        line: Option<usize>,
    ) -> Result<SymbolResolution> {
        let enclosing_decl = enclosing.map(|e| e.decl.as_ref());
        match self.resolve_type_name(name, unit, enclosing_decl) {
            TypeTarget::Project(entry) => return Ok(self.type_resolution(&entry)),
            TypeTarget::External(qualified) if starts_uppercase(member_of(name)) => {
                return Ok(external_resolution(name, DeclarationKind::Type, Some(qualified)));
            }
            _ => {}
        }

        let (owner_name, member) = name.rsplit_once('.').unwrap_or(("", name));

        // Owner is a type, or a variable whose type we can find
        let owner = match self.resolve_type_name(owner_name, unit, enclosing_decl) {
            TypeTarget::Unknown(_) => match self.resolve_symbol(owner_name, file, line) {
                Ok(symbol) => match symbol.resolved_type {
                    Some(t) => match self.index.lookup(&t) {
                        Some(entry) => TypeTarget::Project(entry),
                        None => TypeTarget::External(t),
                    },
                    None => TypeTarget::Unknown(owner_name.to_string()),
                },
                Err(_) => TypeTarget::Unknown(owner_name.to_string()),
            },
            target => target,
        };

        match owner {
            TypeTarget::Project(entry) => {
                if let Some((holder, i)) = self.find_field(&entry, member) {
                    return Ok(self.field_resolution(&holder, i));
                }
                let methods = self.find_methods(&entry, member);
                if !methods.is_empty() {
                    return Ok(self.method_resolution(methods));
                }
                if entry.decl.enum_constants.iter().any(|c| c == member) {
                    let mut resolution = self.type_resolution(&entry);
                    resolution.name = member.to_string();
                    resolution.declaration_kind = DeclarationKind::Field;
                    resolution.declaring_type = Some(entry.decl.qualified_name.clone());
                    return Ok(resolution);
                }
                Err(self.not_found(name, unit, Some(&entry), None))
            }
            TypeTarget::External(qualified) => {
                let mut resolution = external_resolution(name, DeclarationKind::Field, None);
                resolution.declaring_type = Some(qualified);
                Ok(resolution)
            }
            _ => Err(self.not_found(name, unit, enclosing, line)),
        }
    }

    fn resolve_static_import(&self, name: &str, unit: &SourceUnit) -> Option<SymbolResolution> {
        for import in unit.imports.iter().filter(|i| i.is_static) {
            let owner = if import.is_wildcard {
                import.path.as_str()
            } else if import.simple_name() == name {
                import.path.rsplit_once('.').map(|(o, _)| o)?
            } else {
                continue;
            };

            match self.index.lookup(owner) {
                Some(entry) => {
                    if let Some((holder, i)) = self.find_field(&entry, name) {
                        return Some(self.field_resolution(&holder, i));
                    }
                    let methods = self.find_methods(&entry, name);
                    if !methods.is_empty() {
                        return Some(self.method_resolution(methods));
                    }
                }
                None if !import.is_wildcard => {
                    let kind = if name.chars().all(|c| c.is_uppercase() || c == '_' || c.is_ascii_digit()) {
                        DeclarationKind::Field
                    } else {
                        DeclarationKind::Method
                    };
                    let mut resolution = external_resolution(name, kind, None);
                    resolution.declaring_type = Some(owner.to_string());
                    return Some(resolution);
                }
                None => {}
            }
        }
        None
    }

    fn not_found(
        &self,
        name: &str,
        unit: &SourceUnit,
        enclosing: Option<&TypeEntry>,
        line: Option<usize>,
    ) -> CodescopeError {
        let mut candidates: Vec<String> = Vec::new();

        if let Some(entry) = enclosing {
            if let Some(line) = line {
                if let Some(method) = entry.decl.methods.iter().find(|m| m.span.contains_line(line)) {
                    candidates.extend(method.params.iter().map(|p| p.name.clone()));
                    if let Some(body) = &method.body {
                        candidates.extend(visible_locals(body, line).iter().map(|l| l.name.to_string()));
                    }
                }
            }
            for scope_entry in self.enclosing_chain(entry) {
                candidates.extend(scope_entry.decl.fields.iter().map(|f| f.name.clone()));
                candidates.extend(scope_entry.decl.methods.iter().map(|m| m.name.clone()));
            }
        }
        candidates.extend(unit.imports.iter().map(|i| i.simple_name().to_string()));
        candidates.extend(self.index.type_names());
        candidates.sort();
        candidates.dedup();

        CodescopeError::symbol_not_found(name, nearest_names(name, candidates.iter().map(String::as_str)))
    }

    fn type_of(&self, ty: &TypeReference, entry: &TypeEntry) -> (Option<String>, TypeReference) {
        let annotated = self.annotate(ty, &entry.unit, Some(&entry.decl));
        let resolved = match self.resolve_type_ref(ty, &entry.unit, Some(&entry.decl)) {
            TypeTarget::Unknown(raw) => Some(raw),
            target => Some(target.qualified_name().to_string()),
        };
        (resolved, annotated)
    }

    fn local_resolution(&self, scope: &Scope, local: &LocalBinding) -> SymbolResolution {
        let (resolved_type, type_reference) = match local.ty {
            Some(ty) if ty.raw != "var" => {
                let (resolved, annotated) = self.type_of(ty, scope.entry);
                (resolved, Some(annotated))
            }
            _ => (
                local
                    .init
                    .and_then(|init| self.infer_expr_type(scope, init))
                    .map(|t| t.qualified_name().to_string()),
                None,
            ),
        };

        SymbolResolution {
            name: local.name.to_string(),
            declaration_kind: DeclarationKind::LocalVariable,
            resolved_type,
            type_reference,
            declaration_site: Some(Location::new(scope.entry.unit.path.clone(), local.span)),
            declaring_type: Some(scope.entry.decl.qualified_name.clone()),
            is_external: false,
            ambiguous: false,
            candidates: Vec::new(),
        }
    }

    fn param_resolution(&self, entry: &TypeEntry, param: &Param) -> SymbolResolution {
        let (resolved_type, type_reference) = self.type_of(&param.ty, entry);
        SymbolResolution {
            name: param.name.clone(),
            declaration_kind: DeclarationKind::Parameter,
            resolved_type,
            type_reference: Some(type_reference),
            declaration_site: Some(Location::new(entry.unit.path.clone(), param.span)),
            declaring_type: Some(entry.decl.qualified_name.clone()),
            is_external: false,
            ambiguous: false,
            candidates: Vec::new(),
        }
    }

    fn field_resolution(&self, holder: &TypeEntry, index: usize) -> SymbolResolution {
        let field = &holder.decl.fields[index];
        let (resolved_type, type_reference) = self.type_of(&field.ty, holder);
        SymbolResolution {
            name: field.name.clone(),
            declaration_kind: DeclarationKind::Field,
            resolved_type,
            type_reference: Some(type_reference),
            declaration_site: Some(Location::new(holder.unit.path.clone(), field.span)),
            declaring_type: Some(holder.decl.qualified_name.clone()),
            is_external: false,
            ambiguous: false,
            candidates: Vec::new(),
        }
    }

    fn method_resolution(&self, methods: Vec<MethodRef>) -> SymbolResolution {
        let first = &methods[0];
        let method = first.method();
        let (resolved_type, type_reference) = match &method.return_type {
            Some(rt) => {
                let (resolved, annotated) = self.type_of(rt, &first.entry);
                (resolved, Some(annotated))
            }
            None => (Some(first.entry.decl.qualified_name.clone()), None),
        };
        let ambiguous = methods.len() > 1;

        SymbolResolution {
            name: method.name.clone(),
            declaration_kind: DeclarationKind::Method,
            resolved_type,
            type_reference,
            declaration_site: Some(first.location()),
            declaring_type: Some(first.entry.decl.qualified_name.clone()),
            is_external: false,
            ambiguous,
            candidates: if ambiguous {
                methods.iter().map(MethodRef::location).collect()
            } else {
                Vec::new()
            },
        }
    }

    fn type_resolution(&self, entry: &TypeEntry) -> SymbolResolution {
        SymbolResolution {
            name: entry.decl.name.clone(),
            declaration_kind: DeclarationKind::Type,
            resolved_type: Some(entry.decl.qualified_name.clone()),
            type_reference: None,
            declaration_site: Some(Location::new(entry.unit.path.clone(), entry.decl.span)),
            declaring_type: entry.decl.enclosing.clone(),
            is_external: false,
            ambiguous: false,
            candidates: Vec::new(),
        }
    }
}

fn external_resolution(name: &str, kind: DeclarationKind, resolved_type: Option<String>) -> SymbolResolution {
    SymbolResolution {
        name: name.to_string(),
        declaration_kind: kind,
        resolved_type,
        type_reference: None,
        declaration_site: None,
        declaring_type: None,
        is_external: true,
        ambiguous: false,
        candidates: Vec::new(),
    }
}

fn member_of(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().map_or(false, char::is_uppercase)
}

fn param_simple_names(method: &MethodDecl) -> Vec<&str> {
    method.params.iter().map(|p| p.ty.simple_name()).collect()
}

/// Locals in scope at `line`, outermost first. Later entries shadow earlier ones.
pub fn visible_locals(body: &Block, line: usize) -> Vec<LocalBinding<'_>> {
    let mut walker = ScopeWalker {
        line,
        out: Vec::new(),
    };
    walker.block(body);
    walker.out
}

struct ScopeWalker<'b> {
    line: usize,
    out: Vec<LocalBinding<'b>>,
}

impl<'b> ScopeWalker<'b> {
    fn covers(&self, span: Span) -> bool {
        span.contains_line(self.line)
    }

    fn block(&mut self, block: &'b Block) {
        if self.covers(block.span) {
            self.stmts(&block.stmts);
        }
    }

    fn stmts(&mut self, stmts: &'b [Stmt]) {
        for stmt in stmts {
            if stmt.span.start_line > self.line {
                break;
            }
            match &stmt.kind {
                StmtKind::LocalVar(local) => self.declare(local),
                _ if self.covers(stmt.span) => self.stmt(stmt),
                _ => {}
            }
        }
    }

    fn declare(&mut self, local: &'b LocalVar) {
        for declarator in &local.declarators {
            if declarator.span.start_line > self.line {
                continue;
            }
            if let Some(init) = &declarator.init {
                self.expr(init);
            }
            self.out.push(LocalBinding {
                name: &declarator.name,
                ty: Some(&local.ty),
                init: declarator.init.as_ref(),
                span: declarator.span,
            });
        }
    }

    fn bind(&mut self, binding: &'b Binding) {
        self.out.push(LocalBinding {
            name: &binding.name,
            ty: binding.ty.as_ref(),
            init: None,
            span: binding.span,
        });
    }

    fn sub(&mut self, stmt: &'b Stmt) {
        if self.covers(stmt.span) {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &'b Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block),
            StmtKind::LocalVar(local) => self.declare(local),
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::Yield(e) => self.expr(e),
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.expr(e);
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition);
                self.sub(then_branch);
                if let Some(else_branch) = else_branch {
                    self.sub(else_branch);
                }
            }
            StmtKind::Switch(switch) => self.switch(switch),
            StmtKind::Try(try_stmt) => {
                for resource in &try_stmt.resources {
                    if let Some(init) = &resource.init {
                        self.expr(init);
                    }
                    if let Some(binding) = &resource.binding {
                        if binding.span.start_line <= self.line {
                            self.out.push(LocalBinding {
                                name: &binding.name,
                                ty: binding.ty.as_ref(),
                                init: resource.init.as_ref(),
                                span: binding.span,
                            });
                        }
                    }
                }
                self.block(&try_stmt.body);
                for catch in &try_stmt.catches {
                    if self.covers(catch.body.span) {
                        self.bind(&catch.param);
                        self.block(&catch.body);
                    }
                }
                if let Some(finally) = &try_stmt.finally {
                    self.block(finally);
                }
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.stmts(init);
                if let Some(condition) = condition {
                    self.expr(condition);
                }
                for u in update {
                    self.expr(u);
                }
                self.sub(body);
            }
            StmtKind::ForEach { var, iterable, body } => {
                self.expr(iterable);
                self.bind(var);
                self.sub(body);
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.expr(condition);
                self.sub(body);
            }
            StmtKind::Labeled { body, .. } => self.sub(body),
            StmtKind::Synchronized { lock, body } => {
                self.expr(lock);
                self.block(body);
            }
            StmtKind::Other(exprs) => {
                for e in exprs {
                    self.expr(e);
                }
            }
        }
    }

    fn switch(&mut self, switch: &'b SwitchBlock) {
        self.expr(&switch.subject);
        for arm in &switch.arms {
            if self.covers(arm.span) {
                self.stmts(&arm.body);
            }
        }
    }

    fn expr(&mut self, expr: &'b Expr) {
        if !self.covers(expr.span) {
            return;
        }
        match &expr.kind {
            ExprKind::Lambda { params, body } => {
                for param in params {
                    self.bind(param);
                }
                match body {
                    LambdaBody::Expr(e) => self.expr(e),
                    LambdaBody::Block(b) => self.block(b),
                }
            }
            ExprKind::Call { target, args, .. } => {
                if let Some(t) = target {
                    self.expr(t);
                }
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::New { args, .. } => {
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::FieldAccess { target, .. } => self.expr(target),
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expr(condition);
                self.expr(then_expr);
                self.expr(else_expr);
            }
            ExprKind::Switch(switch) => self.switch(switch),
            ExprKind::Cast { expr, .. } => self.expr(expr),
            ExprKind::Composite(children) => {
                for c in children {
                    self.expr(c);
                }
            }
            ExprKind::Name(_) | ExprKind::Literal(_) | ExprKind::This | ExprKind::Super => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::core::languages::{JavaParser, LanguageParser};

    fn indexed(files: &[(&str, &str)]) -> (tempfile::TempDir, WorkspaceIndex, Config) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let config = Config::default();
        let index = WorkspaceIndex::new(dir.path(), &config);
        (dir, index, config)
    }

    fn parse(source: &str) -> SourceUnit {
        JavaParser::new()
            .unwrap()
            .parse(source, Path::new("Sample.java"))
            .unwrap()
    }

    #[test]
    fn test_visible_locals_respect_blocks_and_lines() {
        let unit = parse(
            "class A {\n\
             void run(int n) {\n\
                 int total = 0;\n\
                 for (int i = 0; i < n; i++) {\n\
                     int step = i;\n\
                     total += step;\n\
                 }\n\
                 String after = \"x\";\n\
             }\n\
             }\n",
        );
        let body = unit.types[0].methods[0].body.as_ref().unwrap();

        let in_loop: Vec<&str> = visible_locals(body, 6).iter().map(|l| l.name).collect();
        assert_eq!(in_loop, vec!["total", "i", "step"]);

        let after_loop: Vec<&str> = visible_locals(body, 8).iter().map(|l| l.name).collect();
        assert_eq!(after_loop, vec!["total", "after"]);
    }

    #[test]
    fn test_catch_and_lambda_parameters_are_scoped() {
        let unit = parse(
            "class A {\n\
             void run() {\n\
                 try {\n\
                     work();\n\
                 } catch (Exception e) {\n\
                     log(e);\n\
                 }\n\
                 items.forEach(item -> {\n\
                     use(item);\n\
                 });\n\
             }\n\
             }\n",
        );
        let body = unit.types[0].methods[0].body.as_ref().unwrap();

        let in_catch: Vec<&str> = visible_locals(body, 6).iter().map(|l| l.name).collect();
        assert_eq!(in_catch, vec!["e"]);
        let in_try: Vec<&str> = visible_locals(body, 4).iter().map(|l| l.name).collect();
        assert!(in_try.is_empty());
        let in_lambda: Vec<&str> = visible_locals(body, 9).iter().map(|l| l.name).collect();
        assert_eq!(in_lambda, vec!["item"]);
    }

    #[test]
    fn test_fallback_scan_stops_at_deadline() {
        let (_dir, index, config) = indexed(&[
            ("s/Order.java", "package s; class Order {}"),
            ("s/Helpers.java", "package s; class Helpers {} class Hidden {}"),
        ]);
        let resolver = TypeResolver::new(&index, &config);
        let expired = Deadline::after(Duration::ZERO);

        // Found by file name, no scan needed
        assert!(resolver.find_type("s.Order", &expired).is_ok());

        let err = resolver.find_type("Hidden", &expired).unwrap_err();
        assert_eq!(err.kind(), "timeout");

        let found = resolver.find_type("Hidden", &Deadline::unbounded()).unwrap();
        assert_eq!(found.entry.decl.qualified_name, "s.Hidden");
    }

    #[test]
    fn test_overload_tie_is_flagged_ambiguous() {
        let (_dir, index, config) = indexed(&[(
            "s/Notifier.java",
            "package s;\n\
             class Notifier {\n\
                 void send(Object message) {}\n\
                 void send(CharSequence message) {}\n\
                 void send(int code, String text) {}\n\
                 void run() { send(lookup()); }\n\
             }\n",
        )]);
        let resolver = TypeResolver::new(&index, &config);
        let entry = index.lookup("s.Notifier").unwrap();
        let run = entry.decl.methods.iter().find(|m| m.name == "run").unwrap();
        let calls = collect_calls(run.body.as_ref().unwrap());
        let args = calls
            .iter()
            .find_map(|call| match &call.kind {
                ExprKind::Call { name, args, .. } if name == "send" => Some(args),
                _ => None,
            })
            .unwrap();

        let scope = Scope {
            entry: &entry,
            method: Some(run),
        };
        let overload = resolver
            .select_overload(resolver.find_methods(&entry, "send"), args, Some(&scope))
            .unwrap();

        assert!(overload.ambiguous);
        assert_eq!(overload.candidates.len(), 2);
        assert_eq!(overload.target.method().params[0].ty.raw, "Object");
    }
}
