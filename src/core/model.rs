//! Owned syntax model for one parsed source file.
//!
//! The tree-sitter concrete syntax tree is lowered into these types by
//! [`JavaParser`](super::languages::JavaParser). A [`SourceUnit`] owns every
//! node below it; back-references to enclosing declarations are stored as
//! qualified names so nothing points across ownership boundaries.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::type_ref::TypeReference;

/// Source position of a node. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    #[serde(skip)]
    pub start_byte: usize,
    #[serde(skip)]
    pub end_byte: usize,
}

impl Span {
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A file-qualified line range, used in every result that points back at source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            file: file.into(),
            start_line: span.start_line,
            end_line: span.end_line,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.start_line)
    }
}

/// One parsed file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<Arc<TypeDecl>>,
    pub source: String,
    pub content_hash: String,
}

impl SourceUnit {
    /// Qualified name for a top-level type declared in this file.
    pub fn qualify(&self, simple_name: &str) -> String {
        match &self.package {
            Some(pkg) if !pkg.is_empty() => format!("{}.{}", pkg, simple_name),
            _ => simple_name.to_string(),
        }
    }

    /// Raw source covered by a span.
    pub fn text(&self, span: Span) -> &str {
        self.source
            .get(span.start_byte..span.end_byte)
            .unwrap_or_default()
    }

    /// All types in the file, nested ones included, in source order.
    pub fn all_types(&self) -> Vec<Arc<TypeDecl>> {
        fn collect(decl: &Arc<TypeDecl>, out: &mut Vec<Arc<TypeDecl>>) {
            out.push(decl.clone());
            for nested in &decl.nested {
                collect(nested, out);
            }
        }

        let mut out = Vec::new();
        for decl in &self.types {
            collect(decl, &mut out);
        }
        out
    }

    /// Innermost type whose body covers `line`.
    pub fn type_at_line(&self, line: usize) -> Option<Arc<TypeDecl>> {
        self.all_types()
            .into_iter()
            .filter(|t| t.span.contains_line(line))
            .min_by_key(|t| t.span.line_count())
    }

    /// The type the file is named after, falling back to the first declared one.
    pub fn primary_type(&self) -> Option<Arc<TypeDecl>> {
        let stem = self.path.file_stem().and_then(|s| s.to_str());
        self.types
            .iter()
            .find(|t| Some(t.name.as_str()) == stem)
            .or_else(|| self.types.first())
            .cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Dotted path without the trailing `.*`
    pub path: String,
    pub is_static: bool,
    pub is_wildcard: bool,
    pub line: usize,
}

impl Import {
    /// Last segment of the imported path.
    pub fn simple_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Annotation as a uniform record, inspected by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Simple name without `@`
    pub name: String,
    pub raw: String,
    /// Parsed `key = value` pairs; a lone positional value is stored under `value`.
    /// Array values are flattened, string literals are unquoted.
    pub arguments: BTreeMap<String, Vec<String>>,
}

impl Annotation {
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn values(&self, key: &str) -> &[String] {
        self.arguments.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

pub fn has_annotation(annotations: &[Annotation], name: &str) -> bool {
    annotations.iter().any(|a| a.is(name))
}

pub fn find_annotation<'a>(annotations: &'a [Annotation], name: &str) -> Option<&'a Annotation> {
    annotations.iter().find(|a| a.is(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

/// Declaration variants as reported by symbol resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Type,
    Field,
    Method,
    Parameter,
    LocalVariable,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub qualified_name: String,
    pub kind: TypeKind,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub type_parameters: Vec<String>,
    pub superclass: Option<TypeReference>,
    pub interfaces: Vec<TypeReference>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub enum_constants: Vec<String>,
    pub nested: Vec<Arc<TypeDecl>>,
    /// Qualified name of the enclosing type, if nested.
    pub enclosing: Option<String>,
    pub span: Span,
}

impl TypeDecl {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_abstract(&self) -> bool {
        self.kind == TypeKind::Interface || self.has_modifier("abstract")
    }

    pub fn namespace(&self) -> &str {
        self.qualified_name
            .rsplit_once('.')
            .map(|(ns, _)| ns)
            .unwrap_or_default()
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (usize, &'a MethodDecl)> + 'a {
        self.methods
            .iter()
            .enumerate()
            .filter(move |(_, m)| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodDecl> {
        self.methods.iter().filter(|m| m.is_constructor)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeReference,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub declaring_type: String,
    pub initializer: Option<Expr>,
    pub span: Span,
}

impl FieldDecl {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_static(&self) -> bool {
        self.has_modifier("static")
    }
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub declaring_type: String,
    /// `None` for constructors
    pub return_type: Option<TypeReference>,
    pub params: Vec<Param>,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub type_parameters: Vec<String>,
    pub throws: Vec<String>,
    /// `None` when the method has no body (abstract or interface method).
    pub body: Option<Block>,
    pub is_constructor: bool,
    /// Declaration text up to the body, whitespace-collapsed.
    pub signature: String,
    pub span: Span,
}

impl MethodDecl {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_varargs(&self) -> bool {
        self.params.last().map_or(false, |p| p.varargs)
    }

    /// Whether a call with `args` arguments can bind to this method.
    pub fn accepts_arity(&self, args: usize) -> bool {
        if self.is_varargs() {
            args + 1 >= self.params.len()
        } else {
            args == self.params.len()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeReference,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub varargs: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    LocalVar(LocalVar),
    Expr(Expr),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Switch(SwitchBlock),
    Try(TryStmt),
    For {
        init: Vec<Stmt>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },
    ForEach {
        var: Binding,
        iterable: Expr,
        body: Box<Stmt>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Yield(Expr),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Synchronized {
        lock: Expr,
        body: Block,
    },
    /// break, continue, assert, empty statements, local classes and the like
    Other(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub ty: TypeReference,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    pub span: Span,
}

/// A named variable introduced by a scope-opening construct
/// (enhanced-for variable, catch parameter, try resource, lambda parameter).
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub ty: Option<TypeReference>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SwitchBlock {
    pub subject: Box<Expr>,
    pub arms: Vec<SwitchArm>,
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    pub labels: Vec<String>,
    pub is_default: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TryStmt {
    pub resources: Vec<Resource>,
    pub body: Block,
    pub catches: Vec<CatchClause>,
    pub finally: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub binding: Option<Binding>,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Binding,
    pub types: Vec<TypeReference>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Name(String),
    Literal(LiteralKind),
    This,
    Super,
    FieldAccess {
        target: Box<Expr>,
        field: String,
    },
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        ty: TypeReference,
        args: Vec<Expr>,
        anonymous_body: bool,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Lambda {
        params: Vec<Binding>,
        body: LambdaBody,
    },
    Switch(SwitchBlock),
    Cast {
        ty: TypeReference,
        expr: Box<Expr>,
    },
    /// Operators, array accesses, method references and the like
    Composite(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Char,
    Integer,
    Float,
    Boolean,
    Null,
    Class,
}

#[derive(Debug, Clone)]
pub enum LambdaBody {
    Expr(Box<Expr>),
    Block(Block),
}

/// Pre-order traversal over statements and expressions.
///
/// Implementors override the hooks they care about and call the matching
/// `walk_*` function to keep descending.
pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in &block.stmts {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_switch<V: Visitor + ?Sized>(visitor: &mut V, switch: &SwitchBlock) {
    visitor.visit_expr(&switch.subject);
    for arm in &switch.arms {
        for stmt in &arm.body {
            visitor.visit_stmt(stmt);
        }
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Block(block) => walk_block(visitor, block),
        StmtKind::LocalVar(local) => {
            for declarator in &local.declarators {
                if let Some(init) = &declarator.init {
                    visitor.visit_expr(init);
                }
            }
        }
        StmtKind::Expr(expr) | StmtKind::Throw(expr) | StmtKind::Yield(expr) => {
            visitor.visit_expr(expr)
        }
        StmtKind::Return(expr) => {
            if let Some(expr) = expr {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                visitor.visit_stmt(else_branch);
            }
        }
        StmtKind::Switch(switch) => walk_switch(visitor, switch),
        StmtKind::Try(try_stmt) => {
            for resource in &try_stmt.resources {
                if let Some(init) = &resource.init {
                    visitor.visit_expr(init);
                }
            }
            walk_block(visitor, &try_stmt.body);
            for catch in &try_stmt.catches {
                walk_block(visitor, &catch.body);
            }
            if let Some(finally) = &try_stmt.finally {
                walk_block(visitor, finally);
            }
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            for stmt in init {
                visitor.visit_stmt(stmt);
            }
            if let Some(condition) = condition {
                visitor.visit_expr(condition);
            }
            for expr in update {
                visitor.visit_expr(expr);
            }
            visitor.visit_stmt(body);
        }
        StmtKind::ForEach { iterable, body, .. } => {
            visitor.visit_expr(iterable);
            visitor.visit_stmt(body);
        }
        StmtKind::While { condition, body } => {
            visitor.visit_expr(condition);
            visitor.visit_stmt(body);
        }
        StmtKind::DoWhile { body, condition } => {
            visitor.visit_stmt(body);
            visitor.visit_expr(condition);
        }
        StmtKind::Labeled { body, .. } => visitor.visit_stmt(body),
        StmtKind::Synchronized { lock, body } => {
            visitor.visit_expr(lock);
            walk_block(visitor, body);
        }
        StmtKind::Other(exprs) => {
            for expr in exprs {
                visitor.visit_expr(expr);
            }
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Literal(_) | ExprKind::This | ExprKind::Super => {}
        ExprKind::FieldAccess { target, .. } => visitor.visit_expr(target),
        ExprKind::Call { target, args, .. } => {
            if let Some(target) = target {
                visitor.visit_expr(target);
            }
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::New { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            visitor.visit_expr(condition);
            visitor.visit_expr(then_expr);
            visitor.visit_expr(else_expr);
        }
        ExprKind::Lambda { body, .. } => match body {
            LambdaBody::Expr(body) => visitor.visit_expr(body),
            LambdaBody::Block(block) => walk_block(visitor, block),
        },
        ExprKind::Switch(switch) => walk_switch(visitor, switch),
        ExprKind::Cast { expr, .. } => visitor.visit_expr(expr),
        ExprKind::Composite(children) => {
            for child in children {
                visitor.visit_expr(child);
            }
        }
    }
}

/// Every method invocation under a block, in evaluation order.
///
/// [`Visitor`] hands out short-lived borrows, so this walks the tree by hand
/// to return references tied to the block itself.
pub fn collect_calls(root: &Block) -> Vec<&Expr> {
    fn stmt<'a>(out: &mut Vec<&'a Expr>, s: &'a Stmt) {
        match &s.kind {
            StmtKind::Block(b) => block(out, b),
            StmtKind::LocalVar(local) => {
                for d in &local.declarators {
                    if let Some(init) = &d.init {
                        expr(out, init);
                    }
                }
            }
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::Yield(e) => expr(out, e),
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    expr(out, e);
                }
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                expr(out, condition);
                stmt(out, then_branch);
                if let Some(e) = else_branch {
                    stmt(out, e);
                }
            }
            StmtKind::Switch(sw) => switch(out, sw),
            StmtKind::Try(t) => {
                for r in &t.resources {
                    if let Some(init) = &r.init {
                        expr(out, init);
                    }
                }
                block(out, &t.body);
                for c in &t.catches {
                    block(out, &c.body);
                }
                if let Some(f) = &t.finally {
                    block(out, f);
                }
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                for s in init {
                    stmt(out, s);
                }
                if let Some(c) = condition {
                    expr(out, c);
                }
                for u in update {
                    expr(out, u);
                }
                stmt(out, body);
            }
            StmtKind::ForEach { iterable, body, .. } => {
                expr(out, iterable);
                stmt(out, body);
            }
            StmtKind::While { condition, body } => {
                expr(out, condition);
                stmt(out, body);
            }
            StmtKind::DoWhile { body, condition } => {
                stmt(out, body);
                expr(out, condition);
            }
            StmtKind::Labeled { body, .. } => stmt(out, body),
            StmtKind::Synchronized { lock, body } => {
                expr(out, lock);
                block(out, body);
            }
            StmtKind::Other(exprs) => {
                for e in exprs {
                    expr(out, e);
                }
            }
        }
    }

    fn switch<'a>(out: &mut Vec<&'a Expr>, sw: &'a SwitchBlock) {
        expr(out, &sw.subject);
        for arm in &sw.arms {
            for s in &arm.body {
                stmt(out, s);
            }
        }
    }

    fn block<'a>(out: &mut Vec<&'a Expr>, b: &'a Block) {
        for s in &b.stmts {
            stmt(out, s);
        }
    }

    // Receivers and arguments are evaluated before the call itself.
    fn expr<'a>(out: &mut Vec<&'a Expr>, e: &'a Expr) {
        match &e.kind {
            ExprKind::Call { target, args, .. } => {
                if let Some(t) = target {
                    expr(out, t);
                }
                for a in args {
                    expr(out, a);
                }
                out.push(e);
            }
            ExprKind::FieldAccess { target, .. } => expr(out, target),
            ExprKind::New { args, .. } => {
                for a in args {
                    expr(out, a);
                }
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                expr(out, condition);
                expr(out, then_expr);
                expr(out, else_expr);
            }
            ExprKind::Lambda { body, .. } => match body {
                LambdaBody::Expr(b) => expr(out, b),
                LambdaBody::Block(b) => block(out, b),
            },
            ExprKind::Switch(sw) => switch(out, sw),
            ExprKind::Cast { expr: inner, .. } => expr(out, inner),
            ExprKind::Composite(children) => {
                for c in children {
                    expr(out, c);
                }
            }
            ExprKind::Name(_) | ExprKind::Literal(_) | ExprKind::This | ExprKind::Super => {}
        }
    }

    let mut out = Vec::new();
    block(&mut out, root);
    out
}
