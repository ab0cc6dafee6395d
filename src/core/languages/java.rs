// src/core/languages/java.rs - Lowers the tree-sitter Java grammar into the owned model
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Node, Parser};

use crate::error::{CodescopeError, ParseFailure, Result};
use super::LanguageParser;
use super::super::model::*;
use super::super::type_ref::TypeReference;

/// Java parser using Tree-sitter
pub struct JavaParser {
    parser: Parser,
}

impl JavaParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let java_language = tree_sitter_java::language();
        parser.set_language(&java_language)
            .map_err(|e| CodescopeError::Config(format!("Failed to set Java language: {}", e)))?;

        Ok(Self { parser })
    }
}

impl LanguageParser for JavaParser {
    fn parse(&mut self, content: &str, file_path: &Path) -> Result<SourceUnit> {
        let tree = self.parser.parse(content, None).ok_or_else(|| ParseFailure {
            path: file_path.to_path_buf(),
            line: 0,
            message: "tree-sitter produced no syntax tree".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, message) = first_syntax_error(root, content)
                .unwrap_or((root.start_position().row + 1, "syntax error".to_string()));
            return Err(ParseFailure {
                path: file_path.to_path_buf(),
                line,
                message,
            }
            .into());
        }

        let lowering = Lowering { source: content };
        Ok(lowering.unit(root, file_path))
    }

    fn file_extensions(&self) -> &[&str] {
        &["java"]
    }

    fn language_name(&self) -> &str {
        "java"
    }
}

/// Locate the first ERROR or MISSING node in document order.
fn first_syntax_error(node: Node, source: &str) -> Option<(usize, String)> {
    if node.is_missing() {
        return Some((
            node.start_position().row + 1,
            format!("missing '{}'", node.kind()),
        ));
    }
    if node.is_error() {
        let snippet: String = source[node.byte_range()].chars().take(40).collect();
        return Some((
            node.start_position().row + 1,
            format!("unexpected input near '{}'", snippet.trim()),
        ));
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| first_syntax_error(child, source))
}

fn is_comment(node: Node) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment" | "comment")
}

fn span_of(node: Node) -> Span {
    Span {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_column: node.start_position().column,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

/// Collapse runs of whitespace into single spaces.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

struct Lowering<'s> {
    source: &'s str,
}

impl<'s> Lowering<'s> {
    /// Extract text content of a node
    fn text(&self, node: Node) -> &'s str {
        &self.source[node.byte_range()]
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        let children = node
            .named_children(&mut cursor)
            .filter(|child| !is_comment(*child))
            .collect();
        children
    }

    /// Find a child node by its kind
    fn find_child_by_kind<'t>(&self, node: Node<'t>, kind: &str) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|child| child.kind() == kind);
        found
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
    }

    fn unit(&self, root: Node, path: &Path) -> SourceUnit {
        let mut package = None;
        let mut imports = Vec::new();
        let mut type_nodes = Vec::new();

        for child in self.named_children(root) {
            match child.kind() {
                "package_declaration" => {
                    package = self
                        .named_children(child)
                        .into_iter()
                        .find(|n| matches!(n.kind(), "identifier" | "scoped_identifier"))
                        .map(|n| self.text(n).to_string());
                }
                "import_declaration" => imports.push(self.import(child)),
                kind if is_type_declaration(kind) => type_nodes.push(child),
                _ => {}
            }
        }

        let prefix = package.clone().unwrap_or_default();
        let types = type_nodes
            .into_iter()
            .map(|node| Arc::new(self.type_decl(node, &prefix, None)))
            .collect();

        SourceUnit {
            path: path.to_path_buf(),
            package,
            imports,
            types,
            source: self.source.to_string(),
            content_hash: String::new(),
        }
    }

    fn import(&self, node: Node) -> Import {
        let text = self.text(node).trim();
        let text = text.trim_start_matches("import").trim_end_matches(';').trim();
        let (is_static, rest) = match text.strip_prefix("static") {
            Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim()),
            _ => (false, text),
        };
        let path: String = rest.chars().filter(|c| !c.is_whitespace()).collect();
        let is_wildcard = path.ends_with(".*");

        Import {
            path: path.trim_end_matches(".*").to_string(),
            is_static,
            is_wildcard,
            line: node.start_position().row + 1,
        }
    }

    /// Parse modifier keywords and annotations
    fn modifiers(&self, node: Node) -> (Vec<String>, Vec<Annotation>) {
        let mut modifiers = Vec::new();
        let mut annotations = Vec::new();

        if let Some(modifiers_node) = self.find_child_by_kind(node, "modifiers") {
            let mut cursor = modifiers_node.walk();
            for child in modifiers_node.children(&mut cursor) {
                match child.kind() {
                    "annotation" | "marker_annotation" => annotations.push(self.annotation(child)),
                    _ if is_comment(child) => {}
                    _ => modifiers.push(self.text(child).to_string()),
                }
            }
        }

        (modifiers, annotations)
    }

    fn annotation(&self, node: Node) -> Annotation {
        let qualified = self.field_text(node, "name").unwrap_or_default();
        let name = qualified.rsplit('.').next().unwrap_or(&qualified).to_string();
        let mut arguments = BTreeMap::new();

        if let Some(args) = node.child_by_field_name("arguments") {
            for child in self.named_children(args) {
                if child.kind() == "element_value_pair" {
                    let key = self.field_text(child, "key").unwrap_or_default();
                    let values = child
                        .child_by_field_name("value")
                        .map(|v| self.element_values(v))
                        .unwrap_or_default();
                    arguments.insert(key, values);
                } else {
                    arguments
                        .entry("value".to_string())
                        .or_insert_with(Vec::new)
                        .extend(self.element_values(child));
                }
            }
        }

        Annotation {
            name,
            raw: self.text(node).to_string(),
            arguments,
        }
    }

    fn element_values(&self, node: Node) -> Vec<String> {
        match node.kind() {
            "element_value_array_initializer" => self
                .named_children(node)
                .into_iter()
                .flat_map(|child| self.element_values(child))
                .collect(),
            "string_literal" => vec![unquote(self.text(node))],
            _ => vec![collapse_whitespace(self.text(node))],
        }
    }

    fn type_decl(&self, node: Node, prefix: &str, enclosing: Option<&str>) -> TypeDecl {
        let name = self.field_text(node, "name").unwrap_or_default();
        let qualified_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        let kind = match node.kind() {
            "interface_declaration" => TypeKind::Interface,
            "enum_declaration" => TypeKind::Enum,
            "record_declaration" => TypeKind::Record,
            "annotation_type_declaration" => TypeKind::Annotation,
            _ => TypeKind::Class,
        };
        let (modifiers, annotations) = self.modifiers(node);

        let type_parameters = node
            .child_by_field_name("type_parameters")
            .map(|tp| {
                self.named_children(tp)
                    .into_iter()
                    .filter_map(|p| self.text(p).split_whitespace().next().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let superclass = node
            .child_by_field_name("superclass")
            .and_then(|sc| self.named_children(sc).into_iter().next())
            .map(|ty| TypeReference::parse(self.text(ty)));

        let mut interfaces = Vec::new();
        for list_kind in ["super_interfaces", "extends_interfaces"] {
            if let Some(list) = self.find_child_by_kind(node, list_kind) {
                if let Some(type_list) = self.find_child_by_kind(list, "type_list") {
                    interfaces.extend(
                        self.named_children(type_list)
                            .into_iter()
                            .map(|ty| TypeReference::parse(self.text(ty))),
                    );
                }
            }
        }

        let mut decl = TypeDecl {
            name,
            qualified_name,
            kind,
            modifiers,
            annotations,
            type_parameters,
            superclass,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            enum_constants: Vec::new(),
            nested: Vec::new(),
            enclosing: enclosing.map(str::to_string),
            span: span_of(node),
        };

        // Record components behave like private final fields.
        if kind == TypeKind::Record {
            if let Some(params) = node.child_by_field_name("parameters") {
                for param in self.params(params) {
                    decl.fields.push(FieldDecl {
                        name: param.name,
                        ty: param.ty,
                        modifiers: vec!["private".to_string(), "final".to_string()],
                        annotations: param.annotations,
                        declaring_type: decl.qualified_name.clone(),
                        initializer: None,
                        span: param.span,
                    });
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.members(body, &mut decl);
        }

        decl
    }

    fn members(&self, body: Node, decl: &mut TypeDecl) {
        for child in self.named_children(body) {
            match child.kind() {
                "field_declaration" | "constant_declaration" => {
                    let fields = self.fields(child, &decl.qualified_name);
                    decl.fields.extend(fields);
                }
                "method_declaration" | "constructor_declaration" => {
                    let method = self.method(child, &decl.qualified_name);
                    decl.methods.push(method);
                }
                "enum_constant" => {
                    if let Some(name) = self.field_text(child, "name") {
                        decl.enum_constants.push(name);
                    }
                }
                "enum_body_declarations" => self.members(child, decl),
                kind if is_type_declaration(kind) => {
                    let nested = self.type_decl(child, &decl.qualified_name, Some(&decl.qualified_name));
                    decl.nested.push(Arc::new(nested));
                }
                _ => {}
            }
        }
    }

    fn fields(&self, node: Node, declaring_type: &str) -> Vec<FieldDecl> {
        let (modifiers, annotations) = self.modifiers(node);
        let base_type = self.field_text(node, "type").unwrap_or_default();

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();

        declarators
            .into_iter()
            .map(|declarator| {
                let ty = match declarator.child_by_field_name("dimensions") {
                    Some(dims) => format!("{}{}", base_type, self.text(dims)),
                    None => base_type.clone(),
                };
                FieldDecl {
                    name: self.field_text(declarator, "name").unwrap_or_default(),
                    ty: TypeReference::parse(&ty),
                    modifiers: modifiers.clone(),
                    annotations: annotations.clone(),
                    declaring_type: declaring_type.to_string(),
                    initializer: declarator.child_by_field_name("value").map(|v| self.expr(v)),
                    span: span_of(declarator),
                }
            })
            .collect()
    }

    fn method(&self, node: Node, declaring_type: &str) -> MethodDecl {
        let (modifiers, annotations) = self.modifiers(node);
        let is_constructor = node.kind() == "constructor_declaration";
        let body_node = node.child_by_field_name("body");

        let signature = match body_node {
            Some(body) => collapse_whitespace(&self.source[node.start_byte()..body.start_byte()]),
            None => collapse_whitespace(self.text(node).trim_end_matches(';')),
        };

        let type_parameters = node
            .child_by_field_name("type_parameters")
            .map(|tp| {
                self.named_children(tp)
                    .into_iter()
                    .filter_map(|p| self.text(p).split_whitespace().next().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let throws = self
            .find_child_by_kind(node, "throws")
            .map(|t| {
                self.named_children(t)
                    .into_iter()
                    .map(|ty| self.text(ty).to_string())
                    .collect()
            })
            .unwrap_or_default();

        MethodDecl {
            name: self.field_text(node, "name").unwrap_or_default(),
            declaring_type: declaring_type.to_string(),
            return_type: if is_constructor {
                None
            } else {
                self.field_text(node, "type").map(|t| TypeReference::parse(&t))
            },
            params: node
                .child_by_field_name("parameters")
                .map(|p| self.params(p))
                .unwrap_or_default(),
            modifiers,
            annotations,
            type_parameters,
            throws,
            body: body_node.map(|b| self.block(b)),
            is_constructor,
            signature,
            span: span_of(node),
        }
    }

    fn params(&self, node: Node) -> Vec<Param> {
        let mut params = Vec::new();

        for child in self.named_children(node) {
            let (modifiers, annotations) = self.modifiers(child);
            match child.kind() {
                "formal_parameter" => {
                    let mut ty = self.field_text(child, "type").unwrap_or_default();
                    if let Some(dims) = child.child_by_field_name("dimensions") {
                        ty.push_str(self.text(dims));
                    }
                    params.push(Param {
                        name: self.field_text(child, "name").unwrap_or_default(),
                        ty: TypeReference::parse(&ty),
                        modifiers,
                        annotations,
                        varargs: false,
                        span: span_of(child),
                    });
                }
                "spread_parameter" => {
                    let children = self.named_children(child);
                    let ty = children
                        .iter()
                        .find(|n| !matches!(n.kind(), "modifiers" | "variable_declarator") && !n.kind().ends_with("annotation"))
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default();
                    let name = children
                        .iter()
                        .find(|n| n.kind() == "variable_declarator")
                        .and_then(|d| self.field_text(*d, "name"))
                        .unwrap_or_default();
                    params.push(Param {
                        name,
                        ty: TypeReference::parse(&format!("{}[]", ty)),
                        modifiers,
                        annotations,
                        varargs: true,
                        span: span_of(child),
                    });
                }
                _ => {}
            }
        }

        params
    }

    fn block(&self, node: Node) -> Block {
        Block {
            stmts: self
                .named_children(node)
                .into_iter()
                .filter_map(|child| self.stmt(child))
                .collect(),
            span: span_of(node),
        }
    }

    /// Statement nodes that are not blocks get wrapped so branches always own a statement.
    fn stmt(&self, node: Node) -> Option<Stmt> {
        let kind = match node.kind() {
            "block" => StmtKind::Block(self.block(node)),
            "local_variable_declaration" => StmtKind::LocalVar(self.local_var(node)),
            "expression_statement" => {
                let inner = self.named_children(node).into_iter().next()?;
                match inner.kind() {
                    "switch_expression" => StmtKind::Switch(self.switch(inner)),
                    _ => StmtKind::Expr(self.expr(inner)),
                }
            }
            "if_statement" => StmtKind::If {
                condition: self.required_expr(node, "condition"),
                then_branch: Box::new(self.required_stmt(node, "consequence")),
                else_branch: node
                    .child_by_field_name("alternative")
                    .and_then(|alt| self.stmt(alt))
                    .map(Box::new),
            },
            "switch_expression" | "switch_statement" => StmtKind::Switch(self.switch(node)),
            "try_statement" | "try_with_resources_statement" => StmtKind::Try(self.try_stmt(node)),
            "for_statement" => {
                let mut cursor = node.walk();
                let init = node
                    .children_by_field_name("init", &mut cursor)
                    .filter_map(|n| match n.kind() {
                        "local_variable_declaration" => self.stmt(n),
                        _ => Some(Stmt {
                            kind: StmtKind::Expr(self.expr(n)),
                            span: span_of(n),
                        }),
                    })
                    .collect();
                let mut cursor = node.walk();
                let update = node
                    .children_by_field_name("update", &mut cursor)
                    .map(|n| self.expr(n))
                    .collect();
                StmtKind::For {
                    init,
                    condition: node.child_by_field_name("condition").map(|c| self.expr(c)),
                    update,
                    body: Box::new(self.required_stmt(node, "body")),
                }
            }
            "enhanced_for_statement" => StmtKind::ForEach {
                var: Binding {
                    name: self.field_text(node, "name").unwrap_or_default(),
                    ty: self.field_text(node, "type").map(|t| TypeReference::parse(&t)),
                    span: span_of(node),
                },
                iterable: self.required_expr(node, "value"),
                body: Box::new(self.required_stmt(node, "body")),
            },
            "while_statement" => StmtKind::While {
                condition: self.required_expr(node, "condition"),
                body: Box::new(self.required_stmt(node, "body")),
            },
            "do_statement" => StmtKind::DoWhile {
                body: Box::new(self.required_stmt(node, "body")),
                condition: self.required_expr(node, "condition"),
            },
            "return_statement" => StmtKind::Return(
                self.named_children(node).into_iter().next().map(|e| self.expr(e)),
            ),
            "throw_statement" => StmtKind::Throw(self.first_expr(node)),
            "yield_statement" => StmtKind::Yield(self.first_expr(node)),
            "labeled_statement" => {
                let children = self.named_children(node);
                let label = children
                    .first()
                    .map(|l| self.text(*l).to_string())
                    .unwrap_or_default();
                let body = children.last().and_then(|b| self.stmt(*b))?;
                StmtKind::Labeled {
                    label,
                    body: Box::new(body),
                }
            }
            "synchronized_statement" => StmtKind::Synchronized {
                lock: self.first_expr(node),
                body: node
                    .child_by_field_name("body")
                    .map(|b| self.block(b))
                    .unwrap_or_default(),
            },
            kind if is_comment(node) || kind == ";" => return None,
            kind if is_type_declaration(kind) => StmtKind::Other(Vec::new()),
            _ => StmtKind::Other(
                self.named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child))
                    .collect(),
            ),
        };

        Some(Stmt {
            kind,
            span: span_of(node),
        })
    }

    fn required_stmt(&self, node: Node, field: &str) -> Stmt {
        node.child_by_field_name(field)
            .and_then(|n| self.stmt(n))
            .unwrap_or_else(|| Stmt {
                kind: StmtKind::Block(Block::default()),
                span: span_of(node),
            })
    }

    fn required_expr(&self, node: Node, field: &str) -> Expr {
        match node.child_by_field_name(field) {
            Some(n) => self.expr(n),
            None => self.empty_expr(node),
        }
    }

    fn first_expr(&self, node: Node) -> Expr {
        match self.named_children(node).into_iter().next() {
            Some(n) => self.expr(n),
            None => self.empty_expr(node),
        }
    }

    fn empty_expr(&self, node: Node) -> Expr {
        Expr {
            kind: ExprKind::Composite(Vec::new()),
            span: span_of(node),
            text: String::new(),
        }
    }

    fn local_var(&self, node: Node) -> LocalVar {
        let ty = self.field_text(node, "type").unwrap_or_default();
        let mut cursor = node.walk();
        let declarators = node
            .children_by_field_name("declarator", &mut cursor)
            .map(|d| Declarator {
                name: self.field_text(d, "name").unwrap_or_default(),
                init: d.child_by_field_name("value").map(|v| self.expr(v)),
                span: span_of(d),
            })
            .collect();

        LocalVar {
            ty: TypeReference::parse(&ty),
            declarators,
        }
    }

    fn switch(&self, node: Node) -> SwitchBlock {
        let subject = self.required_expr(node, "condition");
        let mut arms = Vec::new();

        if let Some(body) = node.child_by_field_name("body") {
            for group in self.named_children(body) {
                if !matches!(group.kind(), "switch_block_statement_group" | "switch_rule") {
                    continue;
                }
                let mut labels = Vec::new();
                let mut is_default = false;
                let mut stmts = Vec::new();

                for child in self.named_children(group) {
                    if child.kind() == "switch_label" {
                        let label = collapse_whitespace(self.text(child));
                        if label == "default" || label.ends_with(", default") {
                            is_default = true;
                        }
                        let label = label.trim_start_matches("case").trim().to_string();
                        if label != "default" {
                            labels.push(label);
                        }
                    } else if let Some(stmt) = self.stmt(child) {
                        stmts.push(stmt);
                    }
                }

                arms.push(SwitchArm {
                    labels,
                    is_default,
                    body: stmts,
                    span: span_of(group),
                });
            }
        }

        SwitchBlock {
            subject: Box::new(subject),
            arms,
        }
    }

    fn try_stmt(&self, node: Node) -> TryStmt {
        let resources = node
            .child_by_field_name("resources")
            .map(|resources| {
                self.named_children(resources)
                    .into_iter()
                    .filter(|r| r.kind() == "resource")
                    .map(|r| {
                        let binding = self.field_text(r, "name").map(|name| Binding {
                            name,
                            ty: self.field_text(r, "type").map(|t| TypeReference::parse(&t)),
                            span: span_of(r),
                        });
                        let init = match r.child_by_field_name("value") {
                            Some(v) => Some(self.expr(v)),
                            None => self.named_children(r).into_iter().next().map(|e| self.expr(e)),
                        };
                        Resource { binding, init }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut catches = Vec::new();
        let mut finally = None;
        for child in self.named_children(node) {
            match child.kind() {
                "catch_clause" => {
                    let param_node = self.find_child_by_kind(child, "catch_formal_parameter");
                    let types = param_node
                        .and_then(|p| self.find_child_by_kind(p, "catch_type"))
                        .map(|ct| {
                            self.named_children(ct)
                                .into_iter()
                                .map(|t| TypeReference::parse(self.text(t)))
                                .collect()
                        })
                        .unwrap_or_default();
                    let param = Binding {
                        name: param_node
                            .and_then(|p| self.field_text(p, "name"))
                            .unwrap_or_default(),
                        ty: None,
                        span: span_of(child),
                    };
                    catches.push(CatchClause {
                        param,
                        types,
                        body: child
                            .child_by_field_name("body")
                            .map(|b| self.block(b))
                            .unwrap_or_default(),
                        span: span_of(child),
                    });
                }
                "finally_clause" => {
                    finally = self.find_child_by_kind(child, "block").map(|b| self.block(b));
                }
                _ => {}
            }
        }

        TryStmt {
            resources,
            body: node
                .child_by_field_name("body")
                .map(|b| self.block(b))
                .unwrap_or_default(),
            catches,
            finally,
        }
    }

    fn expr(&self, node: Node) -> Expr {
        let kind = match node.kind() {
            "parenthesized_expression" => {
                if let Some(inner) = self.named_children(node).into_iter().next() {
                    return self.expr(inner);
                }
                ExprKind::Composite(Vec::new())
            }
            "identifier" => ExprKind::Name(self.text(node).to_string()),
            "this" => ExprKind::This,
            "super" => ExprKind::Super,
            "field_access" => ExprKind::FieldAccess {
                target: Box::new(self.required_expr(node, "object")),
                field: self.field_text(node, "field").unwrap_or_default(),
            },
            "method_invocation" => ExprKind::Call {
                target: node.child_by_field_name("object").map(|o| Box::new(self.expr(o))),
                name: self.field_text(node, "name").unwrap_or_default(),
                args: self.arguments(node),
            },
            "object_creation_expression" => ExprKind::New {
                ty: TypeReference::parse(&self.field_text(node, "type").unwrap_or_default()),
                args: self.arguments(node),
                anonymous_body: self.find_child_by_kind(node, "class_body").is_some(),
            },
            "ternary_expression" => ExprKind::Conditional {
                condition: Box::new(self.required_expr(node, "condition")),
                then_expr: Box::new(self.required_expr(node, "consequence")),
                else_expr: Box::new(self.required_expr(node, "alternative")),
            },
            "lambda_expression" => ExprKind::Lambda {
                params: node
                    .child_by_field_name("parameters")
                    .map(|p| self.lambda_params(p))
                    .unwrap_or_default(),
                body: match node.child_by_field_name("body") {
                    Some(b) if b.kind() == "block" => LambdaBody::Block(self.block(b)),
                    Some(b) => LambdaBody::Expr(Box::new(self.expr(b))),
                    None => LambdaBody::Block(Block::default()),
                },
            },
            "switch_expression" => ExprKind::Switch(self.switch(node)),
            "cast_expression" => ExprKind::Cast {
                ty: TypeReference::parse(&self.field_text(node, "type").unwrap_or_default()),
                expr: Box::new(self.required_expr(node, "value")),
            },
            "string_literal" | "text_block" => ExprKind::Literal(LiteralKind::String),
            "character_literal" => ExprKind::Literal(LiteralKind::Char),
            "true" | "false" => ExprKind::Literal(LiteralKind::Boolean),
            "null_literal" => ExprKind::Literal(LiteralKind::Null),
            "class_literal" => ExprKind::Literal(LiteralKind::Class),
            kind if kind.ends_with("floating_point_literal") => ExprKind::Literal(LiteralKind::Float),
            kind if kind.ends_with("integer_literal") => ExprKind::Literal(LiteralKind::Integer),
            _ => ExprKind::Composite(
                self.named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child))
                    .collect(),
            ),
        };

        Expr {
            kind,
            span: span_of(node),
            text: self.text(node).to_string(),
        }
    }

    fn arguments(&self, node: Node) -> Vec<Expr> {
        node.child_by_field_name("arguments")
            .map(|args| {
                self.named_children(args)
                    .into_iter()
                    .map(|a| self.expr(a))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lambda_params(&self, node: Node) -> Vec<Binding> {
        match node.kind() {
            "identifier" => vec![Binding {
                name: self.text(node).to_string(),
                ty: None,
                span: span_of(node),
            }],
            "formal_parameters" => self
                .params(node)
                .into_iter()
                .map(|p| Binding {
                    name: p.name,
                    ty: Some(p.ty),
                    span: p.span,
                })
                .collect(),
            _ => self
                .named_children(node)
                .into_iter()
                .filter(|n| n.kind() == "identifier")
                .map(|n| Binding {
                    name: self.text(n).to_string(),
                    ty: None,
                    span: span_of(n),
                })
                .collect(),
        }
    }
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> SourceUnit {
        let mut parser = JavaParser::new().unwrap();
        parser.parse(source, Path::new("src/Sample.java")).unwrap()
    }

    #[test]
    fn test_lowers_package_imports_and_members() {
        let unit = parse(r#"
package com.shop.orders;

import java.util.List;
import static java.util.Objects.requireNonNull;
import com.shop.common.*;

@Service
public class OrderService extends BaseService implements Auditable {
    @Autowired
    private OrderRepository repository;
    private int count = 0, limit[];

    public OrderService(OrderRepository repository) {
        this.repository = repository;
    }

    public List<Order> findAll(String owner, int... ids) {
        return repository.findByOwner(owner);
    }

    static class Helper {}
}
"#);

        assert_eq!(unit.package.as_deref(), Some("com.shop.orders"));
        assert_eq!(unit.imports.len(), 3);
        assert!(unit.imports[1].is_static);
        assert!(unit.imports[2].is_wildcard);
        assert_eq!(unit.imports[2].path, "com.shop.common");

        let service = &unit.types[0];
        assert_eq!(service.qualified_name, "com.shop.orders.OrderService");
        assert!(has_annotation(&service.annotations, "Service"));
        assert_eq!(service.superclass.as_ref().unwrap().raw, "BaseService");
        assert_eq!(service.interfaces[0].raw, "Auditable");

        let names: Vec<_> = service.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["repository", "count", "limit"]);
        assert_eq!(service.fields[2].ty.raw, "int[]");
        assert!(has_annotation(&service.fields[0].annotations, "Autowired"));

        let ctor = &service.methods[0];
        assert!(ctor.is_constructor);
        assert!(ctor.return_type.is_none());

        let find_all = &service.methods[1];
        assert_eq!(find_all.arity(), 2);
        assert!(find_all.is_varargs());
        assert_eq!(find_all.signature, "public List<Order> findAll(String owner, int... ids)");

        assert_eq!(service.nested[0].qualified_name, "com.shop.orders.OrderService.Helper");
        assert_eq!(service.nested[0].enclosing.as_deref(), Some("com.shop.orders.OrderService"));
    }

    #[test]
    fn test_parses_annotation_arguments() {
        let unit = parse(r#"
@RequestMapping(value = {"/api/orders", "/v2/orders"}, method = RequestMethod.GET)
class OrderController {
    @GetMapping("/{id}")
    Order get(@PathVariable Long id) { return null; }
}
"#);
        let controller = &unit.types[0];
        let mapping = find_annotation(&controller.annotations, "RequestMapping").unwrap();
        assert_eq!(mapping.values("value"), ["/api/orders", "/v2/orders"]);
        assert_eq!(mapping.values("method"), ["RequestMethod.GET"]);

        let get = find_annotation(&controller.methods[0].annotations, "GetMapping").unwrap();
        assert_eq!(get.values("value"), ["/{id}"]);
        assert!(has_annotation(&controller.methods[0].params[0].annotations, "PathVariable"));
    }

    #[test]
    fn test_lowers_control_flow() {
        let unit = parse(r#"
class Flow {
    int run(int x) {
        for (int i = 0; i < x; i++) { x--; }
        try (var in = open()) {
            read(in);
        } catch (IOException | RuntimeException e) {
            log(e);
        } finally {
            close();
        }
        switch (x) {
            case 1, 2 -> a();
            default -> b();
        }
        return x > 0 ? 1 : 0;
    }
}
"#);
        let body = unit.types[0].methods[0].body.as_ref().unwrap();
        assert!(matches!(body.stmts[0].kind, StmtKind::For { .. }));

        match &body.stmts[1].kind {
            StmtKind::Try(t) => {
                assert_eq!(t.resources.len(), 1);
                assert_eq!(t.catches.len(), 1);
                assert_eq!(t.catches[0].types.len(), 2);
                assert!(t.finally.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }

        match &body.stmts[2].kind {
            StmtKind::Switch(sw) => {
                assert_eq!(sw.arms.len(), 2);
                assert_eq!(sw.arms[0].labels, vec!["1, 2"]);
                assert!(sw.arms[1].is_default);
            }
            other => panic!("expected switch, got {:?}", other),
        }

        match &body.stmts[3].kind {
            StmtKind::Return(Some(expr)) => {
                assert!(matches!(expr.kind, ExprKind::Conditional { .. }))
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_reports_first_syntax_error_line() {
        let mut parser = JavaParser::new().unwrap();
        assert_eq!(parser.file_extensions(), &["java"]);
        let err = parser
            .parse("class Broken {\n  void run( {\n  }\n", Path::new("Broken.java"))
            .unwrap_err();
        match err {
            CodescopeError::Parse(failure) => {
                assert!(failure.line >= 1);
                assert_eq!(failure.path, Path::new("Broken.java"));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_records_and_enums() {
        let unit = parse(r#"
record Money(long amount, String currency) {}
enum Status { OPEN, CLOSED; boolean done() { return this == CLOSED; } }
"#);
        let money = &unit.types[0];
        assert_eq!(money.kind, TypeKind::Record);
        assert_eq!(money.fields.len(), 2);

        let status = &unit.types[1];
        assert_eq!(status.enum_constants, vec!["OPEN", "CLOSED"]);
        assert_eq!(status.methods.len(), 1);
    }
}
