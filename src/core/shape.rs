//! Recursive field shape of a data-holder type.
//!
//! Traversal keeps a set of the qualified names currently being expanded.
//! Re-entering one yields a `cyclic` terminal and running out of depth yields
//! a `depth-limit` terminal, so every tree is finite and no path is longer
//! than the requested depth.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use super::deadline::Deadline;
use super::index::TypeEntry;
use super::model::{has_annotation, TypeDecl, TypeKind};
use super::resolver::{TypeResolver, TypeTarget};
use super::type_ref::{ContainerKind, TypeReference};

const ENTITY_ANNOTATIONS: &[&str] = &["Entity", "Table", "Document", "MappedSuperclass"];
const VALUE_ANNOTATIONS: &[&str] = &["Value", "Embeddable", "Immutable", "ConfigurationProperties"];
const VALUE_SUFFIXES: &[&str] = &[
    "Dto", "DTO", "Vo", "VO", "Value", "Request", "Response", "Properties", "Settings", "Config",
];

/// Reporting-only classification of a visited type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    EntityLike,
    ValueObjectLike,
    Plain,
}

impl TypeTag {
    /// Tag a workspace type by its annotations, falling back to its name.
    pub fn of(decl: &TypeDecl) -> Self {
        if ENTITY_ANNOTATIONS.iter().any(|a| has_annotation(&decl.annotations, a)) {
            return Self::EntityLike;
        }
        if decl.kind == TypeKind::Record
            || VALUE_ANNOTATIONS.iter().any(|a| has_annotation(&decl.annotations, a))
        {
            return Self::ValueObjectLike;
        }
        Self::from_name(&decl.name)
    }

    /// Name-only heuristic, used for types outside the workspace.
    pub fn from_name(name: &str) -> Self {
        let simple = name.rsplit('.').next().unwrap_or(name);
        if VALUE_SUFFIXES.iter().any(|s| simple.ends_with(s) && simple.len() > s.len()) {
            Self::ValueObjectLike
        } else {
            Self::Plain
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Object,
    Enum,
    Collection,
    Map,
    Array,
    Optional,
    Primitive,
    External,
    Unresolved,
}

impl From<ContainerKind> for ShapeKind {
    fn from(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Collection => Self::Collection,
            ContainerKind::Map => Self::Map,
            ContainerKind::Array => Self::Array,
            ContainerKind::Optional => Self::Optional,
            ContainerKind::None => Self::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeTerminal {
    Cyclic,
    DepthLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeNode {
    /// Field name, the type name for the root, or `element`/`key`/`value`
    pub name: String,
    /// Type as written
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
    pub kind: ShapeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<TypeTag>,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<ShapeTerminal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_constants: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ShapeNode>,
}

impl ShapeNode {
    fn new(name: &str, type_name: &str, kind: ShapeKind, depth: usize) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            resolved_type: None,
            kind,
            tag: None,
            depth,
            terminal: None,
            enum_constants: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Length of the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.children.iter().map(|c| c.height() + 1).max().unwrap_or(0)
    }

    pub fn count_terminals(&self, marker: ShapeTerminal) -> usize {
        let own = usize::from(self.terminal == Some(marker));
        own + self.children.iter().map(|c| c.count_terminals(marker)).sum::<usize>()
    }

    pub fn child(&self, name: &str) -> Option<&ShapeNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeTree {
    pub type_name: String,
    pub max_depth: usize,
    /// Other workspace types sharing the requested simple name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    pub root: ShapeNode,
}

pub struct ShapeExtractor<'r, 'a> {
    resolver: &'r TypeResolver<'a>,
    max_depth: usize,
    deadline: Deadline,
    expanding: HashSet<String>,
}

impl<'r, 'a> ShapeExtractor<'r, 'a> {
    pub fn new(resolver: &'r TypeResolver<'a>, max_depth: usize, deadline: Deadline) -> Self {
        Self {
            resolver,
            max_depth,
            deadline,
            expanding: HashSet::new(),
        }
    }

    pub fn extract(mut self, type_name: &str) -> Result<ShapeTree> {
        let found = self.resolver.find_type(type_name, &self.deadline)?;
        let qualified = found.entry.decl.qualified_name.clone();
        debug!(type_name = %qualified, max_depth = self.max_depth, "extracting shape");

        let mut root = ShapeNode::new(&found.entry.decl.name, &qualified, ShapeKind::Object, 0);
        self.expand_target(&mut root, TypeTarget::Project(found.entry))?;

        Ok(ShapeTree {
            type_name: qualified,
            max_depth: self.max_depth,
            alternatives: found.alternatives,
            root,
        })
    }

    /// Node for a type reference written inside `holder`.
    fn reference_node(&mut self, name: &str, ty: &TypeReference, holder: &TypeEntry, depth: usize) -> Result<ShapeNode> {
        self.deadline.check()?;

        if ty.is_container() {
            let mut node = ShapeNode::new(name, &ty.raw, ty.container.into(), depth);
            let elements = ty.element_types();
            if elements.is_empty() {
                return Ok(node);
            }
            if depth >= self.max_depth {
                node.terminal = Some(ShapeTerminal::DepthLimit);
                return Ok(node);
            }
            for (role, element) in elements {
                let child = self.reference_node(role, element, holder, depth + 1)?;
                node.children.push(child);
            }
            return Ok(node);
        }

        let target = self
            .resolver
            .resolve_type_ref(ty, &holder.unit, Some(&holder.decl));
        let mut node = ShapeNode::new(name, &ty.raw, ShapeKind::Object, depth);
        self.expand_target(&mut node, target)?;
        Ok(node)
    }

    fn expand_target(&mut self, node: &mut ShapeNode, target: TypeTarget) -> Result<()> {
        let entry = match target {
            TypeTarget::Project(entry) => entry,
            TypeTarget::External(name) => {
                node.kind = ShapeKind::External;
                node.tag = Some(TypeTag::from_name(&name));
                node.resolved_type = Some(name);
                return Ok(());
            }
            TypeTarget::Primitive(_) => {
                node.kind = ShapeKind::Primitive;
                return Ok(());
            }
            TypeTarget::Unknown(_) => {
                node.kind = ShapeKind::Unresolved;
                return Ok(());
            }
        };

        let qualified = entry.decl.qualified_name.clone();
        node.resolved_type = Some(qualified.clone());
        node.tag = Some(TypeTag::of(&entry.decl));

        if entry.decl.kind == TypeKind::Enum {
            node.kind = ShapeKind::Enum;
            node.enum_constants = entry.decl.enum_constants.clone();
            return Ok(());
        }

        if self.expanding.contains(&qualified) {
            node.terminal = Some(ShapeTerminal::Cyclic);
            return Ok(());
        }

        let fields = self.instance_fields(&entry);
        if fields.is_empty() {
            return Ok(());
        }
        if node.depth >= self.max_depth {
            node.terminal = Some(ShapeTerminal::DepthLimit);
            return Ok(());
        }

        self.expanding.insert(qualified.clone());
        let depth = node.depth + 1;
        for (holder, index) in fields {
            let field = &holder.decl.fields[index];
            let child = self.reference_node(&field.name, &field.ty, &holder, depth);
            match child {
                Ok(child) => node.children.push(child),
                Err(e) => {
                    self.expanding.remove(&qualified);
                    return Err(e);
                }
            }
        }
        self.expanding.remove(&qualified);
        Ok(())
    }

    /// Non-static fields, workspace superclasses first.
    fn instance_fields(&self, entry: &TypeEntry) -> Vec<(TypeEntry, usize)> {
        let mut owners = self.resolver.superclass_chain(entry);
        owners.reverse();
        owners.push(entry.clone());

        owners
            .into_iter()
            .flat_map(|owner| {
                let indices: Vec<usize> = owner
                    .decl
                    .fields
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| !f.is_static())
                    .map(|(i, _)| i)
                    .collect();
                indices.into_iter().map(move |i| (owner.clone(), i))
            })
            .collect()
    }
}
