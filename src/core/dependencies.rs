//! Test-double recommendations for a type's injected collaborators.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use super::deadline::Deadline;
use super::index::TypeEntry;
use super::model::{has_annotation, Annotation, Span};
use super::resolver::{TypeResolver, TypeTarget};
use super::shape::TypeTag;
use super::type_ref::TypeReference;

static EXTERNAL_INTEGRATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(client|gateway|proxy|remote\w*|feign\w*|resttemplate|webclient|stub|connector|publisher|producer|sender|notifier)$",
    )
    .expect("valid external integration regex")
});

static PERSISTENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(repository|repo|dao|jdbctemplate|entitymanager|sessionfactory|store)$")
        .expect("valid persistence regex")
});

const FIELD_INJECTION: &[&str] = &["Autowired", "Inject", "Resource"];
const CONSTRUCTOR_INJECTION: &[&str] = &["Autowired", "Inject"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Substitute,
    UseRealInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionKind {
    Field,
    Constructor,
    /// Final field wired through a Lombok-generated constructor
    GeneratedConstructor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_type: Option<String>,
    pub injection: InjectionKind,
    pub line: usize,
    pub strategy: Strategy,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub type_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    pub dependencies: Vec<Dependency>,
}

impl DependencyReport {
    pub fn count(&self, strategy: Strategy) -> usize {
        self.dependencies.iter().filter(|d| d.strategy == strategy).count()
    }
}

struct Injected<'d> {
    name: &'d str,
    ty: &'d TypeReference,
    injection: InjectionKind,
    span: Span,
}

pub struct DependencyClassifier<'r, 'a> {
    resolver: &'r TypeResolver<'a>,
}

impl<'r, 'a> DependencyClassifier<'r, 'a> {
    pub fn new(resolver: &'r TypeResolver<'a>) -> Self {
        Self { resolver }
    }

    pub fn classify(&self, type_name: &str, deadline: &Deadline) -> Result<DependencyReport> {
        let found = self.resolver.find_type(type_name, deadline)?;
        let entry = &found.entry;

        let dependencies: Vec<Dependency> = injected_collaborators(entry)
            .into_iter()
            .map(|injected| self.classify_one(entry, injected))
            .collect();

        debug!(
            type_name = %entry.decl.qualified_name,
            dependencies = dependencies.len(),
            "classified dependencies"
        );

        Ok(DependencyReport {
            type_name: entry.decl.qualified_name.clone(),
            alternatives: found.alternatives.clone(),
            dependencies,
        })
    }

    fn classify_one(&self, entry: &TypeEntry, injected: Injected) -> Dependency {
        let target = self
            .resolver
            .resolve_type_ref(injected.ty, &entry.unit, Some(&entry.decl));
        let simple = injected.ty.simple_name();
        let (strategy, rationale) = self.decide(injected.name, simple, &target);

        Dependency {
            name: injected.name.to_string(),
            type_name: injected.ty.raw.clone(),
            resolved_type: match &target {
                TypeTarget::Unknown(_) => None,
                known => Some(known.qualified_name().to_string()),
            },
            injection: injected.injection,
            line: injected.span.start_line,
            strategy,
            rationale,
        }
    }

    /// First matching rule wins.
    fn decide(&self, name: &str, simple_type: &str, target: &TypeTarget) -> (Strategy, String) {
        if EXTERNAL_INTEGRATION_RE.is_match(name) || EXTERNAL_INTEGRATION_RE.is_match(simple_type) {
            return (
                Strategy::Substitute,
                format!("`{}` wraps an external integration; substitute it to keep tests offline", simple_type),
            );
        }
        if PERSISTENCE_RE.is_match(name) || PERSISTENCE_RE.is_match(simple_type) {
            return (
                Strategy::Substitute,
                format!("`{}` reaches persistence; substitute it or use an in-memory fake", simple_type),
            );
        }

        let tag = match target {
            TypeTarget::Project(entry) => TypeTag::of(&entry.decl),
            _ => TypeTag::from_name(simple_type),
        };
        if tag == TypeTag::ValueObjectLike {
            return (
                Strategy::UseRealInstance,
                format!("`{}` is a value object; construct a real instance", simple_type),
            );
        }

        match target {
            TypeTarget::Primitive(_) => (
                Strategy::UseRealInstance,
                format!("`{}` is a primitive value", simple_type),
            ),
            TypeTarget::Unknown(_) => (
                Strategy::Substitute,
                format!("`{}` could not be resolved; substitute by default", simple_type),
            ),
            known if self.resolver.config().is_custom_namespace(known.qualified_name()) => (
                Strategy::Substitute,
                format!("`{}` is project code with its own collaborators; substitute by default", simple_type),
            ),
            _ => (
                Strategy::UseRealInstance,
                format!("`{}` is a framework or runtime type; use the real implementation", simple_type),
            ),
        }
    }
}

/// Injected fields, then Lombok-wired fields, then constructor parameters.
/// Names are reported once, first occurrence wins.
fn injected_collaborators(entry: &TypeEntry) -> Vec<Injected<'_>> {
    let decl = &entry.decl;
    let mut out: Vec<Injected> = Vec::new();

    for field in decl.fields.iter().filter(|f| !f.is_static()) {
        if is_injected(&field.annotations, FIELD_INJECTION) {
            push_unique(
                Injected {
                    name: &field.name,
                    ty: &field.ty,
                    injection: InjectionKind::Field,
                    span: field.span,
                },
                &mut out,
            );
        }
    }

    let all_args = has_annotation(&decl.annotations, "AllArgsConstructor");
    let required_args = has_annotation(&decl.annotations, "RequiredArgsConstructor");
    if all_args || required_args {
        for field in decl.fields.iter().filter(|f| !f.is_static()) {
            let wired = all_args || (field.has_modifier("final") && field.initializer.is_none());
            if wired {
                push_unique(
                    Injected {
                        name: &field.name,
                        ty: &field.ty,
                        injection: InjectionKind::GeneratedConstructor,
                        span: field.span,
                    },
                    &mut out,
                );
            }
        }
    }

    let constructors: Vec<_> = decl.constructors().collect();
    let injecting = constructors
        .iter()
        .find(|c| is_injected(&c.annotations, CONSTRUCTOR_INJECTION))
        .or(match constructors.as_slice() {
            [only] => Some(only),
            _ => None,
        });
    if let Some(constructor) = injecting {
        for param in &constructor.params {
            push_unique(
                Injected {
                    name: &param.name,
                    ty: &param.ty,
                    injection: InjectionKind::Constructor,
                    span: param.span,
                },
                &mut out,
            );
        }
    }

    out
}

/// Whether a field, parameter or type name looks like persistence access.
pub fn is_persistence_name(name: &str) -> bool {
    PERSISTENCE_RE.is_match(name)
}

fn push_unique<'d>(candidate: Injected<'d>, out: &mut Vec<Injected<'d>>) {
    if !out.iter().any(|i| i.name == candidate.name) {
        out.push(candidate);
    }
}

fn is_injected(annotations: &[Annotation], names: &[&str]) -> bool {
    names.iter().any(|n| has_annotation(annotations, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_patterns() {
        assert!(EXTERNAL_INTEGRATION_RE.is_match("PaymentGateway"));
        assert!(EXTERNAL_INTEGRATION_RE.is_match("inventoryClient"));
        assert!(EXTERNAL_INTEGRATION_RE.is_match("RestTemplate"));
        assert!(!EXTERNAL_INTEGRATION_RE.is_match("OrderService"));

        assert!(PERSISTENCE_RE.is_match("OrderRepository"));
        assert!(PERSISTENCE_RE.is_match("customerDao"));
        assert!(PERSISTENCE_RE.is_match("JdbcTemplate"));
        assert!(!PERSISTENCE_RE.is_match("PricingConfig"));
    }
}
