// src/core/mod.rs
mod engine;
mod parser;
mod deadline;
mod suggest;

// Source model
pub mod model;
pub mod type_ref;
mod languages;

// Workspace index and resolution
pub mod index;
pub mod resolver;

// Analysis passes
pub mod shape;
pub mod branches;
pub mod call_graph;
pub mod dependencies;
pub mod endpoints;
pub mod usages;

pub use parser::{content_hash, CodeParser};
pub use deadline::Deadline;
pub use suggest::nearest_names;
pub use languages::{JavaParser, LanguageParser};
pub use model::SourceUnit;
pub use index::{TypeEntry, WorkspaceIndex};
pub use resolver::{SymbolResolution, TypeResolver, TypeTarget};

// Export the main engine
pub use engine::{Engine, MethodSource};
