//! Codescope answers structural questions about annotation-driven Java
//! codebases: symbol resolution, data shapes, branch structure, call chains,
//! dependency roles, HTTP endpoint flows and usages.
//!
//! One [`Engine`] is one analysis session over a workspace root. Requests can
//! be issued directly against the engine or through the JSON envelope in
//! [`api`].

pub mod api;
pub mod config;
pub mod core;
pub mod error;

pub use api::{dispatch, Operation, Request, Response};
pub use config::Config;
pub use crate::core::Engine;
pub use error::{CodescopeError, ParseFailure, Result};
