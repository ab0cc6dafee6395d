// src/core/endpoints/mod.rs
//! Route index and endpoint flow tracing
//!
//! Handler methods are found through Spring and JAX-RS mapping annotations.
//! A matched route is traced down through business logic to the
//! persistence calls and entity types it touches.

mod flow;
mod route_index;

pub use flow::{compose_flow, CrudOperation, EndpointFlow, EntityTouch, PersistenceOperation};
pub use route_index::{join_paths, HttpVerb, Route, RouteIndex, RouteMatch, RouteTemplate};
