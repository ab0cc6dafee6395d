// src/core/call_graph/mod.rs
//! Call-chain tracing from an entry method
//!
//! Call sites are resolved through the type resolver and followed depth
//! first. Recursion, depth limits, boundary namespaces and unresolvable
//! dispatch all end a branch with an explicit terminal marker.

mod call_graph;
mod call_chain_tracer;

pub use call_graph::{CallEdge, CallGraph, CallNode, EdgeKind, MethodKey, TerminalMarker};
pub use call_chain_tracer::{CallChainTracer, CallTrace, Leaf};
