//! Structured request/response boundary.
//!
//! A [`Request`] names one operation and carries its typed parameters. The
//! [`Response`] envelope always reports the operation, the elapsed time and a
//! timestamp, plus either a success payload or a structured failure.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::endpoints::HttpVerb;
use crate::core::Engine;
use crate::error::{CodescopeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub operation: Operation,
    /// Falls back to the session's `default_timeout_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    ResolveSymbol {
        name: String,
        file: PathBuf,
        #[serde(default)]
        line: Option<usize>,
    },
    MethodSource {
        type_name: String,
        method: String,
        #[serde(default)]
        arity: Option<usize>,
    },
    ExtractShape {
        type_name: String,
        #[serde(default)]
        max_depth: Option<usize>,
    },
    AnalyzeBranches {
        type_name: String,
        method: String,
        #[serde(default)]
        arity: Option<usize>,
    },
    AnalyzeSnippet {
        code: String,
    },
    TraceCalls {
        type_name: String,
        method: String,
        #[serde(default)]
        arity: Option<usize>,
        #[serde(default)]
        max_depth: Option<usize>,
        #[serde(default)]
        boundary_namespaces: Option<Vec<String>>,
    },
    ClassifyDependencies {
        type_name: String,
    },
    TraceEndpoint {
        verb: String,
        path: String,
    },
    FindUsages {
        symbol: String,
    },
    ListRoutes,
    StaleFiles,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolveSymbol { .. } => "resolve_symbol",
            Self::MethodSource { .. } => "method_source",
            Self::ExtractShape { .. } => "extract_shape",
            Self::AnalyzeBranches { .. } => "analyze_branches",
            Self::AnalyzeSnippet { .. } => "analyze_snippet",
            Self::TraceCalls { .. } => "trace_calls",
            Self::ClassifyDependencies { .. } => "classify_dependencies",
            Self::TraceEndpoint { .. } => "trace_endpoint",
            Self::FindUsages { .. } => "find_usages",
            Self::ListRoutes => "list_routes",
            Self::StaleFiles => "stale_files",
        }
    }
}

impl Request {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            timeout_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Parse a request from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CodescopeError::InvalidRequest(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<&CodescopeError> for Failure {
    fn from(error: &CodescopeError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            suggestions: error.suggestions().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { result: serde_json::Value },
    Failure { error: Failure },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub operation: String,
    pub elapsed_ms: u64,
    /// RFC 3339
    pub generated_at: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Outcome::Success { result } => Some(result),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failure { error } => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

/// Run one request against a session and wrap the outcome.
pub fn dispatch(engine: &Engine, request: Request) -> Response {
    let started = Instant::now();
    let name = request.operation.name();
    let timeout = request.timeout_ms.map(Duration::from_millis);

    let outcome = match run(engine, request.operation, timeout) {
        Ok(result) => Outcome::Success { result },
        Err(error) => {
            warn!(operation = name, kind = error.kind(), "{}", error);
            Outcome::Failure {
                error: Failure::from(&error),
            }
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(operation = name, elapsed_ms, "request handled");

    Response {
        operation: name.to_string(),
        elapsed_ms,
        generated_at: chrono::Utc::now().to_rfc3339(),
        outcome,
    }
}

fn run(engine: &Engine, operation: Operation, timeout: Option<Duration>) -> Result<serde_json::Value> {
    let value = match operation {
        Operation::ResolveSymbol { name, file, line } => {
            serde_json::to_value(engine.resolve_symbol(&name, &file, line, timeout)?)?
        }
        Operation::MethodSource { type_name, method, arity } => {
            serde_json::to_value(engine.method_source(&type_name, &method, arity, timeout)?)?
        }
        Operation::ExtractShape { type_name, max_depth } => {
            serde_json::to_value(engine.extract_shape(&type_name, max_depth, timeout)?)?
        }
        Operation::AnalyzeBranches { type_name, method, arity } => {
            serde_json::to_value(engine.analyze_branches(&type_name, &method, arity, timeout)?)?
        }
        Operation::AnalyzeSnippet { code } => serde_json::to_value(engine.analyze_snippet(&code, timeout)?)?,
        Operation::TraceCalls {
            type_name,
            method,
            arity,
            max_depth,
            boundary_namespaces,
        } => serde_json::to_value(engine.trace_calls(
            &type_name,
            &method,
            arity,
            max_depth,
            boundary_namespaces.as_deref(),
            timeout,
        )?)?,
        Operation::ClassifyDependencies { type_name } => {
            serde_json::to_value(engine.classify_dependencies(&type_name, timeout)?)?
        }
        Operation::TraceEndpoint { verb, path } => {
            let verb: HttpVerb = verb.parse()?;
            serde_json::to_value(engine.trace_endpoint(verb, &path, timeout)?)?
        }
        Operation::FindUsages { symbol } => serde_json::to_value(engine.find_usages(&symbol, timeout)?)?,
        Operation::ListRoutes => serde_json::to_value(engine.list_routes(timeout)?.as_ref())?,
        Operation::StaleFiles => serde_json::to_value(engine.stale_files())?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_tagged_operation() {
        let request = Request::from_json(
            r#"{"operation": "trace_calls", "type_name": "OrderService", "method": "place", "max_depth": 3, "timeout_ms": 500}"#,
        )
        .unwrap();

        assert_eq!(request.operation.name(), "trace_calls");
        assert_eq!(request.timeout_ms, Some(500));
        match request.operation {
            Operation::TraceCalls { max_depth, arity, .. } => {
                assert_eq!(max_depth, Some(3));
                assert_eq!(arity, None);
            }
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_unit_operations_and_bad_requests() {
        let request = Request::from_json(r#"{"operation": "list_routes"}"#).unwrap();
        assert_eq!(request.operation.name(), "list_routes");

        let err = Request::from_json(r#"{"operation": "compile"}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn test_failure_carries_suggestions() {
        let error = CodescopeError::symbol_not_found("OrderServce", vec!["com.shop.OrderService".to_string()]);
        let failure = Failure::from(&error);
        assert_eq!(failure.kind, "symbol_not_found");
        assert_eq!(failure.suggestions, vec!["com.shop.OrderService"]);
    }
}
