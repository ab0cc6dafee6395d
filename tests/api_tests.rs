mod common;

use std::process::Command;

use assert_fs::prelude::*;
use predicates::prelude::*;

use codescope::api::{dispatch, Operation, Outcome, Request};

use common::{engine, workspace};

#[test]
fn test_dispatch_wraps_success() {
    let temp = workspace();
    let engine = engine(&temp);

    let request = Request::from_json(r#"{"operation": "extract_shape", "type_name": "OrderLine"}"#).unwrap();
    let response = dispatch(&engine, request);

    assert!(response.is_success());
    assert_eq!(response.operation, "extract_shape");
    assert!(chrono::DateTime::parse_from_rfc3339(&response.generated_at).is_ok());

    let result = response.result().unwrap();
    assert_eq!(result["type_name"], "com.shop.domain.OrderLine");
    assert_eq!(result["root"]["children"].as_array().unwrap().len(), 3);
}

#[test]
fn test_dispatch_wraps_failure_with_suggestions() {
    let temp = workspace();
    let engine = engine(&temp);

    let response = dispatch(
        &engine,
        Request::new(Operation::ClassifyDependencies {
            type_name: "OrderServiceImp".to_string(),
        }),
    );
    assert!(!response.is_success());
    let failure = response.failure().unwrap();
    assert_eq!(failure.kind, "symbol_not_found");
    assert!(failure.suggestions.iter().any(|s| s == "com.shop.service.OrderServiceImpl"));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "failure");
    assert_eq!(json["error"]["kind"], "symbol_not_found");
}

#[test]
fn test_dispatch_honours_request_timeout() {
    let temp = workspace();
    let engine = engine(&temp);

    let request = Request::from_json(r#"{"operation": "list_routes", "timeout_ms": 0}"#).unwrap();
    let response = dispatch(&engine, request);
    match response.outcome {
        Outcome::Failure { error } => assert_eq!(error.kind, "timeout"),
        Outcome::Success { .. } => panic!("expected a timeout"),
    }

    // A timed-out build caches nothing
    let response = dispatch(&engine, Request::new(Operation::ListRoutes));
    assert!(response.is_success());
    assert_eq!(response.result().unwrap()["routes"].as_array().unwrap().len(), 3);
}

#[test]
fn test_dispatch_rejects_bad_verb() {
    let temp = workspace();
    let engine = engine(&temp);

    let response = dispatch(
        &engine,
        Request::new(Operation::TraceEndpoint {
            verb: "FETCH".to_string(),
            path: "/api/orders".to_string(),
        }),
    );
    assert_eq!(response.failure().unwrap().kind, "invalid_request");
}

#[test]
fn test_cli_init_and_routes() {
    let temp = workspace();
    let bin = env!("CARGO_BIN_EXE_codescope");

    let status = Command::new(bin)
        .args(["--root", temp.path().to_str().unwrap(), "init"])
        .status()
        .unwrap();
    assert!(status.success());
    temp.child("codescope.toml")
        .assert(predicate::str::contains("max_call_depth"));

    let again = Command::new(bin)
        .args(["--root", temp.path().to_str().unwrap(), "init"])
        .status()
        .unwrap();
    assert!(!again.success());

    let output = Command::new(bin)
        .args(["--root", temp.path().to_str().unwrap(), "--compact", "routes"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["status"], "success");
    assert_eq!(response["operation"], "list_routes");

    let missing = Command::new(bin)
        .args(["--root", temp.path().to_str().unwrap(), "shape", "Nope"])
        .output()
        .unwrap();
    assert!(!missing.status.success());
    let response: serde_json::Value = serde_json::from_slice(&missing.stdout).unwrap();
    assert_eq!(response["error"]["kind"], "symbol_not_found");
}
