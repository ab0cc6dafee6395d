mod common;

use std::path::Path;
use std::time::Duration;

use assert_fs::prelude::*;
use predicates::prelude::*;

use codescope::core::call_graph::{CallNode, EdgeKind, TerminalMarker};
use codescope::core::dependencies::{InjectionKind, Strategy};
use codescope::core::model::DeclarationKind;
use codescope::core::shape::{ShapeKind, ShapeTerminal, TypeTag};
use codescope::core::usages::UsageKind;
use codescope::CodescopeError;

use common::{engine, fixture_path, workspace};

fn find_node<'n>(node: &'n CallNode, method: &str) -> Option<&'n CallNode> {
    if node.method == method {
        return Some(node);
    }
    node.children.iter().find_map(|c| find_node(c, method))
}

#[test]
fn test_local_and_parameter_shadow_field() {
    let temp = workspace();
    let engine = engine(&temp);
    let file = fixture_path("service/DiscountCalculator.java");

    let param = engine.resolve_symbol("rate", Path::new(&file), Some(7), None).unwrap();
    assert_eq!(param.declaration_kind, DeclarationKind::Parameter);
    assert_eq!(param.resolved_type.as_deref(), Some("int"));

    let field = engine.resolve_symbol("rate", Path::new(&file), Some(11), None).unwrap();
    assert_eq!(field.declaration_kind, DeclarationKind::Field);
    assert_eq!(field.resolved_type.as_deref(), Some("java.lang.String"));
    assert_eq!(field.declaration_site.unwrap().start_line, 4);

    let local = engine.resolve_symbol("label", Path::new(&file), Some(12), None).unwrap();
    assert_eq!(local.declaration_kind, DeclarationKind::LocalVariable);
    assert_eq!(local.resolved_type.as_deref(), Some("java.lang.String"));
}

#[test]
fn test_resolves_imported_and_external_types() {
    let temp = workspace();
    let engine = engine(&temp);
    let file = fixture_path("service/OrderServiceImpl.java");

    let repo = engine.resolve_symbol("OrderRepository", Path::new(&file), None, None).unwrap();
    assert_eq!(repo.declaration_kind, DeclarationKind::Type);
    assert_eq!(repo.resolved_type.as_deref(), Some("com.shop.repo.OrderRepository"));
    assert!(!repo.is_external);

    let service = engine.resolve_symbol("Service", Path::new(&file), None, None).unwrap();
    assert!(service.is_external);
    assert_eq!(service.resolved_type.as_deref(), Some("org.springframework.stereotype.Service"));
}

#[test]
fn test_unknown_symbol_suggests_nearby_names() {
    let temp = workspace();
    let engine = engine(&temp);
    let file = fixture_path("service/DiscountCalculator.java");

    let err = engine.resolve_symbol("ratee", Path::new(&file), Some(11), None).unwrap_err();
    assert_eq!(err.kind(), "symbol_not_found");
    assert!(err.suggestions().iter().any(|s| s == "rate"));

    let err = engine
        .resolve_symbol("rate", Path::new(&fixture_path("service/DiscountCalculater.java")), None, None)
        .unwrap_err();
    assert_eq!(err.kind(), "symbol_not_found");
    assert!(err.suggestions().iter().any(|s| s.ends_with("DiscountCalculator.java")));
}

#[test]
fn test_method_source_includes_body_and_annotations() {
    let temp = workspace();
    let engine = engine(&temp);

    let source = engine.method_source("OrderServiceImpl", "placeOrder", None, None).unwrap();
    assert_eq!(source.type_name, "com.shop.service.OrderServiceImpl");
    assert!(source.signature.contains("placeOrder(OrderRequest request)"));
    assert!(source.source.contains("orderRepository.save(order)"));
    assert!(source.annotations.iter().any(|a| a == "@Override"));
    assert!(!source.ambiguous);
}

#[test]
fn test_shape_marks_cycles_and_expands_containers() {
    let temp = workspace();
    let engine = engine(&temp);

    let shape = engine.extract_shape("Order", Some(4), None).unwrap();
    assert_eq!(shape.type_name, "com.shop.domain.Order");
    assert_eq!(shape.root.tag, Some(TypeTag::EntityLike));

    let status = shape.root.child("status").unwrap();
    assert_eq!(status.kind, ShapeKind::Enum);
    assert_eq!(status.enum_constants, vec!["OPEN", "PAID", "SHIPPED"]);

    let total = shape.root.child("total").unwrap();
    assert_eq!(total.kind, ShapeKind::Primitive);

    let back_reference = shape.root.child("customer").unwrap().child("lastOrder").unwrap();
    assert_eq!(back_reference.terminal, Some(ShapeTerminal::Cyclic));

    let lines = shape.root.child("lines").unwrap();
    assert_eq!(lines.kind, ShapeKind::Collection);
    let element = lines.child("element").unwrap();
    assert_eq!(element.resolved_type.as_deref(), Some("com.shop.domain.OrderLine"));
    assert_eq!(element.child("order").unwrap().terminal, Some(ShapeTerminal::Cyclic));

    assert!(shape.root.height() <= 4);
}

#[test]
fn test_shape_respects_depth_limit() {
    let temp = workspace();
    let engine = engine(&temp);

    let shape = engine.extract_shape("com.shop.domain.Order", Some(1), None).unwrap();
    let customer = shape.root.child("customer").unwrap();
    assert_eq!(customer.terminal, Some(ShapeTerminal::DepthLimit));
    assert!(customer.children.is_empty());
    assert!(shape.root.height() <= 1);

    let err = engine.extract_shape("Order", Some(1000), None).unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
}

#[test]
fn test_branches_of_recursive_helper() {
    let temp = workspace();
    let engine = engine(&temp);

    let report = engine.analyze_branches("PricingPolicy", "price", Some(1), None).unwrap();
    assert_eq!(report.total_branches, 1);
    assert_eq!(report.cyclomatic_complexity, 2);
    assert_eq!(report.branches[0].line, 8);
    assert_eq!(report.branches[0].paths.len(), 2);
    assert_eq!(report.test_suggestions.len(), 2);
    assert!(report.subject.contains("price"));
}

#[test]
fn test_snippet_analysis() {
    let temp = workspace();
    let engine = engine(&temp);

    let code = "for (String item : items) {\n  if (item.isEmpty()) {\n    continue;\n  }\n}";
    let report = engine.analyze_snippet(code, None).unwrap();
    assert_eq!(report.total_branches, 2);
    assert_eq!(report.branches[0].line, 1);
    assert_eq!(report.branches[1].line, 2);
    assert_eq!(report.max_nesting, 2);

    let err = engine.analyze_snippet("if (x {", None).unwrap_err();
    assert_eq!(err.kind(), "parse_failure");
}

#[test]
fn test_trace_follows_single_implementation() {
    let temp = workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("OrderController", "create", None, Some(6), None, None).unwrap();
    assert_eq!(trace.entry.declaring_type, "com.shop.web.OrderController");

    let dispatch = trace
        .edges
        .iter()
        .find(|e| e.callee_name == "placeOrder")
        .unwrap();
    assert_eq!(dispatch.kind, EdgeKind::InterfaceDispatch);
    assert_eq!(
        dispatch.callee.as_ref().unwrap().declaring_type,
        "com.shop.service.OrderServiceImpl"
    );

    assert!(trace
        .boundary_hits
        .iter()
        .any(|hit| hit == "org.springframework.data.jpa.repository.JpaRepository.save"));
    assert!(trace
        .leaves
        .iter()
        .any(|leaf| leaf.kind == TerminalMarker::Boundary));
    assert!(predicate::str::contains("placeOrder").eval(&trace.rendered_tree));
}

#[test]
fn test_trace_marks_mutual_recursion() {
    let temp = workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("PricingPolicy", "discounted", None, None, None, None).unwrap();
    assert!(!trace.cycles.is_empty());

    let base = find_node(&trace.root, "PricingPolicy.base/1").unwrap();
    let back_edge = find_node(base, "PricingPolicy.discounted/1").unwrap();
    assert_eq!(back_edge.terminal, Some(TerminalMarker::Cyclic));
}

#[test]
fn test_trace_depth_limit() {
    let temp = workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("PricingPolicy", "price", None, Some(1), None, None).unwrap();
    assert_eq!(trace.max_depth, 1);
    assert!(trace.edges.iter().all(|e| e.depth <= 1));
    let discounted = find_node(&trace.root, "PricingPolicy.discounted/1").unwrap();
    assert_eq!(discounted.terminal, Some(TerminalMarker::DepthLimit));
}

#[test]
fn test_dependency_classification() {
    let temp = workspace();
    let engine = engine(&temp);

    let report = engine.classify_dependencies("OrderServiceImpl", None).unwrap();
    assert_eq!(report.dependencies.len(), 3);
    assert!(report
        .dependencies
        .iter()
        .all(|d| d.injection == InjectionKind::Constructor));

    let strategy_of = |name: &str| {
        report
            .dependencies
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.strategy)
            .unwrap()
    };
    assert_eq!(strategy_of("orderRepository"), Strategy::Substitute);
    assert_eq!(strategy_of("pricingPolicy"), Strategy::Substitute);
    assert_eq!(strategy_of("settings"), Strategy::UseRealInstance);
    assert_eq!(report.count(Strategy::Substitute), 2);
}

#[test]
fn test_usages_of_type_and_member() {
    let temp = workspace();
    let engine = engine(&temp);

    let report = engine.find_usages("OrderRepository", None).unwrap();
    assert_eq!(report.resolved_type.as_deref(), Some("com.shop.repo.OrderRepository"));
    assert!(report.usages.len() >= 2);
    assert!(report
        .usages
        .iter()
        .all(|u| u.file.ends_with("OrderServiceImpl.java")));

    let report = engine.find_usages("PricingPolicy.discounted", None).unwrap();
    assert_eq!(report.usages.len(), 2);
    assert!(report.usages.iter().all(|u| u.kind == UsageKind::MethodCall));
    let contexts: Vec<&str> = report.usages.iter().map(|u| u.context.as_str()).collect();
    assert!(contexts.contains(&"PricingPolicy.price"));
    assert!(contexts.contains(&"PricingPolicy.base/1"));

    let report = engine.find_usages("Order", None).unwrap();
    assert!(report
        .usages
        .iter()
        .any(|u| u.kind == UsageKind::Instantiation && u.file.ends_with("OrderServiceImpl.java")));
}

#[test]
fn test_zero_timeout_fails_fast() {
    let temp = workspace();
    let engine = engine(&temp);

    let err = engine
        .trace_calls("OrderController", "create", None, None, None, Some(Duration::ZERO))
        .unwrap_err();
    assert!(matches!(err, CodescopeError::Timeout { .. }));

    let err = engine.find_usages("Order", Some(Duration::ZERO)).unwrap_err();
    assert_eq!(err.kind(), "timeout");

    // The session stays usable afterwards
    assert!(engine.extract_shape("Order", None, None).is_ok());
}

#[test]
fn test_stale_files_reports_edits() {
    let temp = workspace();
    let engine = engine(&temp);

    engine.extract_shape("OrderLine", None, None).unwrap();
    assert!(engine.stale_files().is_empty());

    temp.child(fixture_path("domain/OrderLine.java"))
        .write_str("package com.shop.domain;\n\npublic class OrderLine {\n    private String sku;\n}\n")
        .unwrap();
    let stale = engine.stale_files();
    assert_eq!(stale.len(), 1);
    assert!(stale[0].ends_with("OrderLine.java"));

    // Parsed content stays pinned for the session
    let shape = engine.extract_shape("OrderLine", None, None).unwrap();
    assert!(shape.root.child("quantity").is_some());
}

#[test]
fn test_field_injection_repository_and_value_object() {
    let temp = workspace();
    temp.child(fixture_path("web/ReportController.java"))
        .write_str(
            r#"package com.shop.web;

import org.springframework.beans.factory.annotation.Autowired;

public class ReportController {
    @Autowired
    private ReportRepository reportRepository;

    @Autowired
    private ReportSettings reportSettings;

    private static final int LIMIT = 10;
}
"#,
        )
        .unwrap();
    let engine = engine(&temp);

    let report = engine.classify_dependencies("ReportController", None).unwrap();
    assert_eq!(report.dependencies.len(), 2);
    assert!(report.dependencies.iter().all(|d| d.injection == InjectionKind::Field));
    assert_eq!(report.count(Strategy::Substitute), 1);
    assert_eq!(report.count(Strategy::UseRealInstance), 1);
    assert_eq!(report.dependencies[0].name, "reportRepository");
    assert_eq!(report.dependencies[0].strategy, Strategy::Substitute);
}

#[test]
fn test_local_shadows_field_of_same_name() {
    let temp = workspace();
    temp.child(fixture_path("service/InvoiceFormatter.java"))
        .write_str(
            r#"package com.shop.service;

public class InvoiceFormatter {
    private String total;

    public String format(int amount) {
        int total = amount * 100;
        return "cents=" + total;
    }
}
"#,
        )
        .unwrap();
    let engine = engine(&temp);
    let file = fixture_path("service/InvoiceFormatter.java");

    let local = engine.resolve_symbol("total", Path::new(&file), Some(8), None).unwrap();
    assert_eq!(local.declaration_kind, DeclarationKind::LocalVariable);
    assert_eq!(local.resolved_type.as_deref(), Some("int"));
    assert_eq!(local.declaration_site.unwrap().start_line, 7);

    let field = engine.resolve_symbol("total", Path::new(&file), Some(4), None).unwrap();
    assert_eq!(field.declaration_kind, DeclarationKind::Field);
}

#[test]
fn test_simple_name_resolution_ignores_request_history() {
    let temp = workspace();
    temp.child(fixture_path("legacy/Order.java"))
        .write_str("package com.shop.legacy;\n\npublic class Order {\n    private String reference;\n}\n")
        .unwrap();

    let fresh = engine(&temp);
    let shape = fresh.extract_shape("Order", Some(1), None).unwrap();
    assert_eq!(shape.type_name, "com.shop.domain.Order");
    assert_eq!(shape.alternatives, vec!["com.shop.legacy.Order"]);

    let warmed = engine(&temp);
    let legacy = warmed.extract_shape("com.shop.legacy.Order", Some(1), None).unwrap();
    assert_eq!(legacy.type_name, "com.shop.legacy.Order");
    let shape = warmed.extract_shape("Order", Some(1), None).unwrap();
    assert_eq!(shape.type_name, "com.shop.domain.Order");
    assert_eq!(shape.alternatives, vec!["com.shop.legacy.Order"]);
}

#[test]
fn test_unknown_type_scan_honours_timeout() {
    let temp = workspace();
    for i in 0..300 {
        temp.child(fixture_path(&format!("generated/Generated{}.java", i)))
            .write_str(&format!(
                "package com.shop.generated;\n\npublic class Generated{i} {{\n    private int value;\n\n    public int next(int step) {{\n        if (step > 0) {{\n            return value + step;\n        }}\n        return value;\n    }}\n}}\n"
            ))
            .unwrap();
    }
    let limit = Some(Duration::from_millis(1));

    let err = engine(&temp).extract_shape("com.missing.Nope", Some(3), limit).unwrap_err();
    assert_eq!(err.kind(), "timeout");

    let err = engine(&temp).classify_dependencies("Nope", limit).unwrap_err();
    assert_eq!(err.kind(), "timeout");

    let err = engine(&temp).method_source("Nope", "run", None, limit).unwrap_err();
    assert_eq!(err.kind(), "timeout");

    // Without a budget the same lookup ends in a regular miss
    let err = engine(&temp).extract_shape("com.missing.Nope", Some(3), None).unwrap_err();
    assert_eq!(err.kind(), "symbol_not_found");
}

/// Interfaces with default methods, overrides and several implementations.
fn notify_workspace() -> assert_fs::TempDir {
    let temp = workspace();
    let files = [
        (
            "notify/Greeter.java",
            "package com.shop.notify;\n\npublic interface Greeter {\n    default String greet() {\n        return \"hello\";\n    }\n}\n",
        ),
        (
            "notify/LoudGreeter.java",
            "package com.shop.notify;\n\npublic class LoudGreeter implements Greeter {\n    @Override\n    public String greet() {\n        return shout(\"hello\");\n    }\n\n    private String shout(String text) {\n        return text.toUpperCase();\n    }\n}\n",
        ),
        (
            "notify/Farewell.java",
            "package com.shop.notify;\n\npublic interface Farewell {\n    default void wave() {\n        System.out.println(\"bye\");\n    }\n}\n",
        ),
        (
            "notify/Channel.java",
            "package com.shop.notify;\n\npublic interface Channel {\n    void push(String message);\n}\n",
        ),
        (
            "notify/EmailChannel.java",
            "package com.shop.notify;\n\npublic class EmailChannel implements Channel {\n    public void push(String message) {\n        System.out.println(message);\n    }\n}\n",
        ),
        (
            "notify/SmsChannel.java",
            "package com.shop.notify;\n\npublic class SmsChannel implements Channel {\n    public void push(String message) {\n        System.out.println(message);\n    }\n}\n",
        ),
        (
            "notify/Archive.java",
            "package com.shop.notify;\n\npublic interface Archive {\n    void keep(String message);\n}\n",
        ),
        (
            "notify/Welcome.java",
            r#"package com.shop.notify;

public class Welcome {
    private Greeter greeter;
    private Farewell farewell;
    private Channel channel;
    private Archive archive;

    public String run() {
        farewell.wave();
        return greeter.greet();
    }

    public void publish(String message) {
        channel.push(message);
        archive.keep(message);
    }
}
"#,
        ),
        (
            "notify/Notifier.java",
            r#"package com.shop.notify;

public class Notifier {
    public void send(String message) {
        deliver(message);
    }

    public void send(String message, int retries) {
        deliver(message);
    }

    void deliver(String message) {
        System.out.println(message);
    }
}
"#,
        ),
    ];
    for (path, content) in files {
        temp.child(fixture_path(path)).write_str(content).unwrap();
    }
    temp
}

#[test]
fn test_default_method_dispatches_to_override() {
    let temp = notify_workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("Welcome", "run", Some(0), None, None, None).unwrap();

    let greet = trace.edges.iter().find(|e| e.callee_name == "greet").unwrap();
    assert_eq!(greet.kind, EdgeKind::InterfaceDispatch);
    assert_eq!(greet.callee.as_ref().unwrap().declaring_type, "com.shop.notify.LoudGreeter");
    let loud = find_node(&trace.root, "LoudGreeter.greet/0").unwrap();
    assert!(find_node(loud, "LoudGreeter.shout/1").is_some());
    assert!(find_node(&trace.root, "Greeter.greet/0").is_none());

    // No override anywhere: the default body runs
    let wave = trace.edges.iter().find(|e| e.callee_name == "wave").unwrap();
    assert_eq!(wave.kind, EdgeKind::InterfaceDispatch);
    assert_eq!(wave.callee.as_ref().unwrap().declaring_type, "com.shop.notify.Farewell");
    assert_eq!(find_node(&trace.root, "Farewell.wave/0").unwrap().terminal, None);
}

#[test]
fn test_undecidable_dispatch_stays_terminal() {
    let temp = notify_workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("Welcome", "publish", None, None, None, None).unwrap();

    let push = find_node(&trace.root, "Channel.push/1").unwrap();
    assert_eq!(push.kind, EdgeKind::InterfaceDispatch);
    assert_eq!(push.terminal, Some(TerminalMarker::Unresolved));
    assert_eq!(
        push.candidates,
        vec!["com.shop.notify.EmailChannel.push/1", "com.shop.notify.SmsChannel.push/1"]
    );
    assert!(push.children.is_empty());

    let keep = find_node(&trace.root, "Archive.keep/1").unwrap();
    assert_eq!(keep.terminal, Some(TerminalMarker::Unresolved));
    assert!(keep.candidates.is_empty());

    let leaf = trace
        .leaves
        .iter()
        .find(|l| l.method == "com.shop.notify.Channel.push")
        .unwrap();
    assert_eq!(leaf.kind, TerminalMarker::Unresolved);
    assert_eq!(leaf.candidates.len(), 2);
}

#[test]
fn test_ambiguous_entry_overload_lists_candidates() {
    let temp = notify_workspace();
    let engine = engine(&temp);

    let trace = engine.trace_calls("Notifier", "send", None, None, None, None).unwrap();
    assert_eq!(trace.entry.arity, 1);
    let arities: Vec<usize> = trace.entry_candidates.iter().map(|k| k.arity).collect();
    assert_eq!(arities, vec![1, 2]);

    let source = engine.method_source("Notifier", "send", None, None).unwrap();
    assert!(source.ambiguous);
    assert_eq!(source.candidates.len(), 2);

    let pinned = engine.trace_calls("Notifier", "send", Some(2), None, None, None).unwrap();
    assert_eq!(pinned.entry.arity, 2);
    assert!(pinned.entry_candidates.is_empty());
}
