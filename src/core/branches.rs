//! Decision points, outward paths and cyclomatic complexity of one method.
//!
//! Only syntactic decision points are counted. Each one contributes one to
//! the complexity and one test suggestion per outward path; reachability is
//! not checked.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CodescopeError, Result};
use super::languages::{JavaParser, LanguageParser};
use super::model::*;

const SNIPPET_TYPE: &str = "CodescopeSnippet";
const SNIPPET_METHOD: &str = "snippet";
const MAX_DESCRIPTION: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Conditional,
    MultiWay,
    ExceptionHandler,
    Loop,
    ConditionalExpression,
}

impl DecisionKind {
    fn slug(&self) -> &'static str {
        match self {
            Self::Conditional => "if",
            Self::MultiWay => "switch",
            Self::ExceptionHandler => "try",
            Self::Loop => "loop",
            Self::ConditionalExpression => "ternary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchNode {
    pub kind: DecisionKind,
    pub line: usize,
    pub end_line: usize,
    /// Number of decision points enclosing this one
    pub nesting_depth: usize,
    /// Condition, subject or loop header, shortened
    pub description: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBand {
    Low,
    Moderate,
    High,
}

impl ComplexityBand {
    pub fn from_score(score: usize) -> Self {
        match score {
            0..=5 => Self::Low,
            6..=10 => Self::Moderate,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuggestion {
    pub name: String,
    pub line: usize,
    pub path: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchReport {
    /// Method or snippet the report describes
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub branches: Vec<BranchNode>,
    pub total_branches: usize,
    pub total_paths: usize,
    pub cyclomatic_complexity: usize,
    pub complexity_band: ComplexityBand,
    /// Deepest stack of nested decision points; 0 for straight-line code
    pub max_nesting: usize,
    pub test_suggestions: Vec<TestSuggestion>,
}

/// Analyze a method body. Methods without a body report no branches.
pub fn analyze_method(method: &MethodDecl, location: Option<Location>) -> BranchReport {
    let mut report = match &method.body {
        Some(body) => analyze_block(body, &method.name),
        None => analyze_block(&Block::default(), &method.name),
    };
    report.signature = Some(method.signature.clone());
    report.location = location;
    report
}

/// Analyze a free-standing block; `subject` names it in suggestions.
pub fn analyze_block(block: &Block, subject: &str) -> BranchReport {
    let mut collector = BranchCollector::default();
    walk_block(&mut collector, block);
    let branches = collector.branches;

    let total_paths = branches.iter().map(|b| b.paths.len()).sum();
    let cyclomatic_complexity = branches.len() + 1;
    let max_nesting = branches
        .iter()
        .map(|b| b.nesting_depth + 1)
        .max()
        .unwrap_or(0);
    let test_suggestions = suggest_tests(subject, &branches);

    BranchReport {
        subject: subject.to_string(),
        signature: None,
        location: None,
        total_branches: branches.len(),
        total_paths,
        cyclomatic_complexity,
        complexity_band: ComplexityBand::from_score(cyclomatic_complexity),
        max_nesting,
        test_suggestions,
        branches,
    }
}

/// Parse a statement snippet as the body of a synthetic method. The first
/// snippet line keeps line number 1.
pub fn parse_snippet(code: &str) -> Result<Block> {
    let wrapped = format!(
        "class {} {{ void {}() {{ {}\n}} }}",
        SNIPPET_TYPE, SNIPPET_METHOD, code
    );
    let mut parser = JavaParser::new()?;
    let unit = parser.parse(&wrapped, Path::new("snippet.java"))?;
    unit.types
        .first()
        .and_then(|t| t.methods.first())
        .and_then(|m| m.body.clone())
        .ok_or_else(|| CodescopeError::InvalidRequest("snippet is not a statement block".to_string()))
}

#[derive(Default)]
struct BranchCollector {
    depth: usize,
    branches: Vec<BranchNode>,
}

impl BranchCollector {
    fn record(&mut self, kind: DecisionKind, span: Span, description: &str, paths: Vec<String>) {
        self.branches.push(BranchNode {
            kind,
            line: span.start_line,
            end_line: span.end_line,
            nesting_depth: self.depth,
            description: shorten(description),
            paths,
        });
    }

    fn nested<F: FnOnce(&mut Self)>(&mut self, f: F) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn record_switch(&mut self, switch: &SwitchBlock, span: Span) {
        let paths = switch
            .arms
            .iter()
            .map(|arm| {
                if arm.is_default {
                    "default".to_string()
                } else {
                    format!("case {}", arm.labels.join(", "))
                }
            })
            .collect();
        self.record(DecisionKind::MultiWay, span, &switch.subject.text, paths);
        self.nested(|c| walk_switch(c, switch));
    }
}

impl Visitor for BranchCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let implicit = if else_branch.is_some() { "false-branch" } else { "implicit-else" };
                self.record(
                    DecisionKind::Conditional,
                    stmt.span,
                    &condition.text,
                    vec!["true-branch".to_string(), implicit.to_string()],
                );
                self.nested(|c| {
                    c.visit_expr(condition);
                    c.visit_stmt(then_branch);
                });
                match else_branch {
                    // else-if chains stay at the same depth
                    Some(else_if) if matches!(else_if.kind, StmtKind::If { .. }) => self.visit_stmt(else_if),
                    Some(other) => self.nested(|c| c.visit_stmt(other)),
                    None => {}
                }
            }
            StmtKind::Switch(switch) => self.record_switch(switch, stmt.span),
            StmtKind::Try(try_stmt) => {
                let mut paths = vec!["normal".to_string()];
                for catch in &try_stmt.catches {
                    let types: Vec<String> = catch.types.iter().map(|t| t.raw.clone()).collect();
                    paths.push(format!("catch {}", types.join(" | ")));
                }
                if try_stmt.finally.is_some() {
                    paths.push("finally".to_string());
                }
                self.record(DecisionKind::ExceptionHandler, stmt.span, "try", paths);
                self.nested(|c| walk_stmt(c, stmt));
            }
            StmtKind::For { condition, .. } => {
                let header = condition.as_ref().map_or("for", |c| c.text.as_str());
                self.record_loop(stmt, header);
            }
            StmtKind::ForEach { var, iterable, .. } => {
                let header = format!("{} : {}", var.name, iterable.text);
                self.record_loop(stmt, &header);
            }
            StmtKind::While { condition, .. } => self.record_loop(stmt, &condition.text),
            StmtKind::DoWhile { condition, .. } => {
                self.record(
                    DecisionKind::Loop,
                    stmt.span,
                    &condition.text,
                    vec!["single-iteration".to_string(), "repeats".to_string()],
                );
                self.nested(|c| walk_stmt(c, stmt));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Conditional { condition, .. } => {
                self.record(
                    DecisionKind::ConditionalExpression,
                    expr.span,
                    &condition.text,
                    vec!["true-branch".to_string(), "false-branch".to_string()],
                );
                self.nested(|c| walk_expr(c, expr));
            }
            ExprKind::Switch(switch) => self.record_switch(switch, expr.span),
            _ => walk_expr(self, expr),
        }
    }
}

impl BranchCollector {
    fn record_loop(&mut self, stmt: &Stmt, header: &str) {
        self.record(
            DecisionKind::Loop,
            stmt.span,
            header,
            vec!["body-executes".to_string(), "body-skipped".to_string()],
        );
        self.nested(|c| walk_stmt(c, stmt));
    }
}

fn suggest_tests(subject: &str, branches: &[BranchNode]) -> Vec<TestSuggestion> {
    let mut out = Vec::new();
    for branch in branches {
        for path in &branch.paths {
            out.push(TestSuggestion {
                name: format!(
                    "test_{}_{}_line{}_{}",
                    subject,
                    branch.kind.slug(),
                    branch.line,
                    slug(path)
                ),
                line: branch.line,
                path: path.clone(),
                rationale: rationale(branch, path),
            });
        }
    }
    out
}

fn rationale(branch: &BranchNode, path: &str) -> String {
    let at = format!("line {}", branch.line);
    match (branch.kind, path) {
        (DecisionKind::Conditional | DecisionKind::ConditionalExpression, "true-branch") => {
            format!("Make `{}` true at {}", branch.description, at)
        }
        (DecisionKind::Conditional | DecisionKind::ConditionalExpression, _) => {
            format!("Make `{}` false at {}", branch.description, at)
        }
        (DecisionKind::MultiWay, "default") => {
            format!("Use a `{}` value matching no case at {}", branch.description, at)
        }
        (DecisionKind::MultiWay, case) => {
            format!("Use a `{}` value selecting `{}` at {}", branch.description, case, at)
        }
        (DecisionKind::ExceptionHandler, "normal") => format!("Run the try block at {} without an exception", at),
        (DecisionKind::ExceptionHandler, "finally") => format!("Check the finally block at {} runs on both outcomes", at),
        (DecisionKind::ExceptionHandler, catch) => {
            let exception = catch.trim_start_matches("catch ");
            format!("Throw {} inside the try block at {}", exception, at)
        }
        (DecisionKind::Loop, "body-executes") => format!("Enter the loop at {} at least once", at),
        (DecisionKind::Loop, "body-skipped") => format!("Skip the loop at {} entirely", at),
        (DecisionKind::Loop, "single-iteration") => format!("Exit the do-while at {} after one pass", at),
        (DecisionKind::Loop, _) => format!("Repeat the do-while at {} more than once", at),
    }
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn shorten(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_DESCRIPTION {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(MAX_DESCRIPTION - 3).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(code: &str) -> BranchReport {
        let block = parse_snippet(code).unwrap();
        analyze_block(&block, "sample")
    }

    #[test]
    fn test_two_independent_conditionals() {
        let report = analyze(
            r#"
            if (a > 0) { a--; }
            if (b) { call(); } else { other(); }
            "#,
        );

        assert_eq!(report.total_branches, 2);
        assert_eq!(report.cyclomatic_complexity, 3);
        assert_eq!(report.total_paths, 4);
        assert_eq!(report.test_suggestions.len(), 4);
        assert_eq!(report.complexity_band, ComplexityBand::Low);
        assert_eq!(report.branches[0].paths, vec!["true-branch", "implicit-else"]);
        assert_eq!(report.branches[1].paths, vec!["true-branch", "false-branch"]);
        assert_eq!(report.max_nesting, 1);
    }

    #[test]
    fn test_try_with_two_catches_and_finally() {
        let report = analyze(
            r#"
            try {
                load();
            } catch (IOException e) {
                retry();
            } catch (IllegalStateException | IllegalArgumentException e) {
                fail();
            } finally {
                close();
            }
            "#,
        );

        assert_eq!(report.total_branches, 1);
        let paths = &report.branches[0].paths;
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0], "normal");
        assert_eq!(paths[1], "catch IOException");
        assert_eq!(paths[2], "catch IllegalStateException | IllegalArgumentException");
        assert_eq!(paths[3], "finally");
    }

    #[test]
    fn test_loops_switch_and_nesting() {
        let report = analyze(
            r#"
            for (Item item : items) {
                while (item.pending()) {
                    int x = item.ready() ? 1 : 2;
                }
            }
            do { tick(); } while (running);
            switch (status) {
                case OPEN: open(); break;
                case CLOSED: close(); break;
                default: break;
            }
            "#,
        );

        let kinds: Vec<DecisionKind> = report.branches.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DecisionKind::Loop,
                DecisionKind::Loop,
                DecisionKind::ConditionalExpression,
                DecisionKind::Loop,
                DecisionKind::MultiWay,
            ]
        );
        assert_eq!(report.branches[2].nesting_depth, 2);
        assert_eq!(report.max_nesting, 3);
        assert_eq!(report.branches[3].paths, vec!["single-iteration", "repeats"]);
        assert_eq!(report.branches[4].paths, vec!["case OPEN", "case CLOSED", "default"]);
        assert_eq!(report.cyclomatic_complexity, 6);
        assert_eq!(report.complexity_band, ComplexityBand::Moderate);
    }

    #[test]
    fn test_else_if_chain_stays_flat() {
        let report = analyze(
            r#"
            if (a) { one(); }
            else if (b) { two(); }
            else { three(); }
            "#,
        );
        assert_eq!(report.total_branches, 2);
        assert!(report.branches.iter().all(|b| b.nesting_depth == 0));
    }

    #[test]
    fn test_suggestion_names_are_unique_and_descriptive() {
        let report = analyze("if (order.isPaid()) { ship(); }");
        let names: Vec<&str> = report.test_suggestions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["test_sample_if_line1_true_branch", "test_sample_if_line1_implicit_else"]);
        assert!(report.test_suggestions[0].rationale.contains("order.isPaid()"));
    }

    #[test]
    fn test_band_thresholds() {
        assert_eq!(ComplexityBand::from_score(5), ComplexityBand::Low);
        assert_eq!(ComplexityBand::from_score(6), ComplexityBand::Moderate);
        assert_eq!(ComplexityBand::from_score(10), ComplexityBand::Moderate);
        assert_eq!(ComplexityBand::from_score(11), ComplexityBand::High);
    }
}
