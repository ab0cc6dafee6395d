// src/core/call_graph/call_graph.rs - Call edges, trace trees and cycle detection
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use serde::{Serialize, Deserialize};

/// Unique identifier for a method in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    /// Qualified name of the declaring type
    pub declaring_type: String,
    pub method_name: String,
    pub arity: usize,
}

impl MethodKey {
    pub fn new(declaring_type: &str, method_name: &str, arity: usize) -> Self {
        Self {
            declaring_type: declaring_type.to_string(),
            method_name: method_name.to_string(),
            arity,
        }
    }

    /// Get display name for rendering
    pub fn display_name(&self) -> String {
        let simple = self
            .declaring_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.declaring_type);
        format!("{}.{}/{}", simple, self.method_name, self.arity)
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}/{}", self.declaring_type, self.method_name, self.arity)
    }
}

/// How a call site was bound to its callee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Direct,            // receiver type declares a body
    InterfaceDispatch, // declared on an interface
    AbstractDispatch,  // declared abstract on a class
    Unresolved,        // no declaration found
}

/// Edge in the call graph representing one call site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    /// Method making the call
    pub caller: MethodKey,
    pub file: PathBuf,
    /// Line number where the call occurs
    pub line: usize,
    pub column: usize,
    /// Method being called, when known
    pub callee: Option<MethodKey>,
    /// Name as written at the call site
    pub callee_name: String,
    /// Static type of the receiver, when it could be inferred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_type: Option<String>,
    pub kind: EdgeKind,
    /// Depth of the callee; the entry method is depth 0
    pub depth: usize,
}

/// Why a branch of the trace stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMarker {
    Boundary,
    Unresolved,
    EmptyBody,
    Cyclic,
    Visited,
    DepthLimit,
}

impl TerminalMarker {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Boundary => "boundary",
            Self::Unresolved => "unresolved",
            Self::EmptyBody => "empty-body",
            Self::Cyclic => "cyclic",
            Self::Visited => "visited",
            Self::DepthLimit => "depth-limit",
        }
    }

    /// Markers where the callee itself was never expanded
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Boundary | Self::Unresolved | Self::EmptyBody)
    }
}

/// Node in the traced call tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNode {
    /// Rendered name, `Type.method/arity` when resolved
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<MethodKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Call-site line in the caller (declaration line for the root)
    pub line: usize,
    pub depth: usize,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalMarker>,
    /// Dispatch candidates when the callee could not be pinned down
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub children: Vec<CallNode>,
}

impl CallNode {
    pub fn new(method: String, line: usize, depth: usize, kind: EdgeKind) -> Self {
        Self {
            method,
            key: None,
            file: None,
            line,
            depth,
            kind,
            terminal: None,
            candidates: Vec::new(),
            note: None,
            children: Vec::new(),
        }
    }

    pub fn terminal(mut self, marker: TerminalMarker) -> Self {
        self.terminal = Some(marker);
        self
    }

    /// Render the tree with box-drawing connectors
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.render_label());
        out.push('\n');
        self.render_children("", &mut out);
        out
    }

    fn render_label(&self) -> String {
        let mut label = self.method.clone();
        match self.kind {
            EdgeKind::InterfaceDispatch => label.push_str(" (interface dispatch)"),
            EdgeKind::AbstractDispatch => label.push_str(" (abstract dispatch)"),
            _ => {}
        }
        if let Some(marker) = self.terminal {
            label.push_str(&format!(" [{}]", marker.label()));
        }
        if !self.candidates.is_empty() {
            label.push_str(&format!(" {{{}}}", self.candidates.join(", ")));
        }
        label
    }

    fn render_children(&self, prefix: &str, out: &mut String) {
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            let last = i + 1 == count;
            let connector = if last { "└── " } else { "├── " };
            out.push_str(prefix);
            out.push_str(connector);
            out.push_str(&child.render_label());
            out.push('\n');

            let extension = if last { "    " } else { "│   " };
            child.render_children(&format!("{}{}", prefix, extension), out);
        }
    }
}

/// Call graph assembled from traced edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraph {
    /// All edges (calls) in the graph
    pub edges: Vec<CallEdge>,
    /// Adjacency list for efficient traversal
    adjacency_list: BTreeMap<MethodKey, Vec<MethodKey>>,
    /// Detected cycles in the call graph
    pub cycles: Vec<Vec<MethodKey>>,
}

impl CallGraph {
    /// Build a call graph from resolved edges
    pub fn from_edges(edges: &[CallEdge]) -> Self {
        let mut graph = Self {
            edges: edges.to_vec(),
            adjacency_list: BTreeMap::new(),
            cycles: Vec::new(),
        };
        graph.build_adjacency_list();
        graph.detect_cycles();
        graph
    }

    /// Caller -> callees, unresolved calls left out
    fn build_adjacency_list(&mut self) {
        self.adjacency_list.clear();

        for edge in &self.edges {
            let callee = match &edge.callee {
                Some(callee) => callee,
                None => continue,
            };
            let callees = self.adjacency_list.entry(edge.caller.clone()).or_default();
            if !callees.contains(callee) {
                callees.push(callee.clone());
            }
        }
    }

    /// Detect cycles in the call graph using DFS
    fn detect_cycles(&mut self) {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut current_path = Vec::new();

        let node_keys: Vec<_> = self.adjacency_list.keys().cloned().collect();

        for node in node_keys {
            if !visited.contains(&node) {
                self.dfs_cycle_detection(
                    &node,
                    &mut visited,
                    &mut rec_stack,
                    &mut current_path,
                );
            }
        }
    }

    /// DFS helper for cycle detection
    fn dfs_cycle_detection(
        &mut self,
        node: &MethodKey,
        visited: &mut HashSet<MethodKey>,
        rec_stack: &mut HashSet<MethodKey>,
        current_path: &mut Vec<MethodKey>,
    ) {
        visited.insert(node.clone());
        rec_stack.insert(node.clone());
        current_path.push(node.clone());

        let callees: Vec<_> = self.adjacency_list.get(node)
            .cloned()
            .unwrap_or_default();

        for callee in callees {
            if !visited.contains(&callee) {
                self.dfs_cycle_detection(&callee, visited, rec_stack, current_path);
            } else if rec_stack.contains(&callee) {
                if let Some(cycle_start) = current_path.iter().position(|n| n == &callee) {
                    let cycle = current_path[cycle_start..].to_vec();
                    self.cycles.push(cycle);
                }
            }
        }

        rec_stack.remove(node);
        current_path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(caller: &MethodKey, callee: &MethodKey, line: usize) -> CallEdge {
        CallEdge {
            caller: caller.clone(),
            file: PathBuf::from("A.java"),
            line,
            column: 8,
            callee: Some(callee.clone()),
            callee_name: callee.method_name.clone(),
            receiver_type: None,
            kind: EdgeKind::Direct,
            depth: 1,
        }
    }

    #[test]
    fn test_detects_mutual_recursion() {
        let a = MethodKey::new("com.shop.A", "ping", 0);
        let b = MethodKey::new("com.shop.A", "pong", 0);
        let c = MethodKey::new("com.shop.A", "done", 0);
        let graph = CallGraph::from_edges(&[edge(&a, &b, 3), edge(&b, &a, 7), edge(&b, &c, 8)]);

        assert_eq!(graph.cycles.len(), 1);
        assert_eq!(graph.cycles[0], vec![a.clone(), b.clone()]);
        assert_eq!(graph.adjacency_list.get(&b), Some(&vec![a.clone(), c.clone()]));
    }

    #[test]
    fn test_renders_box_tree() {
        let mut root = CallNode::new("OrderController.get/1".to_string(), 10, 0, EdgeKind::Direct);
        let mut service = CallNode::new("OrderService.find/1".to_string(), 12, 1, EdgeKind::InterfaceDispatch);
        service.children.push(
            CallNode::new("OrderRepository.findById".to_string(), 20, 2, EdgeKind::Direct)
                .terminal(TerminalMarker::Boundary),
        );
        root.children.push(service);
        root.children.push(
            CallNode::new("audit".to_string(), 13, 1, EdgeKind::Unresolved)
                .terminal(TerminalMarker::Unresolved),
        );

        let rendered = root.render();
        let expected = "OrderController.get/1\n\
                        ├── OrderService.find/1 (interface dispatch)\n\
                        │   └── OrderRepository.findById [boundary]\n\
                        └── audit [unresolved]\n";
        assert_eq!(rendered, expected);
    }
}
