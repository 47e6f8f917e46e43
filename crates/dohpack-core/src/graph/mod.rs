//! Package dependency graph and cycle detection.

pub mod load;

use crate::context::BuildContext;
use crate::problems::{codes, Problem};
use load::{LoadKind, LoadStatement};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Directed "loads" graph over package and module names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    pub edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Add `from -> to`; both ends become nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Adjacency as `{"name": ["dep", ...]}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .edges
            .iter()
            .map(|(k, deps)| {
                let deps = deps.iter().cloned().map(Value::String).collect();
                (k.clone(), Value::Array(deps))
            })
            .collect();
        Value::Object(map)
    }
}

/// Build the graph from the package table. Malformed load entries are
/// reported and skipped.
pub fn build_graph(ctx: &mut BuildContext) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let mut problems = Vec::new();

    for (name, entry) in ctx.package_table() {
        graph.add_node(&name);
        for raw in &entry.load {
            match LoadStatement::parse(raw) {
                Ok(stmt) if stmt.kind == LoadKind::Module => graph.add_edge(&name, &stmt.target),
                Ok(_) => {}
                Err(message) => problems.push(
                    Problem::new(codes::MALFORMED_LOAD, format!("'{name}': {message}"))
                        .in_file(entry.file.clone())
                        .at_line(entry.line),
                ),
            }
        }
    }

    ctx.problems.extend(problems);
    graph
}

/// Names whose traversal reaches a cycle, sorted.
#[must_use]
pub fn find_cycles(graph: &DependencyGraph) -> Vec<String> {
    let mut cyclic = BTreeSet::new();

    for start in graph.edges.keys() {
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        if reaches_cycle(graph, start, &mut visited, &mut on_stack, &cyclic) {
            cyclic.insert(start.clone());
        }
    }

    cyclic.into_iter().collect()
}

fn reaches_cycle<'g>(
    graph: &'g DependencyGraph,
    node: &'g str,
    visited: &mut BTreeSet<&'g str>,
    on_stack: &mut BTreeSet<&'g str>,
    known: &BTreeSet<String>,
) -> bool {
    if on_stack.contains(node) || known.contains(node) {
        return true;
    }
    if !visited.insert(node) {
        return false;
    }

    on_stack.insert(node);
    let found = graph.edges.get(node).is_some_and(|deps| {
        deps.iter()
            .any(|dep| reaches_cycle(graph, dep, visited, on_stack, known))
    });
    on_stack.remove(node);
    found
}
