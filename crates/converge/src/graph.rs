//! Directed dependency graph with cached topological ordering.
//!
//! An edge from `a` to `b` means `a` must run before `b`. The sort result is
//! cached behind its own reader/writer lock; every edge mutation invalidates
//! the cache before the write completes.

use std::collections::{HashMap, VecDeque};
use std::io;

use parking_lot::RwLock;

use crate::error::GraphError;

#[derive(Debug, Clone, Default)]
struct Node {
    /// Outgoing edge targets, in insertion order.
    edges: Vec<String>,
}

/// A directed graph of named nodes.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    cached_order: RwLock<Option<Vec<String>>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. A node with the same name is overwritten, dropping its
    /// edges; callers that care prevent duplicate registration themselves.
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.nodes.insert(name.into(), Node::default());
        self.invalidate();
    }

    /// Appends edges from `source` to each target. Fails when the source is
    /// unknown; targets are not validated here (the orchestrator validates
    /// dependencies before sorting).
    pub fn add_edge(&mut self, source: &str, targets: &[&str]) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(source)
            .ok_or_else(|| GraphError::NodeNotFound(source.to_string()))?;
        node.edges.extend(targets.iter().map(|t| t.to_string()));
        self.invalidate();
        Ok(())
    }

    /// Like [`Graph::add_edge`], but requires both ends to exist.
    pub fn add_edge_checked(&mut self, source: &str, targets: &[&str]) -> Result<(), GraphError> {
        for target in targets {
            if !self.nodes.contains_key(*target) {
                return Err(GraphError::NodeNotFound(target.to_string()));
            }
        }
        self.add_edge(source, targets)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the names of all nodes the given node points to (a copy).
    /// Unknown nodes yield an empty list.
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.nodes
            .get(name)
            .map(|n| n.edges.clone())
            .unwrap_or_default()
    }

    /// Returns the node names in topological order, caching the result.
    /// Subsequent calls return the cached order until the graph is mutated.
    pub fn sort(&self) -> Result<Vec<String>, GraphError> {
        if let Some(order) = self.cached_order.read().as_ref() {
            return Ok(order.clone());
        }

        let sorted = self.kahn_sort()?;
        *self.cached_order.write() = Some(sorted.clone());
        Ok(sorted)
    }

    fn invalidate(&mut self) {
        *self.cached_order.write() = None;
    }

    /// Kahn's algorithm on in-degrees. A result shorter than the node set
    /// means a cycle. Seed order follows map iteration, so sibling order is
    /// not stable across runs; callers pin order with explicit edges.
    fn kahn_sort(&self) -> Result<Vec<String>, GraphError> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.keys().map(|name| (name.as_str(), 0)).collect();

        for node in self.nodes.values() {
            for target in &node.edges {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(name) = queue.pop_front() {
            sorted.push(name.to_string());

            if let Some(node) = self.nodes.get(name) {
                for target in &node.edges {
                    if let Some(degree) = in_degree.get_mut(target.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(target.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(GraphError::CircularDependency);
        }

        Ok(sorted)
    }

    /// Returns a new graph with identical nodes and every edge reversed.
    pub fn reversed(&self) -> Graph {
        let mut reversed = Graph::new();
        for name in self.nodes.keys() {
            reversed.add_node(name.clone());
        }
        for (name, node) in &self.nodes {
            for target in &node.edges {
                if let Some(target_node) = reversed.nodes.get_mut(target) {
                    target_node.edges.push(name.clone());
                }
            }
        }
        reversed
    }

    /// Writes a Graphviz DOT representation. Nodes are emitted sorted by
    /// name so the output is stable.
    pub fn as_dot(&self, w: &mut impl io::Write, graph_name: &str) -> io::Result<()> {
        writeln!(w, "digraph {graph_name:?} {{")?;
        writeln!(w, "  rankdir=\"LR\";")?;
        writeln!(w, "  node [shape=box, style=rounded];")?;

        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();

        for name in names {
            let node = &self.nodes[name];
            if node.edges.is_empty() {
                writeln!(w, "  {name:?};")?;
            } else {
                for edge in &node.edges {
                    writeln!(w, "  {name:?} -> {edge:?};")?;
                }
            }
        }
        writeln!(w, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(names: &[&str]) -> Graph {
        let mut g = Graph::new();
        for name in names {
            g.add_node(*name);
        }
        g
    }

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
    }

    #[test]
    fn add_edge_to_unknown_source_fails() {
        let mut g = graph_of(&["target"]);
        let err = g.add_edge("source", &["target"]).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("source".into()));
    }

    #[test]
    fn add_edge_does_not_validate_targets() {
        let mut g = graph_of(&["source"]);
        g.add_edge("source", &["ghost"]).unwrap();
        assert_eq!(g.get_dependents("source"), vec!["ghost".to_string()]);
    }

    #[test]
    fn add_edge_checked_requires_both_ends() {
        let mut g = graph_of(&["source"]);
        let err = g.add_edge_checked("source", &["ghost"]).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound("ghost".into()));
        assert!(g.get_dependents("source").is_empty());
    }

    #[test]
    fn sort_respects_dependencies() {
        let mut g = graph_of(&["a", "b", "c", "d"]);
        g.add_edge("a", &["b"]).unwrap();
        g.add_edge("b", &["c"]).unwrap();
        g.add_edge("a", &["d"]).unwrap();

        let order = g.sort().unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "a") < position(&order, "b"));
        assert!(position(&order, "b") < position(&order, "c"));
        assert!(position(&order, "a") < position(&order, "d"));
    }

    #[test]
    fn sort_detects_cycle() {
        let mut g = graph_of(&["a", "b"]);
        g.add_edge("a", &["b"]).unwrap();
        g.add_edge("b", &["a"]).unwrap();
        assert_eq!(g.sort().unwrap_err(), GraphError::CircularDependency);
    }

    #[test]
    fn sort_is_cached_until_mutation() {
        let mut g = graph_of(&["a", "b"]);
        g.add_edge("a", &["b"]).unwrap();
        assert_eq!(g.sort().unwrap(), vec!["a".to_string(), "b".to_string()]);

        // A new edge must invalidate the cached order.
        g.add_edge("b", &["a"]).unwrap();
        assert_eq!(g.sort().unwrap_err(), GraphError::CircularDependency);
    }

    #[test]
    fn reversed_flips_every_edge() {
        let mut g = graph_of(&["a", "b", "c"]);
        g.add_edge("a", &["b", "c"]).unwrap();

        let r = g.reversed();
        assert!(r.get_dependents("a").is_empty());
        assert_eq!(r.get_dependents("b"), vec!["a".to_string()]);
        assert_eq!(r.get_dependents("c"), vec!["a".to_string()]);

        let order = r.sort().unwrap();
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn get_dependents_returns_copy() {
        let mut g = graph_of(&["a", "b"]);
        g.add_edge("a", &["b"]).unwrap();

        let mut deps = g.get_dependents("a");
        deps.push("mutated".into());
        assert_eq!(g.get_dependents("a"), vec!["b".to_string()]);
        assert!(g.get_dependents("missing").is_empty());
    }

    #[test]
    fn as_dot_is_stable() {
        let mut g = graph_of(&["b", "a"]);
        g.add_edge("a", &["b"]).unwrap();

        let mut out = Vec::new();
        g.as_dot(&mut out, "deps").unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert_eq!(
            dot,
            "digraph \"deps\" {\n  rankdir=\"LR\";\n  node [shape=box, style=rounded];\n  \"a\" -> \"b\";\n  \"b\";\n}\n"
        );
    }
}
