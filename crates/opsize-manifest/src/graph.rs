//! Operator dependency graph using `petgraph`.
//!
//! Edges come from `from` references on operator inputs. The graph is
//! used to reject cycles; execution itself always follows declared order.

use opsize_common::error::{OpsizeError, Result};

/// A dependency graph of operators.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: petgraph::Graph<String, ()>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: petgraph::Graph::new(),
        }
    }

    /// Adds an operator node to the graph.
    pub fn add_operator(&mut self, name: impl Into<String>) -> petgraph::graph::NodeIndex {
        self.graph.add_node(name.into())
    }

    /// Adds a dependency edge: `dependent` reads the output of `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields upstream operators first.
    pub fn add_dependency(
        &mut self,
        dependent: petgraph::graph::NodeIndex,
        dependency: petgraph::graph::NodeIndex,
    ) {
        let _ = self.graph.add_edge(dependency, dependent, ());
    }

    /// Returns a topological ordering of the operators.
    ///
    /// # Errors
    ///
    /// Returns an error naming an operator on the cycle if the graph is
    /// not acyclic.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => {
                let name = self
                    .graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default();
                Err(OpsizeError::Manifest {
                    message: format!("cyclic dependency detected involving operator \"{name}\""),
                })
            }
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        let order = graph.resolve_order().expect("should resolve");
        assert!(order.is_empty());
    }

    #[test]
    fn linear_chain_puts_upstream_first() {
        let mut graph = DependencyGraph::new();
        let reader = graph.add_operator("reader");
        let infer = graph.add_operator("inference");
        let writer = graph.add_operator("writer");
        graph.add_dependency(infer, reader);
        graph.add_dependency(writer, infer);

        let order = graph.resolve_order().expect("should resolve");
        assert_eq!(order, vec!["reader", "inference", "writer"]);
    }

    #[test]
    fn fan_in_dependency() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_operator("a");
        let b = graph.add_operator("b");
        let c = graph.add_operator("c");
        graph.add_dependency(c, a);
        graph.add_dependency(c, b);

        let order = graph.resolve_order().expect("should resolve");
        let pos = |name: &str| order.iter().position(|n| n == name).expect(name);
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn cycle_detection() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_operator("a");
        let b = graph.add_operator("b");
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_operator("a");
        graph.add_dependency(a, a);
        assert!(graph.resolve_order().is_err());
    }
}
