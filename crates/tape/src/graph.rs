use std::collections::BTreeSet;

use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    visit::{Dfs, EdgeRef, Reversed, Walker},
};
use rewind_core::Variable;

use crate::{Store, Tape};

/// The dependency graph of a tape's equations.
///
/// Each node is an equation, identified by its index in the tape and
/// weighted by its target. An edge runs from the producer of a variable to
/// each equation that reads it, weighted by that variable.
#[derive(Debug)]
pub struct TapeGraph {
    graph: DiGraph<Variable, Variable>,
}

impl TapeGraph {
    fn build<S: Store>(tape: &Tape<S>) -> Self {
        let mut graph = DiGraph::with_capacity(tape.equations.len(), 0);
        for equation in &tape.equations {
            graph.add_node(equation.target().clone());
        }

        for (index, equation) in tape.equations.iter().enumerate() {
            for dep in equation.dependencies() {
                if let Some(producer) = tape.producer(dep) {
                    graph.add_edge(NodeIndex::new(producer), NodeIndex::new(index), dep.clone());
                }
            }
        }

        Self { graph }
    }

    /// Returns the number of equations.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of producer-to-consumer edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the target of equation `index`.
    #[must_use]
    pub fn target(&self, index: usize) -> Option<&Variable> {
        self.graph.node_weight(NodeIndex::new(index))
    }

    /// Returns a topological order of the equations, or `None` if the graph
    /// contains a cycle.
    ///
    /// Registration rules make cycles impossible on a tape, so this is mostly
    /// useful for checking graphs assembled by hand.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        toposort(&self.graph, None)
            .ok()
            .map(|order| order.into_iter().map(NodeIndex::index).collect())
    }

    /// Iterates over the `(producer, variable)` pairs equation `index` reads.
    pub fn inputs(&self, index: usize) -> impl Iterator<Item = (usize, &Variable)> {
        self.graph
            .edges_directed(NodeIndex::new(index), Direction::Incoming)
            .map(|edge| (edge.source().index(), edge.weight()))
    }

    /// Iterates over the equations that read the target of equation `index`.
    pub fn consumers(&self, index: usize) -> impl Iterator<Item = usize> {
        self.graph
            .neighbors_directed(NodeIndex::new(index), Direction::Outgoing)
            .map(NodeIndex::index)
    }

    /// Returns every equation reachable from `roots`, including the roots.
    #[must_use]
    pub fn downstream_of(&self, roots: &[usize]) -> BTreeSet<usize> {
        let mut reached = BTreeSet::new();
        for &root in roots.iter().filter(|&&r| r < self.node_count()) {
            let dfs = Dfs::new(&self.graph, NodeIndex::new(root));
            reached.extend(dfs.iter(&self.graph).map(NodeIndex::index));
        }
        reached
    }

    /// Returns every equation `roots` depend on, including the roots.
    #[must_use]
    pub fn upstream_of(&self, roots: &[usize]) -> BTreeSet<usize> {
        let reversed = Reversed(&self.graph);
        let mut reached = BTreeSet::new();
        for &root in roots.iter().filter(|&&r| r < self.node_count()) {
            let dfs = Dfs::new(reversed, NodeIndex::new(root));
            reached.extend(dfs.iter(reversed).map(NodeIndex::index));
        }
        reached
    }
}

impl<S: Store> Tape<S> {
    /// Builds the dependency graph of the registered equations.
    #[must_use]
    pub fn graph(&self) -> TapeGraph {
        TapeGraph::build(self)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use crate::{Tape, blocks::LinearCombination};

    #[test]
    fn reachability_follows_dependencies() {
        // a   b
        // |   |
        // c   |
        //  \ /
        //   d
        let mut tape = Tape::default();
        let a = tape.register_initial_condition("a", array![1.0]).unwrap();
        let b = tape.register_initial_condition("b", array![1.0]).unwrap();
        let (c, _) = tape.assign("c", LinearCombination::assign(a)).unwrap();
        tape.assign("d", LinearCombination::new([(c, 1.0), (b, 1.0)]))
            .unwrap();

        let graph = tape.graph();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.target(2).map(ToString::to_string), Some("c:0:0".into()));

        assert_eq!(graph.downstream_of(&[0]).into_iter().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(graph.upstream_of(&[2]).into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(graph.consumers(1).collect::<Vec<_>>(), vec![3]);

        let mut inputs: Vec<usize> = graph.inputs(3).map(|(producer, _)| producer).collect();
        inputs.sort_unstable();
        assert_eq!(inputs, vec![1, 2]);

        let order = graph.topological_order().unwrap();
        let position = |i: usize| order.iter().position(|&o| o == i).unwrap();
        assert!(position(0) < position(2) && position(2) < position(3));
    }
}
