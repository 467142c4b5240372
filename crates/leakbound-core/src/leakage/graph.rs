//! Dependency view over the bit arena
//!
//! Only the part of the arena that can influence an observed output matters
//! for leakage, so the view is built by walking backwards from the sinks.
//! Edges point from a dependency to the bit derived from it.

use crate::lattice::{BitArena, BitId};
use crate::registry::GraphSnapshot;
use indexmap::{IndexMap, IndexSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<BitId, ()>,
    nodes: IndexMap<BitId, NodeIndex>,
    sources: Vec<NodeIndex>,
    sinks: Vec<NodeIndex>,
}

impl DependencyGraph {
    pub fn build(arena: &BitArena, sources: &IndexSet<BitId>, sinks: &IndexSet<BitId>) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: IndexMap<BitId, NodeIndex> = IndexMap::new();
        let mut stack = Vec::new();

        for &sink in sinks.iter().filter(|&&b| arena.is_unknown(b)) {
            if !nodes.contains_key(&sink) {
                nodes.insert(sink, graph.add_node(sink));
                stack.push(sink);
            }
        }

        while let Some(bit) = stack.pop() {
            let to = nodes[&bit];
            for &dep in arena.deps(bit) {
                if !arena.is_unknown(dep) {
                    continue;
                }
                let from = match nodes.get(&dep) {
                    Some(&index) => index,
                    None => {
                        let index = graph.add_node(dep);
                        nodes.insert(dep, index);
                        stack.push(dep);
                        index
                    }
                };
                graph.add_edge(from, to, ());
            }
        }

        let sources = sources.iter().filter_map(|b| nodes.get(b).copied()).collect();
        let sinks = sinks.iter().filter_map(|b| nodes.get(b).copied()).collect();
        Self {
            graph,
            nodes,
            sources,
            sinks,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, bit: BitId) -> bool {
        self.nodes.contains_key(&bit)
    }

    pub(crate) fn graph(&self) -> &DiGraph<BitId, ()> {
        &self.graph
    }

    pub(crate) fn source_nodes(&self) -> &[NodeIndex] {
        &self.sources
    }

    pub(crate) fn sink_nodes(&self) -> &[NodeIndex] {
        &self.sinks
    }

    /// Sources that reach at least one sink
    pub fn sources(&self) -> impl Iterator<Item = BitId> + '_ {
        self.sources.iter().map(|&n| self.graph[n])
    }

    pub fn sinks(&self) -> impl Iterator<Item = BitId> + '_ {
        self.sinks.iter().map(|&n| self.graph[n])
    }

    /// `(dependency, dependent)` pairs
    pub fn edges(&self) -> Vec<(BitId, BitId)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()]))
            .collect()
    }

    pub fn snapshot(&self, arena: &BitArena) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.graph.node_weights().map(|&b| (b, arena.val(b))).collect(),
            edges: self.edges(),
            sources: self.sources().collect(),
            sinks: self.sinks().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Origin;
    use crate::ops;

    #[test]
    fn test_walk_stops_at_unreachable_bits() {
        let mut arena = BitArena::new();
        let x = arena.fresh(Origin::Input);
        let unrelated = arena.fresh(Origin::Input);
        let _noise = ops::not(&mut arena, unrelated);
        let y = ops::wrap(&mut arena, x);
        let sources: IndexSet<BitId> = [x, unrelated].into_iter().collect();
        let sinks: IndexSet<BitId> = [y].into_iter().collect();
        let graph = DependencyGraph::build(&arena, &sources, &sinks);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edges(), vec![(x, y)]);
        assert_eq!(graph.sources().collect::<Vec<_>>(), vec![x]);
        assert!(!graph.contains(unrelated));
    }

    #[test]
    fn test_constant_sinks_are_ignored() {
        let mut arena = BitArena::new();
        let c = arena.constant(false);
        let sinks: IndexSet<BitId> = [c].into_iter().collect();
        let graph = DependencyGraph::build(&arena, &IndexSet::new(), &sinks);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.sinks().count(), 0);
    }
}
