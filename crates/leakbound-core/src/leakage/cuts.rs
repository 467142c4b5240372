//! Enumeration of all minimum cuts
//!
//! After a maximum flow, the minimum cuts are exactly the node sets that
//! contain the source, exclude the sink and are closed under residual arcs.
//! Collapsing the residual graph into strongly connected components turns
//! this into enumerating closed sets of a DAG, which is done breadth first
//! starting from the smallest closure (everything reachable from the
//! source).

use super::flow::FlowNetwork;
use crate::lattice::BitId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Up to `limit` distinct minimum cuts of size `max_flow`, the cut nearest
/// to the source first
pub(crate) fn enumerate(network: &FlowNetwork, max_flow: u64, limit: usize) -> Vec<BTreeSet<BitId>> {
    let n = network.node_count();
    let mut residual: DiGraph<(), ()> = DiGraph::with_capacity(n, 0);
    for _ in 0..n {
        residual.add_node(());
    }
    for (u, v) in network.residual_arcs() {
        residual.add_edge(NodeIndex::new(u), NodeIndex::new(v), ());
    }

    let components = tarjan_scc(&residual);
    let mut component_of = vec![0usize; n];
    for (c, members) in components.iter().enumerate() {
        for node in members {
            component_of[node.index()] = c;
        }
    }
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    let mut predecessors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    for (u, v) in network.residual_arcs() {
        let (cu, cv) = (component_of[u], component_of[v]);
        if cu != cv {
            successors[cu].insert(cv);
            predecessors[cv].insert(cu);
        }
    }

    let source = component_of[network.source()];
    let sink = component_of[network.sink()];
    let closure = |seed: &BTreeSet<usize>| -> BTreeSet<usize> {
        let mut closed = seed.clone();
        let mut stack: Vec<usize> = seed.iter().copied().collect();
        while let Some(c) = stack.pop() {
            for &next in &successors[c] {
                if closed.insert(next) {
                    stack.push(next);
                }
            }
        }
        closed
    };

    // components that reach the sink can never join the source side
    let mut reaches_sink: HashSet<usize> = HashSet::from([sink]);
    let mut stack = vec![sink];
    while let Some(c) = stack.pop() {
        for &prev in &predecessors[c] {
            if reaches_sink.insert(prev) {
                stack.push(prev);
            }
        }
    }

    let base = closure(&BTreeSet::from([source]));
    let free: Vec<usize> = (0..components.len())
        .filter(|c| !base.contains(c) && !reaches_sink.contains(c))
        .collect();

    let mut seen: HashSet<BTreeSet<usize>> = HashSet::from([base.clone()]);
    let mut queue = VecDeque::from([base]);
    let mut cuts: Vec<BTreeSet<BitId>> = Vec::new();
    let mut distinct: HashSet<BTreeSet<BitId>> = HashSet::new();
    while let Some(side) = queue.pop_front() {
        let inside: Vec<bool> = (0..n).map(|node| side.contains(&component_of[node])).collect();
        let cut = network.cut_of(&inside);
        if cut.len() as u64 == max_flow && distinct.insert(cut.clone()) {
            cuts.push(cut);
            if cuts.len() >= limit {
                debug!(limit, "stopping minimum cut enumeration at limit");
                break;
            }
        }
        for &c in free.iter().filter(|c| !side.contains(c)) {
            let mut seed = side.clone();
            seed.insert(c);
            let grown = closure(&seed);
            if seen.insert(grown.clone()) {
                queue.push_back(grown);
            }
        }
    }
    cuts
}
