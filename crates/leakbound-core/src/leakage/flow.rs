//! Split-vertex flow network and max-flow solvers
//!
//! Every bit `b` becomes an arc `b_in → b_out` of capacity one. Dependency
//! arcs and the arcs from the super source and into the super sink get a
//! capacity larger than any possible flow, so every finite cut consists of
//! bit arcs only and the max flow counts vertex-disjoint paths.
//!
//! Arcs are stored in pairs: arc `e` and its residual partner `e ^ 1`.

use super::graph::DependencyGraph;
use crate::lattice::BitId;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone)]
pub(crate) struct FlowNetwork {
    adjacency: Vec<Vec<usize>>,
    to: Vec<usize>,
    residual: Vec<u64>,
    /// `(arc, bit)` for every capacity-one bit arc
    split: Vec<(usize, BitId)>,
    source: usize,
    sink: usize,
}

impl FlowNetwork {
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let n = graph.node_count();
        let infinite = n as u64 + 1;
        let (source, sink) = (2 * n, 2 * n + 1);
        let mut network = Self {
            adjacency: vec![Vec::new(); 2 * n + 2],
            to: Vec::new(),
            residual: Vec::new(),
            split: Vec::with_capacity(n),
            source,
            sink,
        };
        let inner = |i: usize| 2 * i;
        let outer = |i: usize| 2 * i + 1;

        for node in graph.graph().node_indices() {
            let i = node.index();
            let arc = network.add_arc(inner(i), outer(i), 1);
            network.split.push((arc, graph.graph()[node]));
        }
        for edge in graph.graph().raw_edges() {
            network.add_arc(outer(edge.source().index()), inner(edge.target().index()), infinite);
        }
        for &s in graph.source_nodes() {
            network.add_arc(source, inner(s.index()), infinite);
        }
        for &t in graph.sink_nodes() {
            network.add_arc(outer(t.index()), sink, infinite);
        }
        network
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: u64) -> usize {
        let arc = self.to.len();
        self.to.push(to);
        self.residual.push(capacity);
        self.adjacency[from].push(arc);
        self.to.push(from);
        self.residual.push(0);
        self.adjacency[to].push(arc ^ 1);
        arc
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn sink(&self) -> usize {
        self.sink
    }

    fn push(&mut self, arc: usize, amount: u64) {
        self.residual[arc] -= amount;
        self.residual[arc ^ 1] += amount;
    }

    /// Shortest augmenting paths found by breadth-first search
    pub fn edmonds_karp(&mut self) -> u64 {
        let mut flow = 0;
        loop {
            let mut via: Vec<Option<usize>> = vec![None; self.node_count()];
            let mut queue = VecDeque::from([self.source]);
            let mut visited = vec![false; self.node_count()];
            visited[self.source] = true;
            while let Some(u) = queue.pop_front() {
                if u == self.sink {
                    break;
                }
                for &arc in &self.adjacency[u] {
                    let v = self.to[arc];
                    if self.residual[arc] > 0 && !visited[v] {
                        visited[v] = true;
                        via[v] = Some(arc);
                        queue.push_back(v);
                    }
                }
            }
            if !visited[self.sink] {
                return flow;
            }

            let mut path = Vec::new();
            let mut v = self.sink;
            while let Some(arc) = via[v] {
                path.push(arc);
                v = self.to[arc ^ 1];
            }
            let bottleneck = path.iter().map(|&a| self.residual[a]).min().unwrap_or(0);
            for &arc in &path {
                self.push(arc, bottleneck);
            }
            flow += bottleneck;
        }
    }

    fn levels(&self) -> Option<Vec<usize>> {
        let mut level = vec![usize::MAX; self.node_count()];
        level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);
        while let Some(u) = queue.pop_front() {
            for &arc in &self.adjacency[u] {
                let v = self.to[arc];
                if self.residual[arc] > 0 && level[v] == usize::MAX {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        (level[self.sink] != usize::MAX).then_some(level)
    }

    /// One augmenting path in the level graph, advancing `next` past dead
    /// arcs. Returns the amount pushed, zero once the phase is blocked.
    fn augment(&mut self, level: &[usize], next: &mut [usize]) -> u64 {
        let mut path: Vec<usize> = Vec::new();
        let mut u = self.source;
        loop {
            if u == self.sink {
                let bottleneck = path.iter().map(|&a| self.residual[a]).min().unwrap_or(0);
                for &arc in &path {
                    self.push(arc, bottleneck);
                }
                return bottleneck;
            }
            let mut advanced = false;
            while next[u] < self.adjacency[u].len() {
                let arc = self.adjacency[u][next[u]];
                let v = self.to[arc];
                if self.residual[arc] > 0 && level[v] == level[u] + 1 {
                    path.push(arc);
                    u = v;
                    advanced = true;
                    break;
                }
                next[u] += 1;
            }
            if !advanced {
                match path.pop() {
                    Some(arc) => {
                        u = self.to[arc ^ 1];
                        next[u] += 1;
                    }
                    None => return 0,
                }
            }
        }
    }

    /// Blocking flows over BFS level graphs
    pub fn dinic(&mut self) -> u64 {
        let mut flow = 0;
        while let Some(level) = self.levels() {
            let mut next = vec![0; self.node_count()];
            loop {
                let pushed = self.augment(&level, &mut next);
                if pushed == 0 {
                    break;
                }
                flow += pushed;
            }
        }
        flow
    }

    /// Nodes reachable from the source over arcs with residual capacity
    pub fn reachable_from_source(&self) -> Vec<bool> {
        let mut seen = vec![false; self.node_count()];
        seen[self.source] = true;
        let mut stack = vec![self.source];
        while let Some(u) = stack.pop() {
            for &arc in &self.adjacency[u] {
                let v = self.to[arc];
                if self.residual[arc] > 0 && !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
            }
        }
        seen
    }

    /// Arcs with residual capacity as `(from, to)` pairs
    pub fn residual_arcs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency.iter().enumerate().flat_map(move |(u, arcs)| {
            arcs.iter()
                .filter(move |&&a| self.residual[a] > 0)
                .map(move |&a| (u, self.to[a]))
        })
    }

    /// Bits whose arc leaves the node set `inside`
    pub fn cut_of(&self, inside: &[bool]) -> BTreeSet<BitId> {
        self.split
            .iter()
            .filter(|&&(arc, _)| inside[self.to[arc ^ 1]] && !inside[self.to[arc]])
            .map(|&(_, bit)| bit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{BitArena, Origin};
    use crate::ops;
    use indexmap::IndexSet;

    /// Two secrets funnelled through a single conjunction
    fn funnel() -> (BitArena, DependencyGraph, BitId) {
        let mut arena = BitArena::new();
        let a = arena.fresh(Origin::Input);
        let b = arena.fresh(Origin::Input);
        let both = ops::and(&mut arena, a, b);
        let o1 = ops::wrap(&mut arena, both);
        let o2 = ops::wrap(&mut arena, both);
        let sources: IndexSet<BitId> = [a, b].into_iter().collect();
        let sinks: IndexSet<BitId> = [o1, o2].into_iter().collect();
        let graph = DependencyGraph::build(&arena, &sources, &sinks);
        (arena, graph, both)
    }

    #[test]
    fn test_edmonds_karp_counts_vertex_disjoint_paths() {
        let (_, graph, both) = funnel();
        let mut network = FlowNetwork::from_graph(&graph);
        assert_eq!(network.edmonds_karp(), 1);
        let cut = network.cut_of(&network.reachable_from_source());
        assert_eq!(cut.into_iter().collect::<Vec<_>>(), vec![both]);
    }

    #[test]
    fn test_dinic_agrees_with_edmonds_karp() {
        let (_, graph, _) = funnel();
        let mut ek = FlowNetwork::from_graph(&graph);
        let mut dinic = FlowNetwork::from_graph(&graph);
        assert_eq!(ek.edmonds_karp(), dinic.dinic());
    }

    #[test]
    fn test_parallel_paths() {
        let mut arena = BitArena::new();
        let xs: Vec<BitId> = (0..4).map(|_| arena.fresh(Origin::Input)).collect();
        let ys: Vec<BitId> = xs.iter().map(|&x| ops::wrap(&mut arena, x)).collect();
        let sources: IndexSet<BitId> = xs.iter().copied().collect();
        let sinks: IndexSet<BitId> = ys.iter().copied().collect();
        let graph = DependencyGraph::build(&arena, &sources, &sinks);
        let mut network = FlowNetwork::from_graph(&graph);
        assert_eq!(network.dinic(), 4);
        assert_eq!(network.cut_of(&network.reachable_from_source()).len(), 4);
    }
}
