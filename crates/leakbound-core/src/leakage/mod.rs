//! Leakage bounds via minimum cuts
//!
//! For an observer at level `o`, secret sources are the input bits at
//! levels `s` with `s ⋢ o` and public sinks are the output bits at levels
//! `s ⊑ o`. The number of vertex-disjoint source-to-sink paths in the
//! dependency graph bounds how many secret bits the observer can learn.
//!
//! # Architecture
//!
//! 1. [`DependencyGraph`] extracts the relevant part of the bit arena.
//! 2. `FlowNetwork` splits each bit into a unit-capacity arc.
//! 3. The selected [`Algo`] computes the maximum flow.
//! 4. The minimum cut is read off the source side of the residual graph;
//!    [`Algo::CutEnumeration`] additionally lists alternative minimum cuts.

mod cuts;
mod flow;
mod graph;

pub use graph::DependencyGraph;

use crate::error::FlowError;
use crate::lattice::{BitArena, BitId};
use flow::FlowNetwork;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Maximum flow strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algo {
    #[default]
    EdmondsKarp,
    Dinic,
    /// Edmonds-Karp followed by enumeration of every minimum cut
    CutEnumeration,
}

impl Algo {
    pub fn supports_alternatives(self) -> bool {
        matches!(self, Algo::CutEnumeration)
    }

    pub fn name(self) -> &'static str {
        match self {
            Algo::EdmondsKarp => "edmonds_karp",
            Algo::Dinic => "dinic",
            Algo::CutEnumeration => "cut_enumeration",
        }
    }
}

impl fmt::Display for Algo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Algo {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "edmonds_karp" | "ek" => Ok(Algo::EdmondsKarp),
            "dinic" => Ok(Algo::Dinic),
            "cut_enumeration" | "cuts" => Ok(Algo::CutEnumeration),
            _ => Err(FlowError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakageOptions {
    pub record_alternatives: bool,
    pub max_alternatives: usize,
}

impl Default for LeakageOptions {
    fn default() -> Self {
        Self {
            record_alternatives: false,
            max_alternatives: 64,
        }
    }
}

impl LeakageOptions {
    /// Turn off alternative recording when `algo` cannot provide it
    pub fn for_algo(mut self, algo: Algo) -> Self {
        if self.record_alternatives && !algo.supports_alternatives() {
            let err = FlowError::UnsupportedAlgorithmFeature {
                algo: algo.to_string(),
                feature: "alternative minimum cuts",
            };
            warn!("{err}; recording of alternatives disabled");
            self.record_alternatives = false;
        }
        self
    }
}

/// Leakage bound for one observer level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakageResult {
    pub max_flow: u64,
    pub min_cut: BTreeSet<BitId>,
    /// Every minimum cut found, including `min_cut`; empty unless recorded
    pub alternatives: Vec<BTreeSet<BitId>>,
}

impl LeakageResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Compute the leakage bound between `sources` and `sinks`
pub fn compute(
    arena: &BitArena,
    sources: &IndexSet<BitId>,
    sinks: &IndexSet<BitId>,
    algo: Algo,
    options: LeakageOptions,
) -> LeakageResult {
    let graph = DependencyGraph::build(arena, sources, sinks);
    compute_on(&graph, algo, options)
}

pub fn compute_on(graph: &DependencyGraph, algo: Algo, options: LeakageOptions) -> LeakageResult {
    let options = options.for_algo(algo);
    if graph.sources().next().is_none() || graph.sinks().next().is_none() {
        return LeakageResult::empty();
    }

    let mut network = FlowNetwork::from_graph(graph);
    let max_flow = match algo {
        Algo::EdmondsKarp | Algo::CutEnumeration => network.edmonds_karp(),
        Algo::Dinic => network.dinic(),
    };
    let min_cut = network.cut_of(&network.reachable_from_source());
    debug!(
        %algo,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        max_flow,
        "computed leakage"
    );

    let alternatives = if options.record_alternatives {
        cuts::enumerate(&network, max_flow, options.max_alternatives.max(1))
    } else {
        Vec::new()
    };
    LeakageResult {
        max_flow,
        min_cut,
        alternatives,
    }
}
