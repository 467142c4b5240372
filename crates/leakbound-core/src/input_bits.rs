//! Secret input bits per security level

use crate::lattice::{BitArena, BitId, Sec, Value};
use indexmap::IndexSet;
use std::collections::BTreeMap;

/// Unknown input bits grouped by level, plus their union
#[derive(Debug, Clone)]
pub struct InputBits<S: Sec> {
    by_level: BTreeMap<S, IndexSet<BitId>>,
    all: IndexSet<BitId>,
}

impl<S: Sec> Default for InputBits<S> {
    fn default() -> Self {
        Self {
            by_level: BTreeMap::new(),
            all: IndexSet::new(),
        }
    }
}

impl<S: Sec> InputBits<S> {
    /// Record `bit` at `sec` unless it is already resolved
    pub fn put(&mut self, arena: &BitArena, sec: S, bit: BitId) {
        if arena.is_unknown(bit) {
            self.by_level.entry(sec).or_default().insert(bit);
            self.all.insert(bit);
        }
    }

    pub fn put_value(&mut self, arena: &BitArena, sec: S, value: &Value) {
        for bit in value.iter() {
            self.put(arena, sec, bit);
        }
    }

    pub fn put_all(&mut self, other: &InputBits<S>) {
        for (&sec, bits) in &other.by_level {
            self.by_level.entry(sec).or_default().extend(bits.iter().copied());
        }
        self.all.extend(other.all.iter().copied());
    }

    /// Copy with every bit rewritten by `f`
    pub fn map(&self, mut f: impl FnMut(BitId) -> BitId) -> InputBits<S> {
        let by_level: BTreeMap<S, IndexSet<BitId>> = self
            .by_level
            .iter()
            .map(|(&sec, bits)| (sec, bits.iter().map(|&b| f(b)).collect()))
            .collect();
        let all = by_level.values().flatten().copied().collect();
        InputBits { by_level, all }
    }

    pub fn get(&self, sec: S) -> impl Iterator<Item = BitId> + '_ {
        self.by_level.get(&sec).into_iter().flatten().copied()
    }

    pub fn all(&self) -> &IndexSet<BitId> {
        &self.all
    }

    pub fn contains(&self, bit: BitId) -> bool {
        self.all.contains(&bit)
    }

    /// Bits at levels the observer at `observer` may not read
    pub fn above(&self, observer: S) -> IndexSet<BitId> {
        self.by_level
            .iter()
            .filter(|(sec, _)| !sec.leq(observer))
            .flat_map(|(_, bits)| bits.iter().copied())
            .collect()
    }
}
