//! Substitution algebra for control-flow merges
//!
//! A [`Mods`] records what changed along one path relative to a baseline:
//! bit `b` now reads as bit `b'`, interval `i` as interval `i'`. Branch arms
//! use it to assume the outcome of their condition without touching the
//! canonical state, and method handlers use it to describe their effect.
//!
//! Merge policies:
//!
//! | operation      | key collision             |
//! |----------------|---------------------------|
//! | `union`        | later operand wins        |
//! | `overwrite`    | later operand wins        |
//! | `add_mods`     | later wins, identity drops the key |
//! | `merge`        | earlier operand wins      |
//! | `intersection` | only shared keys survive  |

use crate::error::{FlowError, FlowResult};
use crate::lattice::{BitArena, BitId, Compare, Gate, Origin, B};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FromIterator;

/// Opaque handle of an interval in the auxiliary range domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntervalId(pub u32);

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mods {
    bits: IndexMap<BitId, BitId>,
    intervals: IndexMap<IntervalId, IntervalId>,
}

impl Mods {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty() && self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bits.len() + self.intervals.len()
    }

    /// Record `orig ↦ repl`; resolved constants are never substituted
    pub fn add(&mut self, arena: &BitArena, orig: BitId, repl: BitId) -> &mut Self {
        if !arena.is_constant(orig) {
            self.bits.insert(orig, repl);
        }
        self
    }

    pub fn add_interval(&mut self, orig: IntervalId, repl: IntervalId) -> &mut Self {
        self.intervals.insert(orig, repl);
        self
    }

    /// Reconciling merge: an incoming `k ↦ k` restores the baseline and
    /// removes the key, anything else overwrites.
    ///
    /// Only the incoming pair decides. A merge that instead compares the
    /// incoming value with the one already stored would keep `k ↦ k` as an
    /// explicit entry when `k` was unmapped; here `k` simply stays unmapped,
    /// which `try_replace` treats the same way.
    pub fn add_mods(&mut self, other: &Mods) -> &mut Self {
        for (&k, &v) in &other.bits {
            if k == v {
                self.bits.shift_remove(&k);
            } else {
                self.bits.insert(k, v);
            }
        }
        for (&k, &v) in &other.intervals {
            if k == v {
                self.intervals.shift_remove(&k);
            } else {
                self.intervals.insert(k, v);
            }
        }
        self
    }

    /// Apply both sets of changes, preferring `other`
    pub fn union(&mut self, other: &Mods) -> &mut Self {
        self.bits.extend(other.bits.iter().map(|(&k, &v)| (k, v)));
        self.intervals.extend(other.intervals.iter().map(|(&k, &v)| (k, v)));
        self
    }

    /// Unconditional overwrite, for a path known to dominate
    pub fn overwrite(mut self, other: &Mods) -> Self {
        self.union(other);
        self
    }

    /// Add only the keys this map does not define yet
    pub fn merge(&mut self, other: &Mods) -> &mut Self {
        for (&k, &v) in &other.bits {
            self.bits.entry(k).or_insert(v);
        }
        for (&k, &v) in &other.intervals {
            self.intervals.entry(k).or_insert(v);
        }
        self
    }

    /// Keys defined by both maps, valued from `other`
    pub fn intersection(&self, other: &Mods) -> Mods {
        Mods {
            bits: self
                .bits
                .keys()
                .filter_map(|k| other.bits.get(k).map(|&v| (*k, v)))
                .collect(),
            intervals: self
                .intervals
                .keys()
                .filter_map(|k| other.intervals.get(k).map(|&v| (*k, v)))
                .collect(),
        }
    }

    /// Keep the bit substitutions accepted by `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(BitId, BitId) -> bool) {
        self.bits.retain(|&k, &mut v| keep(k, v));
    }

    pub fn defined_for(&self, bit: BitId) -> bool {
        self.bits.contains_key(&bit)
    }

    pub fn defined_for_interval(&self, interval: IntervalId) -> bool {
        self.intervals.contains_key(&interval)
    }

    pub fn replace(&self, bit: BitId) -> FlowResult<BitId> {
        self.try_replace(bit)
            .ok_or_else(|| FlowError::UnresolvedSubstitution(bit.to_string()))
    }

    pub fn try_replace(&self, bit: BitId) -> Option<BitId> {
        self.bits.get(&bit).copied()
    }

    pub fn replace_interval(&self, interval: IntervalId) -> FlowResult<IntervalId> {
        self.intervals
            .get(&interval)
            .copied()
            .ok_or_else(|| FlowError::UnresolvedSubstitution(interval.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (BitId, BitId)> + '_ {
        self.bits.iter().map(|(&k, &v)| (k, v))
    }

    /// Substitutions implied by assuming that `bit` evaluates to `value`.
    ///
    /// Besides `bit ↦ value` itself, the assumption is pushed back through
    /// the gate that produced the bit whenever the operands are determined:
    /// a true conjunction fixes both operands, a false disjunction likewise,
    /// a negation flips, an equality that holds unifies its operands.
    pub fn assume(arena: &mut BitArena, bit: BitId, value: bool) -> Mods {
        let mut mods = Mods::empty();
        let mut seen = IndexSet::new();
        let mut work = vec![(bit, value)];
        while let Some((bit, value)) = work.pop() {
            if !arena.is_unknown(bit) || !seen.insert(bit) {
                continue;
            }
            let constant = arena.constant(value);
            mods.add(arena, bit, constant);
            match arena.origin(bit).clone() {
                Origin::Gate { gate, operands } => {
                    work.extend(implied_by_gate(arena, gate, &operands, value));
                }
                Origin::Compare { compare, lhs, rhs } => {
                    let holds = match compare {
                        Compare::Eq => value,
                        Compare::Neq => !value,
                        Compare::Less => continue,
                    };
                    if !holds {
                        continue;
                    }
                    for (&x, &y) in lhs.iter().zip(rhs.iter()) {
                        match (arena.val(x).as_bool(), arena.val(y).as_bool()) {
                            (None, Some(c)) => work.push((x, c)),
                            (Some(c), None) => work.push((y, c)),
                            (None, None) if x != y && arena.is_unknown(x) && arena.is_unknown(y) => {
                                mods.add(arena, y, x);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        mods
    }
}

fn implied_by_gate(arena: &BitArena, gate: Gate, operands: &[BitId], value: bool) -> Vec<(BitId, bool)> {
    let vals: Vec<B> = operands.iter().map(|&o| arena.val(o)).collect();
    match (gate, value) {
        (Gate::Not, v) => operands.iter().map(|&o| (o, !v)).collect(),
        (Gate::And, true) => operands.iter().map(|&o| (o, true)).collect(),
        (Gate::Or, false) => operands.iter().map(|&o| (o, false)).collect(),
        // the other operand is decided once one side is a neutral constant
        (Gate::And, false) => other_if(operands, &vals, B::One, false),
        (Gate::Or, true) => other_if(operands, &vals, B::Zero, true),
        (Gate::Xor, v) => match (vals.first().and_then(|b| b.as_bool()), vals.get(1).and_then(|b| b.as_bool())) {
            (Some(c), None) => vec![(operands[1], v ^ c)],
            (None, Some(c)) => vec![(operands[0], v ^ c)],
            _ => Vec::new(),
        },
    }
}

fn other_if(operands: &[BitId], vals: &[B], neutral: B, value: bool) -> Vec<(BitId, bool)> {
    match (operands, vals) {
        ([_, b], [va, _]) if *va == neutral => vec![(*b, value)],
        ([a, _], [_, vb]) if *vb == neutral => vec![(*a, value)],
        _ => Vec::new(),
    }
}

/// Cumulative union, modelling sequential composition
impl FromIterator<Mods> for Mods {
    fn from_iter<I: IntoIterator<Item = Mods>>(iter: I) -> Self {
        iter.into_iter().fold(Mods::empty(), |mut acc, m| {
            acc.union(&m);
            acc
        })
    }
}

impl fmt::Display for Mods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .bits
            .iter()
            .map(|(k, v)| format!("{k} ↦ {v}"))
            .chain(self.intervals.iter().map(|(k, v)| format!("{k} ↦ {v}")))
            .collect();
        write!(f, "({})", entries.join(", "))
    }
}
