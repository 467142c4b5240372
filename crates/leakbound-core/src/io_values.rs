//! Classification of values and bits by security level

use crate::error::{FlowError, FlowResult};
use crate::lattice::{BitArena, BitId, Sec, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;

/// Registry of classified values
///
/// Each value belongs to exactly one level. Only bits that are still
/// unknown when their value is classified are tracked individually.
#[derive(Debug, Clone)]
pub struct IoValues<S: Sec> {
    by_level: BTreeMap<S, IndexSet<Value>>,
    value_levels: IndexMap<Value, S>,
    bit_levels: IndexMap<BitId, S>,
    bits: IndexSet<BitId>,
    variables: IndexMap<String, S>,
}

impl<S: Sec> Default for IoValues<S> {
    fn default() -> Self {
        Self {
            by_level: BTreeMap::new(),
            value_levels: IndexMap::new(),
            bit_levels: IndexMap::new(),
            bits: IndexSet::new(),
            variables: IndexMap::new(),
        }
    }
}

impl<S: Sec> IoValues<S> {
    /// Classify `value` at `sec`. Classifying it again at the same level is a
    /// no-op, at a different level an error.
    pub fn add(&mut self, arena: &BitArena, sec: S, value: Value) -> FlowResult<()> {
        if let Some(&existing) = self.value_levels.get(&value) {
            if existing == sec {
                return Ok(());
            }
            return Err(FlowError::MultipleSecurityLevels {
                value: value.repr(arena),
                existing: existing.to_string(),
                requested: sec.to_string(),
            });
        }
        for bit in value.unknown_bits(arena) {
            if let Some(&existing) = self.bit_levels.get(&bit) {
                if existing != sec {
                    return Err(FlowError::MultipleSecurityLevels {
                        value: bit.to_string(),
                        existing: existing.to_string(),
                        requested: sec.to_string(),
                    });
                }
            }
        }
        for bit in value.unknown_bits(arena) {
            self.bit_levels.insert(bit, sec);
            self.bits.insert(bit);
        }
        self.by_level.entry(sec).or_default().insert(value.clone());
        self.value_levels.insert(value, sec);
        Ok(())
    }

    pub fn add_bit(&mut self, arena: &BitArena, sec: S, bit: BitId) -> FlowResult<()> {
        self.add(arena, sec, Value::from(bit))
    }

    /// Remember that variable `name` was declared at `sec`
    pub fn add_variable(&mut self, name: &str, sec: S) {
        self.variables.insert(name.to_string(), sec);
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn variable_level(&self, name: &str) -> Option<S> {
        self.variables.get(name).copied()
    }

    pub fn level_of(&self, value: &Value) -> Option<S> {
        self.value_levels.get(value).copied()
    }

    pub fn bit_level(&self, bit: BitId) -> Option<S> {
        self.bit_levels.get(&bit).copied()
    }

    pub fn values_at(&self, sec: S) -> impl Iterator<Item = &Value> {
        self.by_level.get(&sec).into_iter().flatten()
    }

    /// Every classified unknown bit with its level, in insertion order
    pub fn get_bits(&self) -> Vec<(S, BitId)> {
        self.bit_levels.iter().map(|(&bit, &sec)| (sec, bit)).collect()
    }

    pub fn get_bits_at(&self, sec: S) -> impl Iterator<Item = BitId> + '_ {
        self.bit_levels
            .iter()
            .filter(move |(_, s)| **s == sec)
            .map(|(&bit, _)| bit)
    }

    /// Flat set of all unknown bits ever classified
    pub fn bits(&self) -> &IndexSet<BitId> {
        &self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.value_levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{BasicSec, Origin};

    #[test]
    fn test_reclassification_is_rejected() {
        let mut arena = BitArena::new();
        let mut io: IoValues<BasicSec> = IoValues::default();
        let v = Value::unknown(&mut arena, 2, Origin::Input);
        io.add(&arena, BasicSec::High, v.clone()).unwrap();
        io.add(&arena, BasicSec::High, v.clone()).unwrap();
        let err = io.add(&arena, BasicSec::Low, v.clone()).unwrap_err();
        assert!(matches!(err, FlowError::MultipleSecurityLevels { .. }));
        assert_eq!(io.level_of(&v), Some(BasicSec::High));
    }

    #[test]
    fn test_only_unknown_bits_are_tracked() {
        let mut arena = BitArena::new();
        let mut io: IoValues<BasicSec> = IoValues::default();
        let v = Value::from_pattern(&mut arena, "0b1u0u", Origin::Input).unwrap();
        io.add(&arena, BasicSec::Low, v.clone()).unwrap();
        assert_eq!(io.bits().len(), 2);
        let pairs = io.get_bits();
        assert_eq!(pairs, vec![(BasicSec::Low, v.get(0)), (BasicSec::Low, v.get(2))]);
        assert_eq!(io.get_bits_at(BasicSec::High).count(), 0);
    }

    #[test]
    fn test_variable_bookkeeping() {
        let mut io: IoValues<BasicSec> = IoValues::default();
        io.add_variable("h", BasicSec::High);
        assert!(io.has("h"));
        assert!(!io.has("l"));
        assert_eq!(io.variable_names().collect::<Vec<_>>(), vec!["h"]);
        assert_eq!(io.variable_level("h"), Some(BasicSec::High));
    }
}
