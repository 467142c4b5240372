//! Bit vectors over the bit lattice

use super::bit::{BitArena, BitId, Origin, B};
use crate::error::{FlowError, FlowResult};
use std::iter::FromIterator;

/// Ordered bits of an integer, least significant bit first.
///
/// Reads past the end sign-extend with the last bit. An append-only value
/// models the history of an output channel: it starts empty and only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Value {
    bits: Vec<BitId>,
    append_only: bool,
}

impl Value {
    pub fn new(bits: Vec<BitId>) -> Self {
        Self {
            bits,
            append_only: false,
        }
    }

    /// Bottom value: `width` conflict bits
    pub fn bot(width: usize) -> Self {
        Self::new(vec![BitId::BOT; width.max(1)])
    }

    /// Empty append-only value
    pub fn append_only() -> Self {
        Self {
            bits: Vec::new(),
            append_only: true,
        }
    }

    /// Shortest two's complement encoding of `n`, truncated to `width`
    pub fn constant(arena: &mut BitArena, n: i64, width: usize) -> Self {
        let mut bits = Vec::new();
        let mut rest = n;
        loop {
            let bit = rest & 1;
            bits.push(arena.constant(bit == 1));
            rest >>= 1;
            let done = (rest == 0 && bit == 0) || (rest == -1 && bit == 1);
            if done || bits.len() >= width.max(1) {
                break;
            }
        }
        Self::new(bits)
    }

    /// Parse a template such as `0b0u1`, most significant bit first. Each
    /// `u` becomes a fresh unknown bit with the given origin.
    pub fn from_pattern(arena: &mut BitArena, pattern: &str, origin: Origin) -> FlowResult<Self> {
        let digits = pattern
            .strip_prefix("0b")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| FlowError::InvalidBitPattern(pattern.to_string()))?;
        let mut bits = Vec::with_capacity(digits.len());
        for c in digits.chars().rev() {
            let bit = match B::from_symbol(c) {
                Some(B::Zero) => arena.constant(false),
                Some(B::One) => arena.constant(true),
                Some(B::U) => arena.fresh(origin.clone()),
                _ => return Err(FlowError::InvalidBitPattern(pattern.to_string())),
            };
            bits.push(bit);
        }
        Ok(Self::new(bits))
    }

    /// `width` fresh unknown bits
    pub fn unknown(arena: &mut BitArena, width: usize, origin: Origin) -> Self {
        (0..width.max(1)).map(|_| arena.fresh(origin.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_append_only(&self) -> bool {
        self.append_only
    }

    pub fn bits(&self) -> &[BitId] {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = BitId> + '_ {
        self.bits.iter().copied()
    }

    /// Bit at `index`, sign-extended past the end
    pub fn get(&self, index: usize) -> BitId {
        match self.bits.get(index) {
            Some(&bit) => bit,
            None => self.bits.last().copied().unwrap_or(BitId::BOT),
        }
    }

    pub fn sign_bit(&self) -> BitId {
        self.get(self.len().saturating_sub(1))
    }

    pub fn into_append_only(mut self) -> Self {
        self.append_only = true;
        self
    }

    /// Extend the history with the bits of `other`
    pub fn append(&mut self, other: &Value) {
        self.bits.extend(other.iter());
    }

    /// Rewrite every bit, keeping the append-only flag
    pub fn map_bits(&self, mut f: impl FnMut(BitId) -> BitId) -> Self {
        Self {
            bits: self.bits.iter().map(|&b| f(b)).collect(),
            append_only: self.append_only,
        }
    }

    pub fn is_constant(&self, arena: &BitArena) -> bool {
        !self.bits.is_empty() && self.iter().all(|b| arena.is_constant(b))
    }

    /// Integer value if every bit is a constant
    pub fn as_constant(&self, arena: &BitArena) -> Option<i64> {
        if !self.is_constant(arena) {
            return None;
        }
        let mut n: i64 = 0;
        for i in 0..64 {
            if arena.val(self.get(i)) == B::One {
                n |= 1 << i;
            }
        }
        Some(n)
    }

    pub fn unknown_bits<'a>(&'a self, arena: &'a BitArena) -> impl Iterator<Item = BitId> + 'a {
        self.iter().filter(move |&b| arena.is_unknown(b))
    }

    /// Most significant bit first, e.g. `0b0u`; append-only values are
    /// bracketed
    pub fn repr(&self, arena: &BitArena) -> String {
        let digits: String = self.bits.iter().rev().map(|&b| arena.val(b).symbol()).collect();
        match (self.append_only, digits.is_empty()) {
            (true, true) => "[]".to_string(),
            (true, false) => format!("[0b{digits}]"),
            (false, _) => format!("0b{digits}"),
        }
    }
}

impl FromIterator<BitId> for Value {
    fn from_iter<I: IntoIterator<Item = BitId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<BitId> for Value {
    fn from(bit: BitId) -> Self {
        Self::new(vec![bit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_encoding() {
        let mut arena = BitArena::new();
        assert_eq!(Value::constant(&mut arena, 0, 32).repr(&arena), "0b0");
        assert_eq!(Value::constant(&mut arena, 1, 32).repr(&arena), "0b01");
        assert_eq!(Value::constant(&mut arena, -1, 32).repr(&arena), "0b1");
        assert_eq!(Value::constant(&mut arena, 2, 32).repr(&arena), "0b010");
        let v = Value::constant(&mut arena, -10, 32);
        assert_eq!(v.as_constant(&arena), Some(-10));
    }

    #[test]
    fn test_pattern_parsing() {
        let mut arena = BitArena::new();
        let v = Value::from_pattern(&mut arena, "0b0u", Origin::Input).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(arena.val(v.get(0)), B::U);
        assert_eq!(arena.val(v.get(1)), B::Zero);
        assert_eq!(v.repr(&arena), "0b0u");
        assert!(Value::from_pattern(&mut arena, "0b2", Origin::Input).is_err());
        assert!(Value::from_pattern(&mut arena, "12", Origin::Input).is_err());
    }

    #[test]
    fn test_sign_extension() {
        let mut arena = BitArena::new();
        let v = Value::constant(&mut arena, -2, 32);
        assert_eq!(v.get(40), v.sign_bit());
        assert_eq!(Value::default().get(3), BitId::BOT);
    }

    #[test]
    fn test_append_only_history() {
        let mut arena = BitArena::new();
        let mut out = Value::append_only();
        assert!(out.is_empty());
        assert_eq!(out.repr(&arena), "[]");
        let one = Value::constant(&mut arena, 1, 32);
        out.append(&one);
        assert_eq!(out.len(), 2);
        assert_eq!(out.repr(&arena), "[0b01]");
        assert!(out.is_append_only());
    }

    #[test]
    fn test_collector() {
        let mut arena = BitArena::new();
        let a = arena.fresh(Origin::Input);
        let b = arena.constant(true);
        let v: Value = vec![a, b].into_iter().collect();
        assert_eq!(v.bits(), &[a, b]);
        assert!(!v.is_append_only());
    }
}
