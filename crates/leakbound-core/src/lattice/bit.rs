//! Four-point bit lattice and the bit arena
//!
//! ```text
//!        U          unknown
//!       / \
//!      0   1        constants
//!       \ /
//!        X          conflict / not evaluated
//! ```
//!
//! Bits are compared by identity. Every bit lives in a [`BitArena`] and is
//! addressed through a [`BitId`]; the arena doubles as the dependency graph
//! because each node stores the bits it was derived from.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Value of a single bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum B {
    /// Bottom: conflicting or not yet evaluated
    X,
    Zero,
    One,
    /// Top: could be either constant
    U,
}

impl B {
    pub const fn from_bool(value: bool) -> Self {
        if value {
            B::One
        } else {
            B::Zero
        }
    }

    /// Least upper bound
    pub const fn join(self, other: B) -> B {
        match (self, other) {
            (B::X, b) | (b, B::X) => b,
            (B::U, _) | (_, B::U) => B::U,
            (B::Zero, B::Zero) => B::Zero,
            (B::One, B::One) => B::One,
            _ => B::U,
        }
    }

    /// Greatest lower bound
    pub const fn meet(self, other: B) -> B {
        match (self, other) {
            (B::U, b) | (b, B::U) => b,
            (B::X, _) | (_, B::X) => B::X,
            (B::Zero, B::Zero) => B::Zero,
            (B::One, B::One) => B::One,
            _ => B::X,
        }
    }

    pub fn leq(self, other: B) -> bool {
        self.join(other) == other
    }

    pub const fn is_constant(self) -> bool {
        matches!(self, B::Zero | B::One)
    }

    pub const fn is_at_least_unknown(self) -> bool {
        matches!(self, B::U)
    }

    pub const fn as_bool(self) -> Option<bool> {
        match self {
            B::Zero => Some(false),
            B::One => Some(true),
            _ => None,
        }
    }

    /// Bitwise negation, identity on `U` and `X`
    pub const fn negate(self) -> B {
        match self {
            B::Zero => B::One,
            B::One => B::Zero,
            other => other,
        }
    }

    pub const fn symbol(self) -> char {
        match self {
            B::X => 'x',
            B::Zero => '0',
            B::One => '1',
            B::U => 'u',
        }
    }

    pub fn from_symbol(c: char) -> Option<B> {
        match c {
            'x' => Some(B::X),
            '0' => Some(B::Zero),
            '1' => Some(B::One),
            'u' => Some(B::U),
            _ => None,
        }
    }
}

impl fmt::Display for B {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Stable index of a bit inside its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitId(pub u32);

impl BitId {
    /// The shared conflict bit, used for bottom values
    pub const BOT: BitId = BitId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Primitive gate that produced a bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    And,
    Or,
    Xor,
    Not,
}

/// Comparison that produced a bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compare {
    Eq,
    Neq,
    Less,
}

/// How a bit came into existence
///
/// Operands are kept even when they are constants so that assumptions about
/// the bit can be pushed back into them (see [`crate::mods::Mods::assume`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Constant,
    Input,
    /// Wrapper bit created when a value reaches an output
    Output,
    Gate {
        gate: Gate,
        operands: SmallVec<[BitId; 2]>,
    },
    Compare {
        compare: Compare,
        lhs: Vec<BitId>,
        rhs: Vec<BitId>,
    },
    Phi,
    /// Result bit of a summarized method invocation
    Call,
    /// Fresh bit standing in for a callee parameter
    Param,
    Unknown,
}

/// A node of the dependency graph
#[derive(Debug, Clone)]
pub struct Bit {
    val: B,
    deps: Vec<BitId>,
    origin: Origin,
}

impl Bit {
    pub fn val(&self) -> B {
        self.val
    }

    /// Direct predecessors in the dependency graph
    pub fn deps(&self) -> &[BitId] {
        &self.deps
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

/// Append-only store of all bits created during an analysis
#[derive(Debug, Clone)]
pub struct BitArena {
    bits: Vec<Bit>,
    control: Vec<BitId>,
}

impl Default for BitArena {
    fn default() -> Self {
        Self::new()
    }
}

impl BitArena {
    pub fn new() -> Self {
        let bot = Bit {
            val: B::X,
            deps: Vec::new(),
            origin: Origin::Constant,
        };
        Self {
            bits: vec![bot],
            control: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.len() <= 1
    }

    pub fn get(&self, id: BitId) -> &Bit {
        &self.bits[id.index()]
    }

    pub fn val(&self, id: BitId) -> B {
        self.bits[id.index()].val
    }

    pub fn deps(&self, id: BitId) -> &[BitId] {
        &self.bits[id.index()].deps
    }

    pub fn origin(&self, id: BitId) -> &Origin {
        &self.bits[id.index()].origin
    }

    pub fn is_constant(&self, id: BitId) -> bool {
        self.val(id).is_constant()
    }

    pub fn is_unknown(&self, id: BitId) -> bool {
        self.val(id).is_at_least_unknown()
    }

    pub fn ids(&self) -> impl Iterator<Item = BitId> + '_ {
        (0..self.bits.len() as u32).map(BitId)
    }

    fn push(&mut self, val: B, deps: Vec<BitId>, origin: Origin) -> BitId {
        let id = BitId(self.bits.len() as u32);
        self.bits.push(Bit { val, deps, origin });
        id
    }

    /// Fresh constant bit
    pub fn constant(&mut self, value: bool) -> BitId {
        self.push(B::from_bool(value), Vec::new(), Origin::Constant)
    }

    /// Fresh unknown bit without predecessors (inputs, parameters)
    pub fn fresh(&mut self, origin: Origin) -> BitId {
        self.push(B::U, Vec::new(), origin)
    }

    /// Create a bit computed from `operands`.
    ///
    /// Constant results never carry dependencies. Unknown results depend on
    /// their unknown operands and on every condition bit on the control stack.
    pub fn derive(&mut self, val: B, origin: Origin, operands: &[BitId]) -> BitId {
        match val {
            B::X => BitId::BOT,
            B::Zero | B::One => self.push(val, Vec::new(), Origin::Constant),
            B::U => {
                let mut deps = Vec::with_capacity(operands.len() + self.control.len());
                for &op in operands.iter().chain(self.control.iter()) {
                    if self.is_unknown(op) && !deps.contains(&op) {
                        deps.push(op);
                    }
                }
                self.push(B::U, deps, origin)
            }
        }
    }

    /// Loop-head bit seeded with `init`, merged in place by [`Self::merge_phi`]
    pub fn loop_phi(&mut self, init: BitId) -> BitId {
        let val = self.val(init);
        let deps = if val.is_at_least_unknown() { vec![init] } else { Vec::new() };
        self.push(val, deps, Origin::Phi)
    }

    /// Join `other` into the loop-head bit `target`. Returns whether the
    /// value of `target` changed.
    pub fn merge_phi(&mut self, target: BitId, other: BitId, cond: Option<BitId>) -> bool {
        if target == other {
            return false;
        }
        let old = self.val(target);
        let new = old.join(self.val(other));
        let mut additions: SmallVec<[BitId; 2]> = SmallVec::new();
        if new.is_at_least_unknown() {
            if self.is_unknown(other) {
                additions.push(other);
            }
            if let Some(c) = cond.filter(|&c| self.is_unknown(c)) {
                additions.push(c);
            }
        }
        let bit = &mut self.bits[target.index()];
        bit.val = new;
        for dep in additions {
            if dep != target && !bit.deps.contains(&dep) {
                bit.deps.push(dep);
            }
        }
        old != new
    }

    /// Force a loop-head bit to unknown
    pub fn widen(&mut self, target: BitId) -> bool {
        let bit = &mut self.bits[target.index()];
        let changed = bit.val != B::U;
        bit.val = B::U;
        changed
    }

    pub fn push_control(&mut self, cond: BitId) {
        self.control.push(cond);
    }

    pub fn pop_control(&mut self) -> Option<BitId> {
        self.control.pop()
    }

    pub fn control(&self) -> &[BitId] {
        &self.control
    }

    /// All `(dependency, bit)` edges between unknown bits
    pub fn edges(&self) -> impl Iterator<Item = (BitId, BitId)> + '_ {
        self.ids()
            .filter(|&id| self.is_unknown(id))
            .flat_map(move |id| self.deps(id).iter().map(move |&dep| (dep, id)))
    }
}
