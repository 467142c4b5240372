//! Security lattices
//!
//! Only the partial order and its join/meet are relied upon; levels are not
//! assumed to be totally ordered. `Ord` is required solely so that per-level
//! results can be kept in deterministic maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A point in a security lattice
pub trait Sec: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + 'static {
    fn top() -> Self;
    fn bot() -> Self;
    fn leq(self, other: Self) -> bool;
    fn join(self, other: Self) -> Self;
    fn meet(self, other: Self) -> Self;
    /// All levels, bottom first
    fn elements() -> &'static [Self];
    fn parse(name: &str) -> Option<Self>;
}

/// Two-point lattice `l ⊑ h`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BasicSec {
    Low,
    High,
}

impl Sec for BasicSec {
    fn top() -> Self {
        BasicSec::High
    }

    fn bot() -> Self {
        BasicSec::Low
    }

    fn leq(self, other: Self) -> bool {
        self == BasicSec::Low || other == BasicSec::High
    }

    fn join(self, other: Self) -> Self {
        if self == BasicSec::High || other == BasicSec::High {
            BasicSec::High
        } else {
            BasicSec::Low
        }
    }

    fn meet(self, other: Self) -> Self {
        if self == BasicSec::Low || other == BasicSec::Low {
            BasicSec::Low
        } else {
            BasicSec::High
        }
    }

    fn elements() -> &'static [Self] {
        &[BasicSec::Low, BasicSec::High]
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "l" | "low" => Some(BasicSec::Low),
            "h" | "high" => Some(BasicSec::High),
            _ => None,
        }
    }
}

impl fmt::Display for BasicSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicSec::Low => write!(f, "l"),
            BasicSec::High => write!(f, "h"),
        }
    }
}

/// Diamond lattice `l ⊑ m, n ⊑ h` with `m` and `n` incomparable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiamondSec {
    Low,
    Mid1,
    Mid2,
    High,
}

impl Sec for DiamondSec {
    fn top() -> Self {
        DiamondSec::High
    }

    fn bot() -> Self {
        DiamondSec::Low
    }

    fn leq(self, other: Self) -> bool {
        self == other || self == DiamondSec::Low || other == DiamondSec::High
    }

    fn join(self, other: Self) -> Self {
        if self.leq(other) {
            other
        } else if other.leq(self) {
            self
        } else {
            DiamondSec::High
        }
    }

    fn meet(self, other: Self) -> Self {
        if self.leq(other) {
            self
        } else if other.leq(self) {
            other
        } else {
            DiamondSec::Low
        }
    }

    fn elements() -> &'static [Self] {
        &[DiamondSec::Low, DiamondSec::Mid1, DiamondSec::Mid2, DiamondSec::High]
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "l" | "low" => Some(DiamondSec::Low),
            "m" | "mid1" => Some(DiamondSec::Mid1),
            "n" | "mid2" => Some(DiamondSec::Mid2),
            "h" | "high" => Some(DiamondSec::High),
            _ => None,
        }
    }
}

impl fmt::Display for DiamondSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiamondSec::Low => "l",
            DiamondSec::Mid1 => "m",
            DiamondSec::Mid2 => "n",
            DiamondSec::High => "h",
        };
        write!(f, "{name}")
    }
}
