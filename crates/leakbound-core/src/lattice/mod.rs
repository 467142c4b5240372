//! Bit, value and security lattices

mod bit;
mod sec;
mod value;

pub use bit::{Bit, BitArena, BitId, Compare, Gate, Origin, B};
pub use sec::{BasicSec, DiamondSec, Sec};
pub use value::Value;
