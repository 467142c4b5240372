//! # Leakbound Core
//!
//! Quantitative information flow analysis on the bit level. Every integer is
//! a vector of bits over the lattice `X ⊑ 0, 1 ⊑ U`; every operation records
//! which unknown bits a new bit was derived from. Once a program has been
//! walked, the number of secret input bits an observer can learn is bounded
//! by a minimum vertex cut between the secret input bits and the output bits
//! visible to that observer.
//!
//! ## Modules
//!
//! - **[`lattice`]** - bits, values, the bit arena and security lattices
//! - **[`ops`]** - constant-folding bit operators
//! - **[`mods`]** - path-local bit substitutions
//! - **[`state`]**, **[`symbols`]** - variable bindings and scopes
//! - **[`io_values`]**, **[`input_bits`]** - classification of inputs and outputs
//! - **[`leakage`]** - dependency graph, max flow and min cuts
//! - **[`context`]**, **[`interp`]**, **[`handler`]** - driving an analysis
//!
//! ## Quick Start
//!
//! ```rust
//! use leakbound_core::prelude::*;
//!
//! let program = Program::new(vec![
//!     Stmt::input("h", "h"),
//!     Stmt::output("l", "o", Expr::binary(BinOp::And, Expr::var("h"), Expr::lit(1))),
//! ]);
//! let mut ctx = analyze::<BasicSec>(&program, AnalysisConfig::default()).unwrap();
//! let leakage = ctx.compute_leakage(Algo::EdmondsKarp).unwrap();
//! assert_eq!(leakage[&BasicSec::Low].max_flow, 1);
//! assert_eq!(leakage[&BasicSec::High].max_flow, 0);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod input_bits;
pub mod interp;
pub mod io_values;
pub mod lattice;
pub mod leakage;
pub mod mods;
pub mod ops;
pub mod registry;
pub mod state;
pub mod symbols;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{AnalysisConfig, LatticeKind};
    pub use crate::context::{Context, Direction};
    pub use crate::error::{FlowError, FlowResult};
    pub use crate::handler::{parse_handler_config, CallEnv, HandlerRegistry, MethodInvocationHandler, MethodReturn};
    pub use crate::interp::{analyze, Expr, Function, Interpreter, Program, Stmt};
    pub use crate::lattice::{BasicSec, BitArena, BitId, DiamondSec, Origin, Sec, Value, B};
    pub use crate::leakage::{Algo, LeakageResult};
    pub use crate::mods::Mods;
    pub use crate::ops::{BinOp, UnOp};
}

pub use config::AnalysisConfig;
pub use context::Context;
pub use error::{FlowError, FlowResult};
pub use interp::{analyze, Program};
pub use leakage::{Algo, LeakageResult};
