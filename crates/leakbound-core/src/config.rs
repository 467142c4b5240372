//! Analysis configuration

use crate::error::FlowError;
use crate::handler::DEFAULT_HANDLER;
use crate::leakage::{Algo, LeakageOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Security lattice an analysis runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatticeKind {
    /// `l ⊑ h`
    #[default]
    Basic,
    /// `l ⊑ m, n ⊑ h`
    Diamond,
}

impl fmt::Display for LatticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatticeKind::Basic => write!(f, "basic"),
            LatticeKind::Diamond => write!(f, "diamond"),
        }
    }
}

impl FromStr for LatticeKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(LatticeKind::Basic),
            "diamond" => Ok(LatticeKind::Diamond),
            _ => Err(FlowError::UnknownLattice(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of integer values in bits
    pub bit_width: usize,
    pub algo: Algo,
    pub record_alternatives: bool,
    pub max_alternatives: usize,
    /// Iterations before loop heads are widened to unknown
    pub max_loop_iterations: usize,
    /// Method invocation handler, e.g. `handler=call_string;maxrec=2;bot=basic`
    pub handler: String,
    pub lattice: LatticeKind,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bit_width: 32,
            algo: Algo::default(),
            record_alternatives: false,
            max_alternatives: 64,
            max_loop_iterations: 16,
            handler: DEFAULT_HANDLER.to_string(),
            lattice: LatticeKind::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_bit_width(mut self, bit_width: usize) -> Self {
        self.bit_width = bit_width;
        self
    }

    pub fn with_algo(mut self, algo: Algo) -> Self {
        self.algo = algo;
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = handler.into();
        self
    }

    pub fn recording_alternatives(mut self) -> Self {
        self.record_alternatives = true;
        self
    }

    pub fn leakage_options(&self) -> LeakageOptions {
        LeakageOptions {
            record_alternatives: self.record_alternatives,
            max_alternatives: self.max_alternatives,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.bit_width, 32);
        assert_eq!(config.algo, Algo::EdmondsKarp);
        assert!(!config.record_alternatives);
        assert_eq!(config.handler, "handler=call_string;maxrec=2;bot=basic");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnalysisConfig::from_json(r#"{"bit_width": 8, "algo": "dinic", "lattice": "diamond"}"#).unwrap();
        assert_eq!(config.bit_width, 8);
        assert_eq!(config.algo, Algo::Dinic);
        assert_eq!(config.lattice, LatticeKind::Diamond);
        assert_eq!(config.max_loop_iterations, 16);
    }

    #[test]
    fn test_lattice_kind_parsing() {
        assert_eq!("diamond".parse::<LatticeKind>(), Ok(LatticeKind::Diamond));
        assert_eq!(
            "total".parse::<LatticeKind>(),
            Err(FlowError::UnknownLattice("total".to_string()))
        );
    }
}
