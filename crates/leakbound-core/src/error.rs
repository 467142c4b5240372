//! Error types for the leakage analysis core

use thiserror::Error;

/// Result type used throughout the analysis core
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors raised while building state or computing leakage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A value was classified under a second, different security level
    #[error("value {value} is classified as {existing}, cannot reclassify it as {requested}")]
    MultipleSecurityLevels {
        value: String,
        existing: String,
        requested: String,
    },

    /// Output state read or written before `add` declared the name
    #[error("output variable `{0}` accessed before it was declared")]
    UndeclaredOutputAccess(String),

    /// Symbol inserted twice into the same lexical scope
    #[error("`{0}` is already defined in this scope")]
    DuplicateScopeDefinition(String),

    /// `Mods::replace` called for a key without a recorded substitution
    #[error("no substitution recorded for {0}")]
    UnresolvedSubstitution(String),

    /// The selected min-cut algorithm lacks a requested capability
    #[error("algorithm {algo} does not support {feature}")]
    UnsupportedAlgorithmFeature { algo: String, feature: &'static str },

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("unknown security level `{0}`")]
    UnknownSecurityLevel(String),

    #[error("unknown leakage algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("unknown security lattice `{0}`")]
    UnknownLattice(String),

    /// Input template that is not of the form `0b[01u]+`
    #[error("invalid bit pattern `{0}`")]
    InvalidBitPattern(String),

    #[error("unknown method invocation handler `{0}`")]
    UnknownHandler(String),

    #[error("invalid handler configuration `{config}`: {reason}")]
    InvalidHandlerConfig { config: String, reason: String },
}

impl FlowError {
    pub(crate) fn invalid_handler(config: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidHandlerConfig {
            config: config.to_string(),
            reason: reason.into(),
        }
    }
}
