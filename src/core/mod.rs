//! Shared domain types and the library-wide error taxonomy.

pub mod types;

pub use types::*;

/// Errors surfaced by the delivery-risk engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    /// Input validation error (empty table, missing field, out-of-domain value).
    InvalidInput(String),
    /// A project's technology or country is absent from its correlation matrix.
    LookupFailure(String),
    /// Numerical issue (non-positive-definite sub-matrix, failed factorization).
    NumericalFailure(String),
    /// A ratio whose denominator is zero (no offered volume in an active year).
    DegenerateDivision(String),
}

impl std::fmt::Display for RiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::LookupFailure(msg) => write!(f, "lookup failure: {msg}"),
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {msg}"),
            Self::DegenerateDivision(msg) => write!(f, "degenerate division: {msg}"),
        }
    }
}

impl std::error::Error for RiskError {}
