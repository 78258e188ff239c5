//! Error types for the plan analysis engine

use thiserror::Error;

/// Errors raised while decoding a raw EXPLAIN document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing Plan object in EXPLAIN output")]
    MissingPlan,

    #[error("Invalid plan structure: {0}")]
    InvalidStructure(String),

    #[error("Plan is nested deeper than {limit} operators")]
    TooDeep { limit: usize },
}

/// Errors raised while enriching a parsed plan tree
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("Node '{node_type}' has field '{field}' that is not a {expected}")]
    InvalidField {
        node_type: String,
        field: String,
        expected: &'static str,
    },

    #[error("Plan is nested deeper than {limit} operators")]
    TooDeep { limit: usize },
}

/// Which side of a comparison an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// Errors raised when two analysis results cannot be compared
#[derive(Debug, Error, PartialEq)]
pub enum ComparisonError {
    #[error("The {side} plan has no nodes")]
    EmptyPlan { side: Side },

    #[error("The {side} plan has no stats, it was probably never analyzed")]
    MissingStats { side: Side },
}

/// Marshal/unmarshal failure of an analysis envelope
#[derive(Debug, Error)]
#[error("Serialization error: {0}")]
pub struct SerializationError(#[from] pub serde_json::Error);

/// Any failure of the explain/compare pipeline
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl ExplainError {
    /// Short, stable label of the failing stage
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse_error",
            Self::Analysis(_) => "analysis_error",
            Self::Comparison(_) => "comparison_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ExplainError>;
