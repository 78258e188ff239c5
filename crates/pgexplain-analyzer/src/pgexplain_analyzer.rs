//! pgexplain Analyzer - PostgreSQL EXPLAIN plan analysis engine
//!
//! This crate provides functionality for:
//! - Parsing `EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON)` output
//! - Enriching the plan tree with loop/worker corrected timings, exclusive
//!   costs and durations, relocated CTEs and outlier flags
//! - Table, index, node type, JIT and trigger rollups
//! - A summary with findings and a performance score
//! - Comparing two analyzed plans
//!
//! The engine is synchronous, performs no I/O and keeps no global state.

pub mod compare;
pub mod enricher;
pub mod error;
pub mod explained;
pub mod parser;
pub mod plan;
pub mod props;
pub mod stats;
pub mod summary;

pub use compare::{Comparison, Delta, compare};
pub use enricher::{AnalysisSummary, EstimateDirection, analyze};
pub use error::{
    AnalysisError, ComparisonError, ExplainError, ParseError, Result, SerializationError, Side,
};
pub use explained::{Explained, explain};
pub use parser::{DocumentSections, parse_document_sections, parse_explain, parse_root};
pub use plan::{Node, NodeKind};
pub use stats::{Stats, StatsGather};
pub use summary::{SeverityLevel, Summary, SummaryNode};
