//! The `Explained` envelope and the end-to-end explain pipeline

use crate::enricher;
use crate::error::{Result, SerializationError};
use crate::parser::parse_explain;
use crate::stats::{
    IndexStats, JitStats, NodeTypeStats, Stats, StatsGather, TableStats, TriggerStats,
};
use crate::summary::{self, Summary};
use serde::{Deserialize, Serialize};

/// Everything derived from one EXPLAIN document
///
/// Immutable once built; persisted and transmitted as an opaque JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Explained {
    pub summary: Summary,
    pub stats: Stats,
    pub indexes_stats: Vec<IndexStats>,
    pub tables_stats: Vec<TableStats>,
    pub nodes_stats: Vec<NodeTypeStats>,
    pub jit_stats: Option<JitStats>,
    pub triggers_stats: Vec<TriggerStats>,
}

impl Explained {
    pub fn to_json(&self) -> std::result::Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, SerializationError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Parses, enriches and summarizes a raw EXPLAIN document
///
/// # Examples
///
/// ```
/// let raw = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users",
///     "Total Cost": 10.0, "Plan Rows": 100, "Actual Rows": 100,
///     "Actual Loops": 1, "Actual Total Time": 1.5},
///     "Execution Time": 2.0}]"#;
///
/// let explained = pgexplain_analyzer::explain(raw).unwrap();
/// assert_eq!(explained.stats.nodes_count, 1);
/// assert_eq!(explained.tables_stats[0].name, "users");
/// ```
pub fn explain(raw: &str) -> Result<Explained> {
    let (mut root, sections) = parse_explain(raw)?;
    enricher::analyze(&mut root)?;

    let gather = StatsGather::new(sections);
    let stats = gather.compute_stats(&root);
    let explained = Explained {
        summary: summary::build(&root, &stats),
        indexes_stats: gather.compute_indexes_stats(&root),
        tables_stats: gather.compute_tables_stats(&root),
        nodes_stats: gather.compute_nodes_stats(&root),
        jit_stats: gather.compute_jit_stats(),
        triggers_stats: gather.compute_triggers_stats(),
        stats,
    };

    tracing::debug!(
        nodes = explained.stats.nodes_count,
        tables = explained.tables_stats.len(),
        indexes = explained.indexes_stats.len(),
        findings = explained.summary.findings.len(),
        "Plan explained"
    );

    Ok(explained)
}

#[cfg(test)]
mod tests;
