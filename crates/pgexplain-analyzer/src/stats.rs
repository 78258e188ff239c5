//! Stats Gather - Rollups over an enriched plan
//!
//! Every `compute_*` function is read-only over the enriched tree and the
//! parsed document sections. Collections are ordered by descending
//! exclusive time, then descending exclusive cost; ties keep the order in
//! which entries were first seen while walking the tree.

use crate::error::ParseError;
use crate::parser::{DocumentSections, parse_document_sections};
use crate::plan::{Node, NodeKind};
use crate::props;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Statement-wide execution figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub execution_time: f64,
    pub planning_time: f64,
    /// Sum of all trigger times
    pub trigger_time: f64,
    /// Total JIT compilation time
    pub jit_time: f64,
    /// Largest loop-corrected row count found by the enricher
    pub max_rows: f64,
    /// Largest exclusive cost found by the enricher
    pub max_cost: f64,
    /// Largest exclusive duration found by the enricher
    pub max_duration: f64,
    pub nodes_count: usize,
    pub ctes_count: usize,
    pub shared_hit_blocks: f64,
    pub shared_read_blocks: f64,
    pub temp_read_blocks: f64,
    pub temp_written_blocks: f64,
}

/// Usage of one index across the plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStats {
    pub name: String,
    /// Schema-qualified relation the index belongs to, when known
    pub relation: Option<String>,
    pub node_types: Vec<String>,
    pub scans: usize,
    pub exclusive_time: f64,
    pub exclusive_cost: f64,
    pub time_percent: f64,
    pub actual_rows: f64,
    pub rows_removed_by_filter: f64,
    pub rows_removed_by_index_recheck: f64,
    /// Distinct index conditions, in first-seen order
    pub conditions: Vec<String>,
}

/// I/O and row rollup of one relation across all nodes reading it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableStats {
    pub name: String,
    pub node_types: Vec<String>,
    pub scans: usize,
    pub seq_scans: usize,
    pub index_scans: usize,
    pub exclusive_time: f64,
    pub exclusive_cost: f64,
    pub time_percent: f64,
    pub actual_rows: f64,
    pub rows_removed_by_filter: f64,
    pub shared_hit_blocks: f64,
    pub shared_read_blocks: f64,
    pub shared_dirtied_blocks: f64,
    pub shared_written_blocks: f64,
    pub temp_read_blocks: f64,
    pub temp_written_blocks: f64,
}

/// Rollup of every node sharing a node type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTypeStats {
    pub node_type: String,
    pub count: usize,
    pub exclusive_time: f64,
    pub exclusive_cost: f64,
    pub time_percent: f64,
    pub actual_rows: f64,
}

/// JIT compilation figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitStats {
    pub functions: u64,
    pub inlining: bool,
    pub optimization: bool,
    pub expressions: bool,
    pub deforming: bool,
    pub generation_time: f64,
    pub inlining_time: f64,
    pub optimization_time: f64,
    pub emission_time: f64,
    pub total_time: f64,
    pub time_percent: f64,
}

/// Timing of one trigger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerStats {
    pub name: String,
    pub relation: Option<String>,
    pub constraint_name: Option<String>,
    pub calls: f64,
    pub time: f64,
    pub average_time: f64,
    pub time_percent: f64,
}

/// Computes rollups from an enriched tree and its document sections
#[derive(Debug, Clone, Default)]
pub struct StatsGather {
    sections: DocumentSections,
}

impl StatsGather {
    pub fn new(sections: DocumentSections) -> Self {
        Self { sections }
    }

    /// Extracts the document sections of a raw EXPLAIN document
    pub fn from_plan(raw: &str) -> Result<Self, ParseError> {
        parse_document_sections(raw).map(Self::new)
    }

    pub fn sections(&self) -> &DocumentSections {
        &self.sections
    }

    fn execution_time(&self) -> f64 {
        self.sections.execution_time()
    }

    /// Statement-wide figures, including the maxima attached by the enricher
    pub fn compute_stats(&self, root: &Node) -> Stats {
        let mut stats = Stats {
            execution_time: self.execution_time(),
            planning_time: self.sections.planning_time(),
            trigger_time: finite(self.sections.triggers.iter().map(|t| t.time).sum()),
            jit_time: self.sections.jit.as_ref().map_or(0.0, |jit| jit.timing.total),
            max_rows: root.number_or_zero(props::MAXIMUM_ROWS),
            max_cost: root.number_or_zero(props::MAXIMUM_COSTS),
            max_duration: root.number_or_zero(props::MAXIMUM_DURATION),
            ctes_count: root.ctes.len(),
            ..Stats::default()
        };

        for node in root.iter() {
            stats.nodes_count += 1;
            add(&mut stats.shared_hit_blocks, exclusive(node, props::SHARED_HIT_BLOCKS));
            add(&mut stats.shared_read_blocks, exclusive(node, props::SHARED_READ_BLOCKS));
            add(&mut stats.temp_read_blocks, exclusive(node, props::TEMP_READ_BLOCKS));
            add(&mut stats.temp_written_blocks, exclusive(node, props::TEMP_WRITTEN_BLOCKS));
        }

        stats
    }

    /// Per-index usage
    pub fn compute_indexes_stats(&self, root: &Node) -> Vec<IndexStats> {
        let mut indexes: IndexMap<String, IndexStats> = IndexMap::new();

        // A Bitmap Index Scan only names its index; the relation comes from
        // the Bitmap Heap Scan above it.
        let mut stack: Vec<(&Node, Option<String>)> = vec![(root, None)];
        while let Some((node, heap_relation)) = stack.pop() {
            let kind = node.kind();
            let relation = node.qualified_relation().or(heap_relation);

            if let Some(name) = node.index_name() {
                let entry = indexes.entry(name.to_string()).or_insert_with(|| IndexStats {
                    name: name.to_string(),
                    ..IndexStats::default()
                });
                if entry.relation.is_none() {
                    entry.relation = relation.clone();
                }
                push_distinct(&mut entry.node_types, &node.node_type);
                if let Some(condition) = node.str_prop(props::INDEX_COND) {
                    push_distinct(&mut entry.conditions, condition);
                }
                entry.scans += 1;
                add(&mut entry.exclusive_time, node.number_or_zero(props::EXCLUSIVE_DURATION));
                add(&mut entry.exclusive_cost, node.number_or_zero(props::EXCLUSIVE_COST));
                add(&mut entry.actual_rows, node.number_or_zero(props::ACTUAL_ROWS));
                add(
                    &mut entry.rows_removed_by_filter,
                    node.number_or_zero(props::ROWS_REMOVED_BY_FILTER),
                );
                add(
                    &mut entry.rows_removed_by_index_recheck,
                    node.number_or_zero(props::ROWS_REMOVED_BY_INDEX_RECHECK),
                );
            }

            let inherited = (kind == NodeKind::BitmapHeapScan)
                .then(|| relation.clone())
                .flatten();
            stack.extend(node.ctes.values().rev().map(|cte| (cte, None)));
            stack.extend(node.plans.iter().rev().map(|child| (child, inherited.clone())));
        }

        let execution_time = self.execution_time();
        let mut indexes: Vec<_> = indexes
            .into_values()
            .map(|mut index| {
                index.time_percent = percent_of(index.exclusive_time, execution_time);
                index
            })
            .collect();
        indexes.sort_by(|a, b| {
            by_weight(a.exclusive_time, a.exclusive_cost, b.exclusive_time, b.exclusive_cost)
        });
        indexes
    }

    /// Per-relation rollup over every node that names a relation
    pub fn compute_tables_stats(&self, root: &Node) -> Vec<TableStats> {
        let mut tables: IndexMap<String, TableStats> = IndexMap::new();

        for node in root.iter() {
            let Some(name) = node.qualified_relation() else {
                continue;
            };
            let kind = node.kind();
            let entry = tables.entry(name.clone()).or_insert_with(|| TableStats {
                name,
                ..TableStats::default()
            });

            push_distinct(&mut entry.node_types, &node.node_type);
            entry.scans += 1;
            if kind == NodeKind::SeqScan {
                entry.seq_scans += 1;
            }
            if kind.is_index_scan() || kind == NodeKind::BitmapHeapScan {
                entry.index_scans += 1;
            }
            add(&mut entry.exclusive_time, node.number_or_zero(props::EXCLUSIVE_DURATION));
            add(&mut entry.exclusive_cost, node.number_or_zero(props::EXCLUSIVE_COST));
            add(&mut entry.actual_rows, node.number_or_zero(props::ACTUAL_ROWS));
            add(
                &mut entry.rows_removed_by_filter,
                node.number_or_zero(props::ROWS_REMOVED_BY_FILTER),
            );
            add(&mut entry.shared_hit_blocks, exclusive(node, props::SHARED_HIT_BLOCKS));
            add(&mut entry.shared_read_blocks, exclusive(node, props::SHARED_READ_BLOCKS));
            add(&mut entry.shared_dirtied_blocks, exclusive(node, props::SHARED_DIRTIED_BLOCKS));
            add(&mut entry.shared_written_blocks, exclusive(node, props::SHARED_WRITTEN_BLOCKS));
            add(&mut entry.temp_read_blocks, exclusive(node, props::TEMP_READ_BLOCKS));
            add(&mut entry.temp_written_blocks, exclusive(node, props::TEMP_WRITTEN_BLOCKS));
        }

        let execution_time = self.execution_time();
        let mut tables: Vec<_> = tables
            .into_values()
            .map(|mut table| {
                table.time_percent = percent_of(table.exclusive_time, execution_time);
                table
            })
            .collect();
        tables.sort_by(|a, b| {
            by_weight(a.exclusive_time, a.exclusive_cost, b.exclusive_time, b.exclusive_cost)
        });
        tables
    }

    /// Per-node-type counts and cumulative exclusive time
    pub fn compute_nodes_stats(&self, root: &Node) -> Vec<NodeTypeStats> {
        let mut nodes: IndexMap<&str, NodeTypeStats> = IndexMap::new();

        for node in root.iter() {
            let entry = nodes
                .entry(node.node_type.as_str())
                .or_insert_with(|| NodeTypeStats {
                    node_type: node.node_type.clone(),
                    ..NodeTypeStats::default()
                });
            entry.count += 1;
            add(&mut entry.exclusive_time, node.number_or_zero(props::EXCLUSIVE_DURATION));
            add(&mut entry.exclusive_cost, node.number_or_zero(props::EXCLUSIVE_COST));
            add(&mut entry.actual_rows, node.number_or_zero(props::ACTUAL_ROWS));
        }

        let execution_time = self.execution_time();
        let mut nodes: Vec<_> = nodes
            .into_values()
            .map(|mut stats| {
                stats.time_percent = percent_of(stats.exclusive_time, execution_time);
                stats
            })
            .collect();
        nodes.sort_by(|a, b| {
            by_weight(a.exclusive_time, a.exclusive_cost, b.exclusive_time, b.exclusive_cost)
        });
        nodes
    }

    /// JIT compilation figures, if the statement was JIT-compiled
    pub fn compute_jit_stats(&self) -> Option<JitStats> {
        let jit = self.sections.jit.as_ref()?;
        Some(JitStats {
            functions: jit.functions,
            inlining: jit.options.inlining,
            optimization: jit.options.optimization,
            expressions: jit.options.expressions,
            deforming: jit.options.deforming,
            generation_time: jit.timing.generation,
            inlining_time: jit.timing.inlining,
            optimization_time: jit.timing.optimization,
            emission_time: jit.timing.emission,
            total_time: jit.timing.total,
            time_percent: percent_of(jit.timing.total, self.execution_time()),
        })
    }

    /// Per-trigger timings, slowest first
    pub fn compute_triggers_stats(&self) -> Vec<TriggerStats> {
        let execution_time = self.execution_time();
        let mut triggers: Vec<_> = self
            .sections
            .triggers
            .iter()
            .map(|trigger| TriggerStats {
                name: trigger.trigger_name.clone(),
                relation: trigger.relation.clone(),
                constraint_name: trigger.constraint_name.clone(),
                calls: trigger.calls,
                time: trigger.time,
                average_time: if trigger.calls > 0.0 {
                    trigger.time / trigger.calls
                } else {
                    0.0
                },
                time_percent: percent_of(trigger.time, execution_time),
            })
            .collect();
        triggers.sort_by(|a, b| b.time.total_cmp(&a.time));
        triggers
    }
}

/// Share of `part` in `whole`, in percent; zero when `whole` is not positive
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 && part.is_finite() {
        finite(part * 100.0 / whole)
    } else {
        0.0
    }
}

/// Saturates infinities at the largest finite value and maps NaN to zero
///
/// Non-finite floats serialize as JSON `null` and could not be read back.
pub fn finite(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(f64::MIN, f64::MAX)
    }
}

fn add(total: &mut f64, value: f64) {
    *total = finite(*total + value);
}

fn exclusive(node: &Node, counter: &str) -> f64 {
    node.number_or_zero(&props::exclusive_key(counter))
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Descending by time, then by cost
fn by_weight(a_time: f64, a_cost: f64, b_time: f64, b_cost: f64) -> Ordering {
    b_time
        .total_cmp(&a_time)
        .then_with(|| b_cost.total_cmp(&a_cost))
}

#[cfg(test)]
mod tests;
