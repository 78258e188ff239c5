//! Comparator - Structural diff of two analyzed plans
//!
//! Nodes are paired in two rounds. First by `(node type, relation or
//! alias)` where that key occurs exactly once on each side, then the
//! remaining nodes by tree path, provided the node type is the same on
//! both sides. Whatever is left over is reported as removed (only in the
//! earlier plan) or added (only in the later one).

use crate::error::{ComparisonError, Side};
use crate::explained::Explained;
use crate::stats::{finite, percent_of};
use crate::summary::SummaryNode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Result type for comparisons
pub type Result<T> = std::result::Result<T, ComparisonError>;

/// A figure before and after, and their difference (`after - before`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub before: f64,
    pub after: f64,
    pub diff: f64,
}

impl Delta {
    pub fn new(before: f64, after: f64) -> Self {
        Self {
            before,
            after,
            diff: finite(after - before),
        }
    }

    /// Relative change in percent of `before`, zero when `before` is zero
    pub fn percent(&self) -> f64 {
        percent_of(self.diff, self.before)
    }

    pub fn is_zero(&self) -> bool {
        self.diff == 0.0
    }
}

/// How a pair of nodes was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Unique node type and relation/alias on both sides
    Identity,
    /// Same node type at the same tree path
    Position,
}

/// A node present on only one side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: usize,
    pub path: String,
    pub node_type: String,
    pub identity: Option<String>,
}

impl From<&SummaryNode> for NodeRef {
    fn from(node: &SummaryNode) -> Self {
        Self {
            id: node.id,
            path: node.path.clone(),
            node_type: node.node_type.clone(),
            identity: node.identity().map(str::to_owned),
        }
    }
}

/// Deltas of a matched pair of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDelta {
    pub before: NodeRef,
    pub after: NodeRef,
    pub matched_by: MatchKind,
    pub total_time: Delta,
    pub exclusive_time: Delta,
    pub total_cost: Delta,
    pub exclusive_cost: Delta,
    pub actual_rows: Delta,
    pub plan_rows: Delta,
}

impl NodeDelta {
    fn new(before: &SummaryNode, after: &SummaryNode, matched_by: MatchKind) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            matched_by,
            total_time: Delta::new(before.total_time, after.total_time),
            exclusive_time: Delta::new(before.exclusive_time, after.exclusive_time),
            total_cost: Delta::new(before.total_cost, after.total_cost),
            exclusive_cost: Delta::new(before.exclusive_cost, after.exclusive_cost),
            actual_rows: Delta::new(before.actual_rows, after.actual_rows),
            plan_rows: Delta::new(before.plan_rows, after.plan_rows),
        }
    }

    fn deltas(&self) -> [Delta; 6] {
        [
            self.total_time,
            self.exclusive_time,
            self.total_cost,
            self.exclusive_cost,
            self.actual_rows,
            self.plan_rows,
        ]
    }
}

/// Statement-wide deltas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDelta {
    pub planning_time: Delta,
    pub execution_time: Delta,
    /// Inclusive cost of the root node
    pub total_cost: Delta,
    pub max_rows: Delta,
    pub max_cost: Delta,
    pub max_duration: Delta,
    pub nodes_count: Delta,
    pub performance_score: Delta,
}

impl PlanDelta {
    fn deltas(&self) -> [Delta; 8] {
        [
            self.planning_time,
            self.execution_time,
            self.total_cost,
            self.max_rows,
            self.max_cost,
            self.max_duration,
            self.nodes_count,
            self.performance_score,
        ]
    }
}

/// Deltas of a relation present in both plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDelta {
    pub name: String,
    pub scans: Delta,
    pub exclusive_time: Delta,
    pub exclusive_cost: Delta,
    pub actual_rows: Delta,
    pub shared_hit_blocks: Delta,
    pub shared_read_blocks: Delta,
}

/// Deltas of an index used by both plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDelta {
    pub name: String,
    pub scans: Delta,
    pub exclusive_time: Delta,
    pub exclusive_cost: Delta,
    pub actual_rows: Delta,
}

/// Structural diff of two analyzed plans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub plan: PlanDelta,
    /// Matched nodes, in the order of the earlier plan
    pub nodes: Vec<NodeDelta>,
    pub added_nodes: Vec<NodeRef>,
    pub removed_nodes: Vec<NodeRef>,
    pub tables: Vec<TableDelta>,
    pub added_tables: Vec<String>,
    pub removed_tables: Vec<String>,
    pub indexes: Vec<IndexDelta>,
    pub added_indexes: Vec<String>,
    pub removed_indexes: Vec<String>,
}

impl Comparison {
    /// Returns true if no figure moved and nothing was added or removed
    pub fn is_unchanged(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_tables.is_empty()
            && self.removed_tables.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.plan.deltas().iter().all(Delta::is_zero)
            && self
                .nodes
                .iter()
                .all(|node| node.deltas().iter().all(Delta::is_zero))
            && self.tables.iter().all(|table| {
                [
                    table.scans,
                    table.exclusive_time,
                    table.exclusive_cost,
                    table.actual_rows,
                    table.shared_hit_blocks,
                    table.shared_read_blocks,
                ]
                .iter()
                .all(Delta::is_zero)
            })
            && self.indexes.iter().all(|index| {
                [
                    index.scans,
                    index.exclusive_time,
                    index.exclusive_cost,
                    index.actual_rows,
                ]
                .iter()
                .all(Delta::is_zero)
            })
    }
}

/// Diffs two analysis results
pub fn compare(before: &Explained, after: &Explained) -> Result<Comparison> {
    validate(before, Side::Before)?;
    validate(after, Side::After)?;

    let (nodes, removed_nodes, added_nodes) =
        match_nodes(&before.summary.nodes, &after.summary.nodes);

    let (tables, removed_tables, added_tables) = diff_by_name(
        &before.tables_stats,
        &after.tables_stats,
        |table| table.name.as_str(),
        |b, a| TableDelta {
            name: b.name.clone(),
            scans: Delta::new(b.scans as f64, a.scans as f64),
            exclusive_time: Delta::new(b.exclusive_time, a.exclusive_time),
            exclusive_cost: Delta::new(b.exclusive_cost, a.exclusive_cost),
            actual_rows: Delta::new(b.actual_rows, a.actual_rows),
            shared_hit_blocks: Delta::new(b.shared_hit_blocks, a.shared_hit_blocks),
            shared_read_blocks: Delta::new(b.shared_read_blocks, a.shared_read_blocks),
        },
    );

    let (indexes, removed_indexes, added_indexes) = diff_by_name(
        &before.indexes_stats,
        &after.indexes_stats,
        |index| index.name.as_str(),
        |b, a| IndexDelta {
            name: b.name.clone(),
            scans: Delta::new(b.scans as f64, a.scans as f64),
            exclusive_time: Delta::new(b.exclusive_time, a.exclusive_time),
            exclusive_cost: Delta::new(b.exclusive_cost, a.exclusive_cost),
            actual_rows: Delta::new(b.actual_rows, a.actual_rows),
        },
    );

    let comparison = Comparison {
        plan: plan_delta(before, after),
        nodes,
        added_nodes,
        removed_nodes,
        tables,
        added_tables,
        removed_tables,
        indexes,
        added_indexes,
        removed_indexes,
    };

    tracing::debug!(
        matched = comparison.nodes.len(),
        added = comparison.added_nodes.len(),
        removed = comparison.removed_nodes.len(),
        execution_time_diff = comparison.plan.execution_time.diff,
        "Plans compared"
    );

    Ok(comparison)
}

fn validate(explained: &Explained, side: Side) -> Result<()> {
    if explained.stats.nodes_count == 0 {
        return Err(ComparisonError::MissingStats { side });
    }
    if explained.summary.nodes.is_empty() {
        return Err(ComparisonError::EmptyPlan { side });
    }
    Ok(())
}

fn plan_delta(before: &Explained, after: &Explained) -> PlanDelta {
    let (b, a) = (&before.stats, &after.stats);
    let root_cost = |explained: &Explained| {
        explained
            .summary
            .nodes
            .first()
            .map_or(0.0, |root| root.total_cost)
    };

    PlanDelta {
        planning_time: Delta::new(b.planning_time, a.planning_time),
        execution_time: Delta::new(b.execution_time, a.execution_time),
        total_cost: Delta::new(root_cost(before), root_cost(after)),
        max_rows: Delta::new(b.max_rows, a.max_rows),
        max_cost: Delta::new(b.max_cost, a.max_cost),
        max_duration: Delta::new(b.max_duration, a.max_duration),
        nodes_count: Delta::new(b.nodes_count as f64, a.nodes_count as f64),
        performance_score: Delta::new(
            f64::from(before.summary.performance_score),
            f64::from(after.summary.performance_score),
        ),
    }
}

type NodeMatches = (Vec<NodeDelta>, Vec<NodeRef>, Vec<NodeRef>);

fn match_nodes(before: &[SummaryNode], after: &[SummaryNode]) -> NodeMatches {
    let mut pairs: Vec<Option<(usize, MatchKind)>> = vec![None; before.len()];
    let mut taken = vec![false; after.len()];

    // Round one: keys that are unique on both sides
    let before_keys = identity_keys(before);
    let after_keys = identity_keys(after);
    for (key, before_ids) in &before_keys {
        if let [before_id] = before_ids.as_slice()
            && let Some([after_id]) = after_keys.get(key).map(Vec::as_slice)
        {
            pairs[*before_id] = Some((*after_id, MatchKind::Identity));
            taken[*after_id] = true;
        }
    }

    // Round two: same node type at the same path
    let by_path: HashMap<&str, usize> = after
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.path.as_str(), idx))
        .collect();
    for (before_idx, node) in before.iter().enumerate() {
        if pairs[before_idx].is_some() {
            continue;
        }
        if let Some(&after_idx) = by_path.get(node.path.as_str())
            && !taken[after_idx]
            && after[after_idx].node_type == node.node_type
        {
            pairs[before_idx] = Some((after_idx, MatchKind::Position));
            taken[after_idx] = true;
        }
    }

    let mut matched = Vec::new();
    let mut removed = Vec::new();
    for (before_idx, pair) in pairs.into_iter().enumerate() {
        match pair {
            Some((after_idx, kind)) => {
                matched.push(NodeDelta::new(&before[before_idx], &after[after_idx], kind));
            }
            None => removed.push(NodeRef::from(&before[before_idx])),
        }
    }
    let added = after
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|(node, _)| NodeRef::from(node))
        .collect();

    (matched, removed, added)
}

/// Groups node positions by `(node type, relation or alias)`
fn identity_keys(nodes: &[SummaryNode]) -> IndexMap<(&str, &str), Vec<usize>> {
    let mut keys: IndexMap<(&str, &str), Vec<usize>> = IndexMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        if let Some(identity) = node.identity() {
            keys.entry((node.node_type.as_str(), identity))
                .or_default()
                .push(idx);
        }
    }
    keys
}

/// Pairs two rollup lists by name; returns (matched, removed, added)
fn diff_by_name<T, D>(
    before: &[T],
    after: &[T],
    name: impl Fn(&T) -> &str,
    delta: impl Fn(&T, &T) -> D,
) -> (Vec<D>, Vec<String>, Vec<String>) {
    let after_by_name: HashMap<&str, &T> = after.iter().map(|item| (name(item), item)).collect();

    let mut matched = Vec::new();
    let mut removed = Vec::new();
    for item in before {
        match after_by_name.get(name(item)) {
            Some(&other) => matched.push(delta(item, other)),
            None => removed.push(name(item).to_string()),
        }
    }

    let before_names: HashSet<&str> = before.iter().map(&name).collect();
    let added = after
        .iter()
        .map(&name)
        .filter(|n| !before_names.contains(n))
        .map(str::to_owned)
        .collect();

    (matched, removed, added)
}

#[cfg(test)]
mod tests;
