//! Summary Builder - Compact verdict over an enriched plan
//!
//! The summary flattens the enriched tree into a pre-order node table,
//! points at the outlier nodes the enricher flagged, lists planner
//! misestimates and turns a set of plan rules into findings with a
//! severity and an overall performance score.
//!
//! Outliers are read from the flags the enricher attached; they are never
//! recomputed here.

use crate::enricher::EstimateDirection;
use crate::plan::{Node, NodeKind};
use crate::props;
use crate::stats::{Stats, finite, percent_of};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity level for findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    /// Critical issue that should be addressed immediately
    Critical,
    /// Warning that may impact performance
    Warning,
    /// Informational suggestion for optimization
    Info,
}

impl SeverityLevel {
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }

    pub fn is_warning_or_above(&self) -> bool {
        matches!(self, Self::Critical | Self::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    /// Score penalty applied per finding of this severity
    fn penalty(&self) -> u8 {
        match self {
            Self::Critical => 25,
            Self::Warning => 10,
            Self::Info => 3,
        }
    }
}

/// Kind of finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Planner row estimate far from the actual row count
    Misestimate,
    /// Sequential scan over many rows
    LargeSeqScan,
    /// Filtered sequential scan that an index could serve
    MissingIndex,
    /// Filter discarding most of the rows it reads
    InefficientFilter,
    /// Nested loop with many inner iterations
    ExpensiveNestedLoop,
    /// Sort that spilled to disk
    SortSpill,
    /// Sort over many rows
    LargeSort,
    /// Several sequential scans in one plan
    MultipleSeqScans,
}

impl FindingKind {
    /// Returns a human-readable description of this kind
    pub fn description(&self) -> &'static str {
        match self {
            Self::Misestimate => "Planner row estimate is off - statistics may be outdated",
            Self::LargeSeqScan => "Sequential scan on large table",
            Self::MissingIndex => "Consider adding an index",
            Self::InefficientFilter => "Filter removing many rows",
            Self::ExpensiveNestedLoop => "Expensive nested loop join",
            Self::SortSpill => "Sort spilled to disk",
            Self::LargeSort => "Sort on large dataset",
            Self::MultipleSeqScans => "Multiple sequential scans detected",
        }
    }
}

/// A single finding about the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: SeverityLevel,
    /// Id of the node in [`Summary::nodes`] the finding refers to
    pub node_id: Option<usize>,
    pub message: String,
    pub recommendation: String,
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Estimated impact on performance (0.0 - 1.0, higher = more impact)
    pub estimated_impact: f64,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        severity: SeverityLevel,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            node_id: None,
            message: message.into(),
            recommendation: recommendation.into(),
            table: None,
            columns: Vec::new(),
            estimated_impact: 0.5,
        }
    }

    pub fn with_node(mut self, id: usize) -> Self {
        self.node_id = Some(id);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the estimated impact, clamped to 0.0 - 1.0
    pub fn with_impact(mut self, impact: f64) -> Self {
        self.estimated_impact = impact.clamp(0.0, 1.0);
        self
    }
}

/// One row of the flattened, pre-order node table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryNode {
    pub id: usize,
    pub parent: Option<usize>,
    pub level: usize,
    /// Child positions from the tree root, e.g. `0.1.0`; CTE subtrees
    /// start with `cte:<name>`
    pub path: String,
    pub node_type: String,
    pub relation: Option<String>,
    pub alias: Option<String>,
    pub index_name: Option<String>,
    pub parent_relationship: Option<String>,
    /// Name of the CTE this node belongs to
    pub cte: Option<String>,
    pub is_cte_root: bool,
    pub loops: f64,
    pub startup_time: f64,
    pub total_time: f64,
    pub exclusive_time: f64,
    /// Exclusive time as a share of execution time, in percent
    pub time_percent: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub exclusive_cost: f64,
    pub plan_rows: f64,
    pub actual_rows: f64,
    pub estimate_factor: f64,
    pub estimate_direction: EstimateDirection,
    pub slowest: bool,
    pub largest: bool,
    pub costliest: bool,
}

impl SummaryNode {
    /// Relation if the node reads one, else its alias
    pub fn identity(&self) -> Option<&str> {
        self.relation.as_deref().or(self.alias.as_deref())
    }
}

/// Share of the statement's total time per phase, in percent
///
/// Total time is planning plus execution; triggers and JIT run inside
/// execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseShares {
    pub total_time: f64,
    pub planning_percent: f64,
    pub execution_percent: f64,
    pub trigger_percent: f64,
    pub jit_percent: f64,
}

/// Compact verdict over an enriched plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub nodes: Vec<SummaryNode>,
    /// Ids of the nodes flagged as costliest
    pub costliest: Vec<usize>,
    /// Ids of the nodes flagged as largest
    pub largest: Vec<usize>,
    /// Ids of the nodes flagged as slowest
    pub slowest: Vec<usize>,
    /// Ids of the nodes whose estimate factor reaches the misestimate threshold
    pub misestimated: Vec<usize>,
    pub phases: PhaseShares,
    /// Findings, critical first
    pub findings: Vec<Finding>,
    /// Overall performance score (0-100, higher = better)
    pub performance_score: u8,
    pub verdict: String,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            costliest: Vec::new(),
            largest: Vec::new(),
            slowest: Vec::new(),
            misestimated: Vec::new(),
            phases: PhaseShares::default(),
            findings: Vec::new(),
            performance_score: 100,
            verdict: String::new(),
        }
    }
}

impl Summary {
    pub fn has_misestimates(&self) -> bool {
        !self.misestimated.is_empty()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_critical())
    }

    pub fn has_warnings(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_warning_or_above())
    }

    pub fn node(&self, id: usize) -> Option<&SummaryNode> {
        self.nodes.get(id)
    }

    fn add_finding(&mut self, finding: Finding) {
        self.performance_score = self
            .performance_score
            .saturating_sub(finding.severity.penalty());
        self.findings.push(finding);
    }
}

/// Thresholds for the summary rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Estimate factor from which a node counts as misestimated
    pub misestimate_factor: f64,
    /// Estimate factor from which a misestimate is critical
    pub critical_misestimate_factor: f64,
    /// Rows read by a sequential scan from which it is reported
    pub large_table_threshold: f64,
    /// Rows from which scans are critical and loops/sorts are reported
    pub high_row_threshold: f64,
    /// Share of rows removed by a filter from which it is reported
    pub filter_efficiency_threshold: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            misestimate_factor: 10.0,
            critical_misestimate_factor: 1_000.0,
            large_table_threshold: 1_000.0,
            high_row_threshold: 10_000.0,
            filter_efficiency_threshold: 0.5,
        }
    }
}

/// Builds a [`Summary`] with the default thresholds
pub fn build(root: &Node, stats: &Stats) -> Summary {
    SummaryBuilder::new().build(root, stats)
}

/// Builds summaries with configurable thresholds
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder {
    config: SummaryConfig,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SummaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    pub fn build(&self, root: &Node, stats: &Stats) -> Summary {
        let mut summary = Summary {
            nodes: flatten(root, stats.execution_time),
            phases: phase_shares(stats),
            ..Summary::default()
        };

        for node in &summary.nodes {
            if node.costliest {
                summary.costliest.push(node.id);
            }
            if node.largest {
                summary.largest.push(node.id);
            }
            if node.slowest {
                summary.slowest.push(node.id);
            }
            if node.estimate_factor >= self.config.misestimate_factor {
                summary.misestimated.push(node.id);
            }
        }

        let nodes: Vec<&Node> = root.iter().collect();
        let mut findings = Vec::new();
        self.check_misestimates(&summary.nodes, &mut findings);
        self.check_seq_scans(&nodes, &mut findings);
        self.check_inefficient_filters(&nodes, &mut findings);
        self.check_nested_loops(&nodes, &mut findings);
        self.check_sorts(&nodes, &mut findings);
        self.check_multiple_seq_scans(&nodes, &mut findings);

        // Stable: findings of equal severity keep tree order
        findings.sort_by_key(|finding| finding.severity);
        for finding in findings {
            summary.add_finding(finding);
        }
        summary.verdict = verdict(&summary);

        tracing::debug!(
            nodes = summary.nodes.len(),
            findings = summary.findings.len(),
            score = summary.performance_score,
            "Summary built"
        );

        summary
    }

    fn check_misestimates(&self, nodes: &[SummaryNode], findings: &mut Vec<Finding>) {
        for node in nodes {
            let factor = node.estimate_factor;
            if factor < self.config.misestimate_factor {
                continue;
            }
            let severity = if factor >= self.config.critical_misestimate_factor {
                SeverityLevel::Critical
            } else {
                SeverityLevel::Warning
            };
            let direction = match node.estimate_direction {
                EstimateDirection::Over => "overestimated",
                _ => "underestimated",
            };

            let mut finding = Finding::new(
                FindingKind::Misestimate,
                severity,
                format!(
                    "Planner {direction} rows of '{}' by a factor of {factor:.0} ({} planned, {} actual)",
                    node.node_type, node.plan_rows, node.actual_rows
                ),
                "Run ANALYZE on the involved tables or raise their statistics target",
            )
            .with_node(node.id)
            .with_impact(factor / self.config.critical_misestimate_factor);
            if let Some(relation) = &node.relation {
                finding = finding.with_table(relation);
            }
            findings.push(finding);
        }
    }

    fn check_seq_scans(&self, nodes: &[&Node], findings: &mut Vec<Finding>) {
        for (id, node) in nodes.iter().enumerate() {
            if node.kind() != NodeKind::SeqScan {
                continue;
            }
            let rows = rows_read(node);
            if rows < self.config.large_table_threshold {
                continue;
            }
            let table = node
                .qualified_relation()
                .unwrap_or_else(|| "unknown".to_string());

            let severity = if rows >= self.config.high_row_threshold {
                SeverityLevel::Critical
            } else {
                SeverityLevel::Warning
            };
            findings.push(
                Finding::new(
                    FindingKind::LargeSeqScan,
                    severity,
                    format!("Sequential scan on '{table}' reading {rows} rows"),
                    format!("Consider adding an index on '{table}' or filtering on indexed columns"),
                )
                .with_node(id)
                .with_table(&table)
                .with_impact(rows / self.config.high_row_threshold),
            );

            if let Some(filter) = node.str_prop(props::FILTER).filter(|f| !f.is_empty()) {
                findings.push(
                    Finding::new(
                        FindingKind::MissingIndex,
                        SeverityLevel::Warning,
                        format!("Sequential scan with filter on '{table}': {filter}"),
                        format!(
                            "Consider creating an index: CREATE INDEX idx_{}_... ON {table} (...)",
                            table.replace('.', "_")
                        ),
                    )
                    .with_node(id)
                    .with_table(&table)
                    .with_columns(extract_columns_from_filter(filter))
                    .with_impact(0.7),
                );
            }
        }
    }

    fn check_inefficient_filters(&self, nodes: &[&Node], findings: &mut Vec<Finding>) {
        for (id, node) in nodes.iter().enumerate() {
            let removed = node.number_or_zero(props::ROWS_REMOVED_BY_FILTER);
            let kept = node.number_or_zero(props::ACTUAL_ROWS);
            let total = removed + kept;
            if removed <= 0.0 || total <= 0.0 {
                continue;
            }
            let ratio = removed / total;
            if ratio < self.config.filter_efficiency_threshold {
                continue;
            }
            let table = node
                .qualified_relation()
                .unwrap_or_else(|| "unknown".to_string());

            findings.push(
                Finding::new(
                    FindingKind::InefficientFilter,
                    SeverityLevel::Info,
                    format!(
                        "Filter removed {:.0}% of rows ({removed} of {total})",
                        ratio * 100.0
                    ),
                    format!("Consider adding an index on the filtered column(s) of '{table}'"),
                )
                .with_node(id)
                .with_table(&table)
                .with_impact(ratio * 0.5),
            );
        }
    }

    fn check_nested_loops(&self, nodes: &[&Node], findings: &mut Vec<Finding>) {
        for (id, node) in nodes.iter().enumerate() {
            if node.kind() != NodeKind::NestedLoop {
                continue;
            }
            let inner_loops = node
                .plans
                .iter()
                .filter(|child| !child.is_init_plan())
                .nth(1)
                .map_or(0.0, |inner| inner.number_or_zero(props::ACTUAL_LOOPS));
            let rows = node.number_or_zero(props::ACTUAL_ROWS);

            let threshold = self.config.high_row_threshold;
            if inner_loops >= threshold || rows >= threshold {
                findings.push(
                    Finding::new(
                        FindingKind::ExpensiveNestedLoop,
                        SeverityLevel::Warning,
                        format!(
                            "Nested loop join producing {rows} rows with {inner_loops} inner loops"
                        ),
                        "Consider adding indexes on join columns or restructuring the query",
                    )
                    .with_node(id)
                    .with_impact(0.6),
                );
            }
        }
    }

    fn check_sorts(&self, nodes: &[&Node], findings: &mut Vec<Finding>) {
        for (id, node) in nodes.iter().enumerate() {
            if !matches!(node.kind(), NodeKind::Sort | NodeKind::IncrementalSort) {
                continue;
            }
            let rows = node.number_or_zero(props::ACTUAL_ROWS);
            let space_kb = node.number_or_zero(props::SORT_SPACE_USED);

            if node.str_prop(props::SORT_SPACE_TYPE) == Some("Disk") {
                findings.push(
                    Finding::new(
                        FindingKind::SortSpill,
                        SeverityLevel::Warning,
                        format!("Sort of {rows} rows spilled {space_kb}kB to disk"),
                        "Consider increasing work_mem or adding an index that provides the order",
                    )
                    .with_node(id)
                    .with_impact(0.6),
                );
            } else if rows >= self.config.high_row_threshold {
                findings.push(
                    Finding::new(
                        FindingKind::LargeSort,
                        SeverityLevel::Info,
                        format!("Sort operation on {rows} rows"),
                        "Consider adding an index to avoid sorting or increasing work_mem",
                    )
                    .with_node(id)
                    .with_impact(0.4),
                );
            }
        }
    }

    fn check_multiple_seq_scans(&self, nodes: &[&Node], findings: &mut Vec<Finding>) {
        let seq_scans: Vec<_> = nodes
            .iter()
            .filter(|node| node.kind() == NodeKind::SeqScan)
            .collect();

        if seq_scans.len() >= 3 {
            let tables: Vec<_> = seq_scans
                .iter()
                .filter_map(|node| node.qualified_relation())
                .collect();

            findings.push(
                Finding::new(
                    FindingKind::MultipleSeqScans,
                    SeverityLevel::Warning,
                    format!(
                        "Query performs {} sequential scans on tables: {}",
                        seq_scans.len(),
                        tables.join(", ")
                    ),
                    "Consider adding indexes or restructuring the query to reduce full table scans",
                )
                .with_impact(0.5),
            );
        }
    }
}

/// Flattens the tree in the same order as [`Node::iter`]
fn flatten(root: &Node, execution_time: f64) -> Vec<SummaryNode> {
    let mut nodes = Vec::with_capacity(root.node_count());
    let mut stack: Vec<(&Node, Option<usize>, usize, String)> = vec![(root, None, 0, "0".into())];

    while let Some((node, parent, level, path)) = stack.pop() {
        let id = nodes.len();

        stack.extend(
            node.ctes
                .iter()
                .rev()
                .map(|(name, cte)| (cte, None, 0, format!("cte:{name}"))),
        );
        stack.extend(
            node.plans
                .iter()
                .enumerate()
                .rev()
                .map(|(position, child)| (child, Some(id), level + 1, format!("{path}.{position}"))),
        );

        let exclusive_time = node.number_or_zero(props::EXCLUSIVE_DURATION);
        nodes.push(SummaryNode {
            id,
            parent,
            level,
            path,
            node_type: node.node_type.clone(),
            relation: node.qualified_relation(),
            alias: node.alias().map(str::to_owned),
            index_name: node.index_name().map(str::to_owned),
            parent_relationship: node.parent_relationship().map(str::to_owned),
            cte: node.str_prop(props::CTE_SUBPLAN_OF).map(str::to_owned),
            is_cte_root: node.flag(props::IS_CTE_ROOT),
            loops: node.get(props::ACTUAL_LOOPS).and_then(Value::as_f64).unwrap_or(1.0),
            startup_time: node.number_or_zero(props::ACTUAL_STARTUP_TIME),
            total_time: node.number_or_zero(props::ACTUAL_TOTAL_TIME),
            exclusive_time,
            time_percent: percent_of(exclusive_time, execution_time),
            startup_cost: node.number_or_zero(props::STARTUP_COST),
            total_cost: node.number_or_zero(props::TOTAL_COST),
            exclusive_cost: node.number_or_zero(props::EXCLUSIVE_COST),
            plan_rows: node.number_or_zero(props::PLAN_ROWS),
            actual_rows: node.number_or_zero(props::ACTUAL_ROWS),
            estimate_factor: node.number_or_zero(props::PLANNER_ESTIMATE_FACTOR),
            estimate_direction: node
                .str_prop(props::PLANNER_ESTIMATE_DIRECTION)
                .map(EstimateDirection::parse)
                .unwrap_or_default(),
            slowest: node.flag(props::SLOWEST_NODE),
            largest: node.flag(props::LARGEST_NODE),
            costliest: node.flag(props::COSTLIEST_NODE),
        });
    }

    nodes
}

fn phase_shares(stats: &Stats) -> PhaseShares {
    let total = finite(stats.planning_time + stats.execution_time);
    PhaseShares {
        total_time: total,
        planning_percent: percent_of(stats.planning_time, total),
        execution_percent: percent_of(stats.execution_time, total),
        trigger_percent: percent_of(stats.trigger_time, total),
        jit_percent: percent_of(stats.jit_time, total),
    }
}

/// Rows a scan read: kept plus filtered out when analyzed, else the estimate
fn rows_read(node: &Node) -> f64 {
    if node.get(props::ACTUAL_LOOPS).is_some() {
        node.number_or_zero(props::ACTUAL_ROWS) + node.number_or_zero(props::ROWS_REMOVED_BY_FILTER)
    } else {
        node.number_or_zero(props::PLAN_ROWS)
    }
}

fn verdict(summary: &Summary) -> String {
    let count = |severity: SeverityLevel| {
        summary
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    };
    let critical = count(SeverityLevel::Critical);
    let warnings = count(SeverityLevel::Warning);
    let info = count(SeverityLevel::Info);

    if summary.findings.is_empty() {
        "Query plan looks optimal - no issues detected.".to_string()
    } else if critical > 0 {
        format!(
            "Query has {critical} critical issue(s), {warnings} warning(s), and {info} suggestion(s). Performance score: {}/100",
            summary.performance_score
        )
    } else if warnings > 0 {
        format!(
            "Query has {warnings} warning(s) and {info} suggestion(s). Performance score: {}/100",
            summary.performance_score
        )
    } else {
        format!(
            "Query has {info} minor suggestion(s). Performance score: {}/100",
            summary.performance_score
        )
    }
}

/// Extracts column names from a filter expression (best effort)
fn extract_columns_from_filter(filter: &str) -> Vec<String> {
    const OPERATORS: [&str; 10] = ["=", "<>", "!=", ">=", "<=", ">", "<", " IS ", " LIKE ", " IN "];
    let mut columns = Vec::new();

    for part in filter.split(" AND ").flat_map(|part| part.split(" OR ")) {
        let trimmed = part.trim().trim_start_matches('(').trim_end_matches(')');

        let Some(idx) = OPERATORS.iter().filter_map(|op| trimmed.find(op)).min() else {
            continue;
        };
        let candidate = trimmed[..idx].trim().trim_start_matches('(').trim();
        let looks_like_value = candidate.starts_with('\'')
            || candidate.starts_with('"')
            || candidate.chars().next().is_some_and(|c| c.is_ascii_digit());
        if candidate.is_empty() || looks_like_value {
            continue;
        }

        // Drop table qualifiers and casts, e.g. `(o.status)::text`
        let column = candidate
            .split("::")
            .next()
            .unwrap_or(candidate)
            .trim_end_matches(')')
            .rsplit('.')
            .next()
            .unwrap_or(candidate)
            .to_string();
        if !column.is_empty() && !columns.contains(&column) {
            columns.push(column);
        }
    }

    columns
}
