//! Plan Enricher
//!
//! Walks a freshly parsed plan tree and rewrites it in place:
//!
//! 1. top-down, before a node's children are visited: planner row estimate,
//!    propagation of the parallel degree planned by a Gather, and relocation
//!    of CTE InitPlans into the CTE table;
//! 2. bottom-up, right after a node's children return: loop/worker
//!    correction of timings, loop scaling of row counters, exclusive
//!    duration, cost and buffer counters, and the running global maxima;
//! 3. a final descent marking the slowest, largest and costliest nodes.
//!
//! All per-analysis state lives in a [`PlanEnricher`] created for a single
//! call, so independent trees can be analyzed concurrently.

use crate::error::AnalysisError;
use crate::parser::MAX_PLAN_DEPTH;
use crate::plan::Node;
use crate::props;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Result type for plan enrichment
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Direction of the planner's row misestimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateDirection {
    /// The planner expected more rows than were produced
    Over,
    /// The planner expected fewer rows than were produced
    Under,
    #[default]
    None,
}

impl EstimateDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Under => "under",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "over" => Self::Over,
            "under" => Self::Under,
            _ => Self::None,
        }
    }
}

/// Global figures discovered while analyzing a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Largest loop-corrected actual row count
    pub max_rows: f64,
    /// Largest exclusive cost
    pub max_cost: f64,
    /// Largest exclusive corrected duration in milliseconds
    pub max_duration: f64,
    /// Names of the CTEs relocated to the root, in discovery order
    pub ctes: Vec<String>,
}

/// Enriches `root` in place and returns the global maxima
///
/// Must be called once per freshly parsed tree; re-analyzing an enriched
/// tree would apply the loop and worker corrections twice.
pub fn analyze(root: &mut Node) -> Result<AnalysisSummary> {
    PlanEnricher::new().analyze_plan(root)
}

/// Per-call analysis context
#[derive(Debug, Default)]
pub struct PlanEnricher {
    max_rows: f64,
    max_cost: f64,
    max_duration: f64,
    ctes: IndexMap<String, Node>,
}

impl PlanEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs all passes over `root`, consuming the context
    pub fn analyze_plan(mut self, root: &mut Node) -> Result<AnalysisSummary> {
        self.process_node(root, 1)?;

        root.set(props::MAXIMUM_ROWS, self.max_rows);
        root.set(props::MAXIMUM_COSTS, self.max_cost);
        root.set(props::MAXIMUM_DURATION, self.max_duration);
        root.ctes = std::mem::take(&mut self.ctes);

        self.find_outlier_nodes(root);

        let summary = AnalysisSummary {
            max_rows: self.max_rows,
            max_cost: self.max_cost,
            max_duration: self.max_duration,
            ctes: root.ctes.keys().cloned().collect(),
        };

        tracing::debug!(
            node_type = %root.node_type,
            max_rows = summary.max_rows,
            max_cost = summary.max_cost,
            max_duration = summary.max_duration,
            ctes = summary.ctes.len(),
            "Plan analyzed"
        );

        Ok(summary)
    }

    fn process_node(&mut self, node: &mut Node, depth: usize) -> Result<()> {
        if depth > MAX_PLAN_DEPTH {
            return Err(AnalysisError::TooDeep {
                limit: MAX_PLAN_DEPTH,
            });
        }

        calculate_planner_estimate(node)?;

        let workers = match node.number(props::WORKERS_PLANNED)? {
            Some(planned) => Some(planned),
            None => node.number(props::WORKERS_PLANNED_BY_GATHER)?,
        };
        let cte_owner = node.text(props::CTE_SUBPLAN_OF)?.map(str::to_owned);

        let children = std::mem::take(&mut node.plans);
        for mut child in children {
            // CTE bodies show up as InitPlan children of whichever node
            // references them first; they are moved out to the CTE table.
            if let Some(name) = cte_name(&child)? {
                let key = self.reserve_cte(name);
                child.set(props::IS_CTE_ROOT, true);
                child.set(props::CTE_SUBPLAN_OF, key.as_str());
                self.process_node(&mut child, depth + 1)?;
                self.ctes.insert(key, child);
                continue;
            }

            let relationship = child.text(props::PARENT_RELATIONSHIP)?;
            let runs_in_workers = !matches!(relationship, Some(props::INIT_PLAN | props::SUB_PLAN));
            if runs_in_workers && let Some(workers) = workers {
                child.set(props::WORKERS_PLANNED_BY_GATHER, workers);
            }
            if let Some(owner) = &cte_owner {
                child.set(props::CTE_SUBPLAN_OF, owner.as_str());
            }

            self.process_node(&mut child, depth + 1)?;
            node.plans.push(child);
        }

        calculate_actuals(node)?;
        calculate_exclusives(node)?;
        self.update_maximums(node);

        Ok(())
    }

    /// Claims a slot in the CTE table in discovery order
    ///
    /// A repeated name gets a `#2`, `#3`, ... suffix so no subtree is lost.
    fn reserve_cte(&mut self, name: String) -> String {
        let key = if self.ctes.contains_key(&name) {
            let key = (2..)
                .map(|n| format!("{name}#{n}"))
                .find(|key| !self.ctes.contains_key(key))
                .unwrap_or_else(|| name.clone());
            tracing::warn!(cte = %name, key = %key, "Duplicate CTE name");
            key
        } else {
            name
        };
        self.ctes.insert(key.clone(), Node::default());
        key
    }

    fn update_maximums(&mut self, node: &Node) {
        let rows = node.number_or_zero(props::ACTUAL_ROWS);
        let cost = node.number_or_zero(props::EXCLUSIVE_COST);
        let duration = node.number_or_zero(props::EXCLUSIVE_DURATION);

        if rows > self.max_rows {
            self.max_rows = rows;
        }
        if cost > self.max_cost {
            self.max_cost = cost;
        }
        if duration > self.max_duration {
            self.max_duration = duration;
        }
    }

    fn find_outlier_nodes(&self, root: &mut Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let costliest = is_maximum(node.number_or_zero(props::EXCLUSIVE_COST), self.max_cost);
            let largest = is_maximum(node.number_or_zero(props::ACTUAL_ROWS), self.max_rows);
            let slowest = is_maximum(
                node.number_or_zero(props::EXCLUSIVE_DURATION),
                self.max_duration,
            );

            node.set(props::COSTLIEST_NODE, costliest);
            node.set(props::LARGEST_NODE, largest);
            node.set(props::SLOWEST_NODE, slowest);

            let Node { plans, ctes, .. } = node;
            stack.extend(ctes.values_mut());
            stack.extend(plans.iter_mut());
        }
    }
}

fn is_maximum(value: f64, maximum: f64) -> bool {
    maximum > 0.0 && value == maximum
}

/// Returns the de-prefixed CTE name if `node` produces a CTE
fn cte_name(node: &Node) -> Result<Option<String>> {
    if node.text(props::PARENT_RELATIONSHIP)? != Some(props::INIT_PLAN) {
        return Ok(None);
    }
    Ok(node
        .text(props::SUBPLAN_NAME)?
        .and_then(|name| name.strip_prefix(props::CTE_MARKER))
        .map(|name| name.trim_start().to_string()))
}

fn calculate_planner_estimate(node: &mut Node) -> Result<()> {
    let actual = node.number(props::ACTUAL_ROWS)?;
    let planned = node.number(props::PLAN_ROWS)?;

    let (direction, factor) = match (actual, planned) {
        (Some(actual), Some(planned)) if actual < planned => {
            (EstimateDirection::Over, planned / actual)
        }
        (Some(actual), Some(planned)) if actual > planned => {
            (EstimateDirection::Under, actual / planned)
        }
        _ => (EstimateDirection::None, 0.0),
    };

    // Zero rows on either side yields Inf (or NaN for 0/0)
    let (direction, factor) = if factor.is_finite() && factor >= 0.0 {
        (direction, factor)
    } else {
        (EstimateDirection::None, 0.0)
    };

    node.set(props::PLANNER_ESTIMATE_DIRECTION, direction.as_str());
    node.set(props::PLANNER_ESTIMATE_FACTOR, factor);
    Ok(())
}

fn calculate_actuals(node: &mut Node) -> Result<()> {
    let loops = node.number(props::ACTUAL_LOOPS)?.unwrap_or(1.0);

    if let Some(total) = node.number(props::ACTUAL_TOTAL_TIME)? {
        // Times are reported per loop and averaged over the participating
        // processes (planned workers plus the leader).
        let workers = node
            .number(props::WORKERS_PLANNED_BY_GATHER)?
            .map_or(1.0, |planned| (planned + 1.0).max(1.0));

        let total = total * loops / workers;
        let startup = node
            .number(props::ACTUAL_STARTUP_TIME)?
            .map_or(0.0, |startup| startup * loops / workers);

        let children: f64 = node
            .plans
            .iter()
            .filter(|child| !child.is_init_plan())
            .map(|child| child.number_or_zero(props::EXCLUSIVE_DURATION))
            .sum();

        node.set(props::ACTUAL_TOTAL_TIME, total);
        node.set(props::ACTUAL_STARTUP_TIME, startup);
        node.set(props::ACTUAL_DURATION, total);
        node.set(props::EXCLUSIVE_DURATION, (total - children).max(0.0));
    }

    if let Some(total_cost) = node.number(props::TOTAL_COST)? {
        node.set(props::ACTUAL_COST, total_cost);
    }

    if node.get(props::FILTER).is_none() {
        node.set(props::FILTER, "");
    }

    for key in props::LOOP_SCALED_ROWS {
        let rows = node.number(key)?.map_or(0.0, |rows| rows * loops);
        node.set(key, rows);
    }

    Ok(())
}

fn calculate_exclusives(node: &mut Node) -> Result<()> {
    if let Some(total_cost) = node.number(props::TOTAL_COST)? {
        let children = children_sum(node, props::TOTAL_COST);
        node.set(props::EXCLUSIVE_COST, (total_cost - children).max(0.0));
    }

    for counter in props::EXCLUSIVE_COUNTERS {
        if let Some(own) = node.number(counter)? {
            let children = children_sum(node, counter);
            node.set(&props::exclusive_key(counter), (own - children).max(0.0));
        }
    }

    Ok(())
}

/// Sums `key` over the direct children that are not InitPlans
fn children_sum(node: &Node, key: &str) -> f64 {
    node.plans
        .iter()
        .filter(|child| !child.is_init_plan())
        .map(|child| child.number_or_zero(key))
        .sum()
}
