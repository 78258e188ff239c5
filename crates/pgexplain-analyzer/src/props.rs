//! Property keys of EXPLAIN JSON nodes
//!
//! Keys prefixed with `*` are computed by the enricher and never produced
//! by PostgreSQL itself.

// Raw keys
pub const NODE_TYPE: &str = "Node Type";
pub const PLANS: &str = "Plans";
pub const PLAN: &str = "Plan";
pub const ACTUAL_ROWS: &str = "Actual Rows";
pub const PLAN_ROWS: &str = "Plan Rows";
pub const PLAN_WIDTH: &str = "Plan Width";
pub const ACTUAL_TOTAL_TIME: &str = "Actual Total Time";
pub const ACTUAL_STARTUP_TIME: &str = "Actual Startup Time";
pub const ACTUAL_LOOPS: &str = "Actual Loops";
pub const STARTUP_COST: &str = "Startup Cost";
pub const TOTAL_COST: &str = "Total Cost";
pub const RELATION_NAME: &str = "Relation Name";
pub const SCHEMA: &str = "Schema";
pub const ALIAS: &str = "Alias";
pub const INDEX_NAME: &str = "Index Name";
pub const INDEX_COND: &str = "Index Cond";
pub const JOIN_TYPE: &str = "Join Type";
pub const FILTER: &str = "Filter";
pub const ROWS_REMOVED_BY_FILTER: &str = "Rows Removed by Filter";
pub const ROWS_REMOVED_BY_JOIN_FILTER: &str = "Rows Removed by Join Filter";
pub const ROWS_REMOVED_BY_INDEX_RECHECK: &str = "Rows Removed by Index Recheck";
pub const PARENT_RELATIONSHIP: &str = "Parent Relationship";
pub const SUBPLAN_NAME: &str = "Subplan Name";
pub const CTE_NAME: &str = "CTE Name";
pub const FUNCTION_NAME: &str = "Function Name";
pub const WORKERS_PLANNED: &str = "Workers Planned";
pub const WORKERS_LAUNCHED: &str = "Workers Launched";
pub const SORT_METHOD: &str = "Sort Method";
pub const SORT_SPACE_TYPE: &str = "Sort Space Type";
pub const SORT_SPACE_USED: &str = "Sort Space Used";
pub const HEAP_FETCHES: &str = "Heap Fetches";

pub const SHARED_HIT_BLOCKS: &str = "Shared Hit Blocks";
pub const SHARED_READ_BLOCKS: &str = "Shared Read Blocks";
pub const SHARED_DIRTIED_BLOCKS: &str = "Shared Dirtied Blocks";
pub const SHARED_WRITTEN_BLOCKS: &str = "Shared Written Blocks";
pub const LOCAL_HIT_BLOCKS: &str = "Local Hit Blocks";
pub const LOCAL_READ_BLOCKS: &str = "Local Read Blocks";
pub const LOCAL_DIRTIED_BLOCKS: &str = "Local Dirtied Blocks";
pub const LOCAL_WRITTEN_BLOCKS: &str = "Local Written Blocks";
pub const TEMP_READ_BLOCKS: &str = "Temp Read Blocks";
pub const TEMP_WRITTEN_BLOCKS: &str = "Temp Written Blocks";
pub const IO_READ_TIME: &str = "I/O Read Time";
pub const IO_WRITE_TIME: &str = "I/O Write Time";

// Document-level keys
pub const PLANNING_TIME: &str = "Planning Time";
pub const EXECUTION_TIME: &str = "Execution Time";
pub const TOTAL_RUNTIME: &str = "Total Runtime";
pub const TRIGGERS: &str = "Triggers";
pub const JIT: &str = "JIT";

// Parent relationships
pub const INIT_PLAN: &str = "InitPlan";
pub const SUB_PLAN: &str = "SubPlan";

/// Subplan names of CTE-producing InitPlans start with this marker
pub const CTE_MARKER: &str = "CTE";

// Computed keys
pub const COSTLIEST_NODE: &str = "*Costliest Node (by cost)";
pub const LARGEST_NODE: &str = "*Largest Node (by rows)";
pub const SLOWEST_NODE: &str = "*Slowest Node (by duration)";

pub const MAXIMUM_COSTS: &str = "*Most Expensive Node (cost)";
pub const MAXIMUM_ROWS: &str = "*Largest Node (rows)";
pub const MAXIMUM_DURATION: &str = "*Slowest Node (time)";

pub const ACTUAL_DURATION: &str = "*Actual Duration";
pub const ACTUAL_COST: &str = "*Actual Cost";
pub const EXCLUSIVE_DURATION: &str = "*Duration (exclusive)";
pub const EXCLUSIVE_COST: &str = "*Cost (exclusive)";
pub const PLANNER_ESTIMATE_FACTOR: &str = "*Planner Row Estimate Factor";
pub const PLANNER_ESTIMATE_DIRECTION: &str = "*Planner Row Estimate Direction";
pub const WORKERS_PLANNED_BY_GATHER: &str = "*Workers Planned By Gather";
pub const IS_CTE_ROOT: &str = "*Is CTE Root";
pub const CTE_SUBPLAN_OF: &str = "*CTE Subplan Of";

/// Counters whose exclusive share is stored under `*<key> (exclusive)`
pub const EXCLUSIVE_COUNTERS: [&str; 12] = [
    SHARED_HIT_BLOCKS,
    SHARED_READ_BLOCKS,
    SHARED_DIRTIED_BLOCKS,
    SHARED_WRITTEN_BLOCKS,
    LOCAL_HIT_BLOCKS,
    LOCAL_READ_BLOCKS,
    LOCAL_DIRTIED_BLOCKS,
    LOCAL_WRITTEN_BLOCKS,
    TEMP_READ_BLOCKS,
    TEMP_WRITTEN_BLOCKS,
    IO_READ_TIME,
    IO_WRITE_TIME,
];

/// Row counters corrected by the loop count
pub const LOOP_SCALED_ROWS: [&str; 4] = [
    ACTUAL_ROWS,
    PLAN_ROWS,
    ROWS_REMOVED_BY_FILTER,
    ROWS_REMOVED_BY_JOIN_FILTER,
];

/// Key under which the exclusive share of `counter` is stored
pub fn exclusive_key(counter: &str) -> String {
    format!("*{counter} (exclusive)")
}
