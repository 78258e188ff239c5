//! Tests for the stats rollups

use super::*;
use crate::enricher::analyze;
use crate::parser::parse_explain;
use pretty_assertions::assert_eq;

const BITMAP_PLAN: &str = r#"[
  {
    "Plan": {
      "Node Type": "Nested Loop",
      "Join Type": "Inner",
      "Total Cost": 100.0,
      "Plan Rows": 5,
      "Actual Total Time": 10.0,
      "Actual Rows": 5,
      "Actual Loops": 1,
      "Plans": [
        {
          "Node Type": "Bitmap Heap Scan",
          "Parent Relationship": "Outer",
          "Relation Name": "orders",
          "Schema": "public",
          "Alias": "o",
          "Total Cost": 40.0,
          "Plan Rows": 5,
          "Actual Total Time": 4.0,
          "Actual Rows": 5,
          "Actual Loops": 1,
          "Shared Hit Blocks": 10,
          "Shared Read Blocks": 2,
          "Plans": [
            {
              "Node Type": "Bitmap Index Scan",
              "Parent Relationship": "Outer",
              "Index Name": "idx_orders_user",
              "Index Cond": "(user_id = 1)",
              "Total Cost": 5.0,
              "Plan Rows": 5,
              "Actual Total Time": 1.0,
              "Actual Rows": 5,
              "Actual Loops": 1,
              "Shared Hit Blocks": 3
            }
          ]
        },
        {
          "Node Type": "Index Scan",
          "Parent Relationship": "Inner",
          "Relation Name": "users",
          "Alias": "u",
          "Index Name": "idx_users_pkey",
          "Index Cond": "(id = o.user_id)",
          "Total Cost": 2.0,
          "Plan Rows": 1,
          "Actual Total Time": 0.5,
          "Actual Rows": 1,
          "Actual Loops": 5,
          "Shared Hit Blocks": 15
        }
      ]
    },
    "Planning Time": 0.4,
    "Triggers": [
      {"Trigger Name": "audit_orders", "Relation": "orders", "Time": 1.5, "Calls": 3},
      {"Trigger Name": "RI_ConstraintTrigger_c_1", "Constraint Name": "orders_user_fk", "Relation": "orders", "Time": 4.0, "Calls": 0}
    ],
    "JIT": {
      "Functions": 6,
      "Options": {"Inlining": true, "Optimization": true, "Expressions": true, "Deforming": false},
      "Timing": {"Generation": 0.5, "Inlining": 0.5, "Optimization": 1.0, "Emission": 1.0, "Total": 3.0}
    },
    "Execution Time": 20.0
  }
]"#;

fn analyzed(raw: &str) -> (Node, StatsGather) {
    let (mut root, sections) = parse_explain(raw).expect("parse failed");
    analyze(&mut root).expect("analysis failed");
    (root, StatsGather::new(sections))
}

#[test]
fn test_compute_stats() {
    let (root, gather) = analyzed(BITMAP_PLAN);
    let stats = gather.compute_stats(&root);

    assert_eq!(
        stats,
        Stats {
            execution_time: 20.0,
            planning_time: 0.4,
            trigger_time: 5.5,
            jit_time: 3.0,
            max_rows: 5.0,
            max_cost: 58.0,
            max_duration: 4.5,
            nodes_count: 4,
            ctes_count: 0,
            shared_hit_blocks: 25.0,
            shared_read_blocks: 2.0,
            temp_read_blocks: 0.0,
            temp_written_blocks: 0.0,
        }
    );
}

#[test]
fn test_tables_stats_sum_exclusive_figures() {
    let (root, gather) = analyzed(BITMAP_PLAN);
    let tables = gather.compute_tables_stats(&root);

    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["public.orders", "users"]);

    let orders = &tables[0];
    assert_eq!(orders.node_types, vec!["Bitmap Heap Scan".to_string()]);
    assert_eq!(orders.scans, 1);
    assert_eq!(orders.seq_scans, 0);
    assert_eq!(orders.index_scans, 1);
    assert_eq!(orders.exclusive_time, 3.0);
    assert_eq!(orders.exclusive_cost, 35.0);
    assert_eq!(orders.time_percent, 15.0);
    assert_eq!(orders.shared_hit_blocks, 7.0);
    assert_eq!(orders.shared_read_blocks, 2.0);

    let users = &tables[1];
    assert_eq!(users.exclusive_time, 2.5);
    assert_eq!(users.actual_rows, 5.0);
    assert_eq!(users.time_percent, 12.5);
    assert_eq!(users.shared_hit_blocks, 15.0);
}

#[test]
fn test_indexes_stats_resolve_bitmap_relation() {
    let (root, gather) = analyzed(BITMAP_PLAN);
    let indexes = gather.compute_indexes_stats(&root);

    let names: Vec<_> = indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["idx_users_pkey", "idx_orders_user"]);

    let bitmap = &indexes[1];
    assert_eq!(bitmap.relation.as_deref(), Some("public.orders"));
    assert_eq!(bitmap.node_types, vec!["Bitmap Index Scan".to_string()]);
    assert_eq!(bitmap.conditions, vec!["(user_id = 1)".to_string()]);
    assert_eq!(bitmap.scans, 1);
    assert_eq!(bitmap.exclusive_time, 1.0);
    assert_eq!(bitmap.time_percent, 5.0);

    assert_eq!(indexes[0].relation.as_deref(), Some("users"));
    assert_eq!(indexes[0].actual_rows, 5.0);
}

#[test]
fn test_nodes_stats_ordered_by_exclusive_time() {
    let (root, gather) = analyzed(BITMAP_PLAN);
    let nodes = gather.compute_nodes_stats(&root);

    let order: Vec<_> = nodes
        .iter()
        .map(|n| (n.node_type.as_str(), n.exclusive_time))
        .collect();
    assert_eq!(
        order,
        vec![
            ("Nested Loop", 4.5),
            ("Bitmap Heap Scan", 3.0),
            ("Index Scan", 2.5),
            ("Bitmap Index Scan", 1.0),
        ]
    );
    assert!(nodes.iter().all(|n| n.count == 1));
}

#[test]
fn test_jit_and_trigger_stats() {
    let (_, gather) = analyzed(BITMAP_PLAN);

    let jit = gather.compute_jit_stats().expect("jit stats");
    assert_eq!(jit.functions, 6);
    assert!(jit.inlining);
    assert!(!jit.deforming);
    assert_eq!(jit.total_time, 3.0);
    assert_eq!(jit.time_percent, 15.0);

    let triggers = gather.compute_triggers_stats();
    assert_eq!(
        triggers,
        vec![
            TriggerStats {
                name: "RI_ConstraintTrigger_c_1".to_string(),
                relation: Some("orders".to_string()),
                constraint_name: Some("orders_user_fk".to_string()),
                calls: 0.0,
                time: 4.0,
                average_time: 0.0,
                time_percent: 20.0,
            },
            TriggerStats {
                name: "audit_orders".to_string(),
                relation: Some("orders".to_string()),
                constraint_name: None,
                calls: 3.0,
                time: 1.5,
                average_time: 0.5,
                time_percent: 7.5,
            },
        ]
    );
}

#[test]
fn test_ties_keep_first_seen_order() {
    let raw = r#"[{"Plan": {
        "Node Type": "Append", "Total Cost": 20.0,
        "Plans": [
            {"Node Type": "Seq Scan", "Relation Name": "b_events", "Total Cost": 10.0},
            {"Node Type": "Seq Scan", "Relation Name": "a_events", "Total Cost": 10.0},
            {"Node Type": "Seq Scan", "Relation Name": "b_events", "Total Cost": 0.0}
        ]
    }}]"#;
    let (root, gather) = analyzed(raw);
    let tables = gather.compute_tables_stats(&root);

    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["b_events", "a_events"]);
    assert_eq!(tables[0].scans, 2);
    assert_eq!(tables[0].seq_scans, 2);
}

#[test]
fn test_plan_without_timings_has_no_nan() {
    let raw = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users", "Index Name": "x", "Total Cost": 5.0}}]"#;
    let (root, gather) = analyzed(raw);

    let stats = gather.compute_stats(&root);
    assert_eq!(stats.execution_time, 0.0);
    assert_eq!(stats.max_duration, 0.0);

    let tables = gather.compute_tables_stats(&root);
    assert_eq!(tables[0].time_percent, 0.0);
    assert!(gather.compute_indexes_stats(&root)[0].time_percent.is_finite());
    assert_eq!(gather.compute_jit_stats(), None);
    assert!(gather.compute_triggers_stats().is_empty());
}

#[test]
fn test_cte_nodes_are_counted() {
    let raw = r#"[{"Plan": {
        "Node Type": "CTE Scan", "CTE Name": "recent", "Total Cost": 12.0,
        "Plans": [
            {"Node Type": "Seq Scan", "Parent Relationship": "InitPlan",
             "Subplan Name": "CTE recent", "Relation Name": "events", "Total Cost": 10.0}
        ]
    }}]"#;
    let (root, gather) = analyzed(raw);
    let stats = gather.compute_stats(&root);

    assert_eq!(stats.ctes_count, 1);
    assert_eq!(stats.nodes_count, 2);
    assert_eq!(gather.compute_tables_stats(&root)[0].name, "events");
}

#[test]
fn test_from_plan_reads_sections() {
    let gather = StatsGather::from_plan(BITMAP_PLAN).expect("parse failed");
    assert_eq!(gather.sections().triggers.len(), 2);
    assert!(StatsGather::from_plan("nope").is_err());
}

#[test]
fn test_percent_of() {
    assert_eq!(percent_of(5.0, 20.0), 25.0);
    assert_eq!(percent_of(5.0, 0.0), 0.0);
    assert_eq!(percent_of(f64::NAN, 10.0), 0.0);
}

#[test]
fn test_finite_saturates() {
    assert_eq!(finite(f64::INFINITY), f64::MAX);
    assert_eq!(finite(f64::NEG_INFINITY), f64::MIN);
    assert_eq!(finite(f64::NAN), 0.0);
    assert_eq!(finite(42.5), 42.5);
    assert_eq!(percent_of(f64::MAX, 0.5), f64::MAX);
}
