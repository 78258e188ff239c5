//! Tests for the comparator

use super::*;
use crate::explained::explain;
use crate::stats::Stats;
use pretty_assertions::assert_eq;

const SEQ_SCAN_PLAN: &str = r#"[{"Plan": {
    "Node Type": "Limit", "Total Cost": 100.0, "Plan Rows": 10,
    "Actual Total Time": 50.0, "Actual Rows": 10, "Actual Loops": 1,
    "Plans": [
        {"Node Type": "Seq Scan", "Parent Relationship": "Outer",
         "Relation Name": "orders", "Filter": "(user_id = 42)",
         "Rows Removed by Filter": 99990, "Total Cost": 95.0, "Plan Rows": 10,
         "Actual Total Time": 48.0, "Actual Rows": 10, "Actual Loops": 1,
         "Shared Hit Blocks": 100, "Shared Read Blocks": 900}
    ]
}, "Planning Time": 0.5, "Execution Time": 50.0}]"#;

const INDEX_SCAN_PLAN: &str = r#"[{"Plan": {
    "Node Type": "Limit", "Total Cost": 10.0, "Plan Rows": 10,
    "Actual Total Time": 2.0, "Actual Rows": 10, "Actual Loops": 1,
    "Plans": [
        {"Node Type": "Index Scan", "Parent Relationship": "Outer",
         "Relation Name": "orders", "Index Name": "orders_user_idx",
         "Index Cond": "(user_id = 42)", "Total Cost": 8.0, "Plan Rows": 10,
         "Actual Total Time": 1.5, "Actual Rows": 10, "Actual Loops": 1,
         "Shared Hit Blocks": 4}
    ]
}, "Planning Time": 0.5, "Execution Time": 2.0}]"#;

fn explained(raw: &str) -> Explained {
    explain(raw).expect("explain failed")
}

#[test]
fn test_compare_identical_plans_is_all_zero() {
    for raw in [SEQ_SCAN_PLAN, INDEX_SCAN_PLAN] {
        let plan = explained(raw);
        let comparison = compare(&plan, &plan).unwrap();

        assert!(comparison.is_unchanged());
        assert_eq!(comparison.nodes.len(), plan.summary.nodes.len());
        assert!(comparison.added_nodes.is_empty());
        assert!(comparison.removed_nodes.is_empty());
        for node in &comparison.nodes {
            assert_eq!(node.total_time.diff, 0.0);
            assert_eq!(node.exclusive_cost.diff, 0.0);
            assert_eq!(node.actual_rows.diff, 0.0);
        }
        assert_eq!(comparison.plan.execution_time.diff, 0.0);
    }
}

#[test]
fn test_compare_seq_scan_replaced_by_index_scan() {
    let comparison = compare(&explained(SEQ_SCAN_PLAN), &explained(INDEX_SCAN_PLAN)).unwrap();

    assert!(!comparison.is_unchanged());
    assert_eq!(comparison.plan.execution_time, Delta::new(50.0, 2.0));
    assert_eq!(comparison.plan.execution_time.diff, -48.0);
    assert_eq!(comparison.plan.planning_time.diff, 0.0);
    assert_eq!(comparison.plan.total_cost.diff, -90.0);

    assert_eq!(comparison.nodes.len(), 1);
    let limit = &comparison.nodes[0];
    assert_eq!(limit.before.node_type, "Limit");
    assert_eq!(limit.matched_by, MatchKind::Position);
    assert_eq!(limit.total_time.diff, -48.0);

    assert_eq!(
        comparison.removed_nodes,
        vec![NodeRef {
            id: 1,
            path: "0.0".to_string(),
            node_type: "Seq Scan".to_string(),
            identity: Some("orders".to_string()),
        }]
    );
    assert_eq!(comparison.added_nodes.len(), 1);
    assert_eq!(comparison.added_nodes[0].node_type, "Index Scan");

    assert_eq!(comparison.tables.len(), 1);
    let orders = &comparison.tables[0];
    assert_eq!(orders.name, "orders");
    assert_eq!(orders.exclusive_time.diff, -46.5);
    assert_eq!(orders.shared_read_blocks, Delta::new(900.0, 0.0));
    assert!(comparison.added_tables.is_empty());

    assert!(comparison.indexes.is_empty());
    assert_eq!(comparison.added_indexes, vec!["orders_user_idx".to_string()]);
    assert!(comparison.removed_indexes.is_empty());
}

#[test]
fn test_identity_match_survives_reordering() {
    let before = r#"[{"Plan": {"Node Type": "Hash Join", "Total Cost": 30.0, "Plans": [
        {"Node Type": "Seq Scan", "Relation Name": "a", "Total Cost": 10.0},
        {"Node Type": "Hash", "Total Cost": 12.0, "Plans": [
            {"Node Type": "Seq Scan", "Relation Name": "b", "Total Cost": 12.0}
        ]}
    ]}}]"#;
    let after = r#"[{"Plan": {"Node Type": "Hash Join", "Total Cost": 28.0, "Plans": [
        {"Node Type": "Seq Scan", "Relation Name": "b", "Total Cost": 12.0},
        {"Node Type": "Hash", "Total Cost": 10.0, "Plans": [
            {"Node Type": "Seq Scan", "Relation Name": "a", "Total Cost": 10.0}
        ]}
    ]}}]"#;
    let comparison = compare(&explained(before), &explained(after)).unwrap();

    let pairs: Vec<_> = comparison
        .nodes
        .iter()
        .map(|n| (n.before.path.as_str(), n.after.path.as_str(), n.matched_by))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("0", "0", MatchKind::Position),
            ("0.0", "0.1.0", MatchKind::Identity),
            ("0.1", "0.1", MatchKind::Position),
            ("0.1.0", "0.0", MatchKind::Identity),
        ]
    );
    assert!(comparison.added_nodes.is_empty());
    assert!(comparison.removed_nodes.is_empty());
    assert_eq!(comparison.nodes[0].total_cost.diff, -2.0);
}

#[test]
fn test_duplicate_identity_falls_back_to_position() {
    let raw = r#"[{"Plan": {"Node Type": "Nested Loop", "Total Cost": 20.0, "Plans": [
        {"Node Type": "Seq Scan", "Relation Name": "t", "Total Cost": 5.0},
        {"Node Type": "Seq Scan", "Relation Name": "t", "Total Cost": 5.0}
    ]}}]"#;
    let plan = explained(raw);
    let comparison = compare(&plan, &plan).unwrap();

    assert!(comparison.is_unchanged());
    assert!(
        comparison
            .nodes
            .iter()
            .all(|n| n.matched_by == MatchKind::Position && n.before.path == n.after.path)
    );
}

#[test]
fn test_unanalyzed_inputs_are_rejected() {
    let plan = explained(SEQ_SCAN_PLAN);
    let empty = Explained::default();

    assert_eq!(
        compare(&empty, &plan),
        Err(ComparisonError::MissingStats { side: Side::Before })
    );
    assert_eq!(
        compare(&plan, &empty),
        Err(ComparisonError::MissingStats { side: Side::After })
    );

    let hollow = Explained {
        stats: Stats {
            nodes_count: 1,
            ..Stats::default()
        },
        ..Explained::default()
    };
    assert_eq!(
        compare(&plan, &hollow),
        Err(ComparisonError::EmptyPlan { side: Side::After })
    );
}

#[test]
fn test_delta_percent() {
    assert_eq!(Delta::new(50.0, 25.0).percent(), -50.0);
    assert_eq!(Delta::new(0.0, 25.0).percent(), 0.0);
    assert!(Delta::new(3.0, 3.0).is_zero());
}
