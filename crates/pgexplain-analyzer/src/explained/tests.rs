//! Tests for the explain pipeline and the envelope

use super::*;
use crate::error::{ExplainError, ParseError};
use pretty_assertions::assert_eq;

const PLAN: &str = r#"[{
  "Plan": {
    "Node Type": "Gather",
    "Workers Planned": 2,
    "Workers Launched": 2,
    "Total Cost": 1200.0,
    "Plan Rows": 300,
    "Actual Total Time": 310.0,
    "Actual Rows": 300,
    "Actual Loops": 1,
    "Plans": [
      {
        "Node Type": "Seq Scan",
        "Parent Relationship": "Outer",
        "Parallel Aware": true,
        "Relation Name": "measurements",
        "Schema": "public",
        "Alias": "m",
        "Filter": "(value > 10)",
        "Rows Removed by Filter": 1000,
        "Total Cost": 1100.0,
        "Plan Rows": 125,
        "Actual Total Time": 300.0,
        "Actual Rows": 100,
        "Actual Loops": 3
      }
    ]
  },
  "Planning Time": 0.3,
  "Triggers": [],
  "Execution Time": 312.0
}]"#;

#[test]
fn test_explain_runs_every_stage() {
    let explained = explain(PLAN).unwrap();

    assert_eq!(explained.stats.nodes_count, 2);
    assert_eq!(explained.stats.execution_time, 312.0);
    assert_eq!(explained.summary.nodes.len(), 2);
    assert_eq!(explained.tables_stats[0].name, "public.measurements");
    assert_eq!(explained.nodes_stats.len(), 2);
    assert!(explained.indexes_stats.is_empty());
    assert!(explained.triggers_stats.is_empty());
    assert_eq!(explained.jit_stats, None);

    // 300 ms x 3 loops over 2 workers plus the leader
    let scan = &explained.summary.nodes[1];
    assert_eq!(scan.total_time, 300.0);
    assert_eq!(scan.actual_rows, 300.0);
    assert_eq!(explained.summary.nodes[0].exclusive_time, 10.0);
}

#[test]
fn test_summary_agrees_with_stats_maxima() {
    let explained = explain(PLAN).unwrap();

    for id in &explained.summary.slowest {
        assert_eq!(
            explained.summary.nodes[*id].exclusive_time,
            explained.stats.max_duration
        );
    }
    for id in &explained.summary.costliest {
        assert_eq!(
            explained.summary.nodes[*id].exclusive_cost,
            explained.stats.max_cost
        );
    }
    assert!(!explained.summary.slowest.is_empty());
}

#[test]
fn test_json_round_trip() {
    let explained = explain(PLAN).unwrap();

    let json = explained.to_json().unwrap();
    let decoded = Explained::from_json(&json).unwrap();
    assert_eq!(decoded, explained);
    assert_eq!(decoded.to_json().unwrap(), json);
}

#[test]
fn test_json_round_trip_keeps_derived_ratios_exact() {
    for i in 0..500 {
        let total_time = f64::from(i) * 0.0137 + 0.001;
        let execution_time = f64::from(i) * 0.0291 + 0.07;
        let raw = format!(
            r#"[{{"Plan": {{"Node Type": "Seq Scan", "Relation Name": "events",
                "Total Cost": 12.5, "Plan Rows": 7, "Actual Rows": 3,
                "Actual Loops": 3, "Actual Total Time": {total_time}}},
                "Planning Time": 0.1234, "Execution Time": {execution_time}}}]"#
        );
        let explained = explain(&raw).unwrap();

        let json = explained.to_json().unwrap();
        let decoded = Explained::from_json(&json).unwrap();
        assert_eq!(decoded, explained, "plan {i}");
        assert_eq!(decoded.to_json().unwrap(), json, "plan {i}");
        assert!(crate::compare(&explained, &decoded).unwrap().is_unchanged());
    }
}

#[test]
fn test_overflowing_rollups_stay_loadable() {
    let raw = r#"[{"Plan": {
        "Node Type": "Append", "Total Cost": 1e308, "Plan Rows": 2,
        "Actual Total Time": 1.0, "Actual Rows": 2, "Actual Loops": 1,
        "Plans": [
            {"Node Type": "Seq Scan", "Parent Relationship": "Member",
             "Relation Name": "t", "Total Cost": 1e308, "Plan Rows": 1,
             "Actual Total Time": 0.5, "Actual Rows": 1, "Actual Loops": 1},
            {"Node Type": "Seq Scan", "Parent Relationship": "Member",
             "Relation Name": "t", "Total Cost": 1e308, "Plan Rows": 1,
             "Actual Total Time": 0.5, "Actual Rows": 1, "Actual Loops": 1}
        ]
    }, "Execution Time": 1.2}]"#;
    let explained = explain(raw).unwrap();

    assert_eq!(explained.tables_stats[0].exclusive_cost, f64::MAX);
    let seq_scans = explained
        .nodes_stats
        .iter()
        .find(|stats| stats.node_type == "Seq Scan")
        .unwrap();
    assert_eq!(seq_scans.exclusive_cost, f64::MAX);
    assert_eq!(explained.stats.max_cost, 1e308);

    let decoded = Explained::from_json(&explained.to_json().unwrap()).unwrap();
    assert_eq!(decoded, explained);
    assert!(crate::compare(&explained, &decoded).unwrap().is_unchanged());
}

#[test]
fn test_envelope_keys() {
    let json = explain(PLAN).unwrap().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();

    assert_eq!(
        keys,
        vec![
            "summary",
            "stats",
            "indexes_stats",
            "tables_stats",
            "nodes_stats",
            "jit_stats",
            "triggers_stats",
        ]
    );
}

#[test]
fn test_from_json_tolerates_missing_sections() {
    let decoded = Explained::from_json("{}").unwrap();
    assert_eq!(decoded, Explained::default());
    assert_eq!(decoded.summary.performance_score, 100);

    assert!(Explained::from_json("[1, 2]").is_err());
}

#[test]
fn test_explain_errors_carry_their_stage() {
    let err = explain("not a plan").unwrap_err();
    assert!(matches!(err, ExplainError::Parse(ParseError::InvalidJson(_))));
    assert_eq!(err.kind(), "parse_error");

    let err = explain(r#"[{"Plan": {"Node Type": "Result", "Actual Loops": "many"}}]"#).unwrap_err();
    assert_eq!(err.kind(), "analysis_error");
    assert_eq!(
        err.to_string(),
        "Node 'Result' has field 'Actual Loops' that is not a number"
    );
}
