use super::*;

const BEFORE: &str = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "orders",
    "Schema": "public", "Alias": "o", "Filter": "(status = 'open'::text)",
    "Startup Cost": 0.0, "Total Cost": 1800.0, "Plan Rows": 10, "Plan Width": 8,
    "Actual Startup Time": 0.01, "Actual Total Time": 40.0,
    "Actual Rows": 5000, "Actual Loops": 1, "Rows Removed by Filter": 95000},
    "Planning Time": 0.5, "Execution Time": 41.0}]"#;

const AFTER: &str = r#"[{"Plan": {"Node Type": "Index Scan", "Relation Name": "orders",
    "Schema": "public", "Alias": "o", "Index Name": "idx_orders_status",
    "Index Cond": "(status = 'open'::text)",
    "Startup Cost": 0.29, "Total Cost": 210.0, "Plan Rows": 5000, "Plan Width": 8,
    "Actual Startup Time": 0.02, "Actual Total Time": 4.0,
    "Actual Rows": 5000, "Actual Loops": 1},
    "Planning Time": 0.4, "Execution Time": 4.5}]"#;

fn options(format: OutputFormat, pretty: bool) -> RenderOptions {
    RenderOptions {
        format,
        pretty,
        top_nodes: 10,
    }
}

mod explained {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compact_json_round_trips() {
        let explained = pgexplain_analyzer::explain(BEFORE).unwrap();
        let rendered = render_explained(&explained, options(OutputFormat::Json, false)).unwrap();

        assert!(!rendered.contains('\n'));
        assert_eq!(Explained::from_json(&rendered).unwrap(), explained);
    }

    #[test]
    fn test_pretty_json_is_indented() {
        let explained = pgexplain_analyzer::explain(BEFORE).unwrap();
        let rendered = render_explained(&explained, options(OutputFormat::Json, true)).unwrap();

        assert!(rendered.starts_with("{\n  \"summary\""));
        assert_eq!(Explained::from_json(&rendered).unwrap(), explained);
    }

    #[test]
    fn test_tables_show_overview_and_findings() {
        let explained = pgexplain_analyzer::explain(BEFORE).unwrap();
        let rendered = render_explained(&explained, options(OutputFormat::Table, false)).unwrap();

        assert!(rendered.contains("Execution time"));
        assert!(rendered.contains("41.000 ms"));
        assert!(rendered.contains("Seq Scan on public.orders"));
        assert!(rendered.contains("public.orders"));
        assert!(rendered.contains(&explained.summary.verdict));
        assert!(rendered.contains("critical"));
    }

    #[test]
    fn test_top_nodes_limits_rows() {
        let explained = pgexplain_analyzer::explain(BEFORE).unwrap();
        let mut opts = options(OutputFormat::Table, false);
        opts.top_nodes = 0;
        let rendered = render_explained(&explained, opts).unwrap();

        assert!(!rendered.contains("Seq Scan on public.orders"));
    }
}

mod comparison {
    use super::*;
    use pretty_assertions::assert_eq;

    fn comparison() -> Comparison {
        let before = pgexplain_analyzer::explain(BEFORE).unwrap();
        let after = pgexplain_analyzer::explain(AFTER).unwrap();
        pgexplain_analyzer::compare(&before, &after).unwrap()
    }

    #[test]
    fn test_json_matches_serialized_comparison() {
        let comparison = comparison();
        let rendered = render_comparison(&comparison, options(OutputFormat::Json, false)).unwrap();

        assert_eq!(rendered, serde_json::to_string(&comparison).unwrap());
    }

    #[test]
    fn test_tables_show_deltas_and_index_changes() {
        let rendered = render_comparison(&comparison(), options(OutputFormat::Table, false)).unwrap();

        assert!(rendered.contains("Execution time"));
        assert!(rendered.contains("41.000 ms"));
        assert!(rendered.contains("4.500 ms"));
        assert!(rendered.contains("+ index idx_orders_status"));
    }

    #[test]
    fn test_self_comparison_renders_without_changes() {
        let explained = pgexplain_analyzer::explain(BEFORE).unwrap();
        let comparison = pgexplain_analyzer::compare(&explained, &explained).unwrap();
        let rendered = render_comparison(&comparison, options(OutputFormat::Table, false)).unwrap();

        assert!(!rendered.contains("removed"));
        assert!(!rendered.contains("+ index"));
        assert!(rendered.contains("0.000 ms"));
    }
}
