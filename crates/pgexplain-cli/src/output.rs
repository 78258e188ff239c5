//! Rendering of analysis results

use crate::config::OutputFormat;
use anyhow::Result;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use pgexplain_analyzer::compare::{Comparison, Delta};
use pgexplain_analyzer::{Explained, SummaryNode};
use serde::Serialize;

/// Output options resolved from flags and config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub top_nodes: usize,
}

pub fn render_explained(explained: &Explained, options: RenderOptions) -> Result<String> {
    match options.format {
        OutputFormat::Json => to_json(explained, options.pretty),
        OutputFormat::Table => Ok(explained_tables(explained, options.top_nodes)),
    }
}

pub fn render_comparison(comparison: &Comparison, options: RenderOptions) -> Result<String> {
    match options.format {
        OutputFormat::Json => to_json(comparison, options.pretty),
        OutputFormat::Table => Ok(comparison_tables(comparison)),
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// Wrap width for table cells, independent of the terminal
const TABLE_WIDTH: u16 = 160;

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(TABLE_WIDTH);
    table
}

fn ms(value: f64) -> String {
    format!("{value:.3} ms")
}

fn pct(value: f64) -> String {
    format!("{value:.1}%")
}

fn node_label(node: &SummaryNode) -> String {
    let mut label = node.node_type.clone();
    if let Some(identity) = node.identity() {
        label.push_str(" on ");
        label.push_str(identity);
    }
    if let Some(index) = &node.index_name {
        label.push_str(" using ");
        label.push_str(index);
    }
    if let Some(cte) = &node.cte {
        label.push_str(&format!(" [CTE {cte}]"));
    }
    label
}

fn explained_tables(explained: &Explained, top_nodes: usize) -> String {
    let stats = &explained.stats;
    let summary = &explained.summary;
    let mut sections = Vec::new();

    let mut overview = new_table();
    overview.set_header(vec!["Metric", "Value"]);
    overview.add_row(vec!["Execution time".to_string(), ms(stats.execution_time)]);
    overview.add_row(vec!["Planning time".to_string(), ms(stats.planning_time)]);
    if stats.trigger_time > 0.0 {
        overview.add_row(vec!["Trigger time".to_string(), ms(stats.trigger_time)]);
    }
    if stats.jit_time > 0.0 {
        overview.add_row(vec!["JIT time".to_string(), ms(stats.jit_time)]);
    }
    overview.add_row(vec!["Nodes".to_string(), stats.nodes_count.to_string()]);
    overview.add_row(vec!["CTEs".to_string(), stats.ctes_count.to_string()]);
    overview.add_row(vec![
        "Performance score".to_string(),
        format!("{}/100", summary.performance_score),
    ]);
    sections.push(overview.to_string());
    sections.push(summary.verdict.clone());

    let mut nodes: Vec<&SummaryNode> = summary.nodes.iter().collect();
    nodes.sort_by(|a, b| b.exclusive_time.total_cmp(&a.exclusive_time));
    let mut slowest = new_table();
    slowest.set_header(vec!["#", "Node", "Exclusive", "% of execution", "Rows", "Estimate"]);
    for node in nodes.into_iter().take(top_nodes) {
        slowest.add_row(vec![
            node.id.to_string(),
            node_label(node),
            ms(node.exclusive_time),
            pct(node.time_percent),
            node.actual_rows.to_string(),
            format!(
                "{} x{:.1}",
                node.estimate_direction.as_str(),
                node.estimate_factor
            ),
        ]);
    }
    sections.push(slowest.to_string());

    if !explained.tables_stats.is_empty() {
        let mut tables = new_table();
        tables.set_header(vec!["Table", "Scans", "Seq", "Index", "Exclusive", "Rows", "Shared read"]);
        for table in &explained.tables_stats {
            tables.add_row(vec![
                table.name.clone(),
                table.scans.to_string(),
                table.seq_scans.to_string(),
                table.index_scans.to_string(),
                ms(table.exclusive_time),
                table.actual_rows.to_string(),
                table.shared_read_blocks.to_string(),
            ]);
        }
        sections.push(tables.to_string());
    }

    if !explained.indexes_stats.is_empty() {
        let mut indexes = new_table();
        indexes.set_header(vec!["Index", "Table", "Scans", "Exclusive", "Conditions"]);
        for index in &explained.indexes_stats {
            indexes.add_row(vec![
                index.name.clone(),
                index.relation.clone().unwrap_or_default(),
                index.scans.to_string(),
                ms(index.exclusive_time),
                index.conditions.join("\n"),
            ]);
        }
        sections.push(indexes.to_string());
    }

    if !summary.findings.is_empty() {
        let mut findings = new_table();
        findings.set_header(vec!["Severity", "Finding", "Recommendation"]);
        for finding in &summary.findings {
            findings.add_row(vec![
                finding.severity.as_str().to_string(),
                finding.message.clone(),
                finding.recommendation.clone(),
            ]);
        }
        sections.push(findings.to_string());
    }

    sections.join("\n\n")
}

fn delta_row(label: &str, delta: &Delta, unit: fn(f64) -> String) -> Vec<String> {
    vec![
        label.to_string(),
        unit(delta.before),
        unit(delta.after),
        unit(delta.diff),
        pct(delta.percent()),
    ]
}

fn comparison_tables(comparison: &Comparison) -> String {
    let plain = |value: f64| value.to_string();
    let mut sections = Vec::new();

    let plan = &comparison.plan;
    let mut overview = new_table();
    overview.set_header(vec!["Metric", "Before", "After", "Change", "%"]);
    overview.add_row(delta_row("Execution time", &plan.execution_time, ms));
    overview.add_row(delta_row("Planning time", &plan.planning_time, ms));
    overview.add_row(delta_row("Total cost", &plan.total_cost, plain));
    overview.add_row(delta_row("Slowest node", &plan.max_duration, ms));
    overview.add_row(delta_row("Nodes", &plan.nodes_count, plain));
    overview.add_row(delta_row("Performance score", &plan.performance_score, plain));
    sections.push(overview.to_string());

    if !comparison.nodes.is_empty() {
        let mut nodes = new_table();
        nodes.set_header(vec!["Node", "Matched by", "Exclusive before", "Exclusive after", "Change"]);
        for node in &comparison.nodes {
            let label = match &node.before.identity {
                Some(identity) => format!("{} on {identity}", node.before.node_type),
                None => node.before.node_type.clone(),
            };
            nodes.add_row(vec![
                label,
                format!("{:?}", node.matched_by).to_lowercase(),
                ms(node.exclusive_time.before),
                ms(node.exclusive_time.after),
                ms(node.exclusive_time.diff),
            ]);
        }
        sections.push(nodes.to_string());
    }

    if !comparison.added_nodes.is_empty() || !comparison.removed_nodes.is_empty() {
        let mut changes = new_table();
        changes.set_header(vec!["Change", "Node", "Path"]);
        for node in &comparison.removed_nodes {
            changes.add_row(vec!["removed".to_string(), node.node_type.clone(), node.path.clone()]);
        }
        for node in &comparison.added_nodes {
            changes.add_row(vec!["added".to_string(), node.node_type.clone(), node.path.clone()]);
        }
        sections.push(changes.to_string());
    }

    if !comparison.tables.is_empty() {
        let mut tables = new_table();
        tables.set_header(vec!["Table", "Exclusive before", "Exclusive after", "Change"]);
        for table in &comparison.tables {
            tables.add_row(vec![
                table.name.clone(),
                ms(table.exclusive_time.before),
                ms(table.exclusive_time.after),
                ms(table.exclusive_time.diff),
            ]);
        }
        sections.push(tables.to_string());
    }

    let mut index_changes = Vec::new();
    index_changes.extend(comparison.added_indexes.iter().map(|name| format!("+ index {name}")));
    index_changes.extend(comparison.removed_indexes.iter().map(|name| format!("- index {name}")));
    if !index_changes.is_empty() {
        sections.push(index_changes.join("\n"));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests;
