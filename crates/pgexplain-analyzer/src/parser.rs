//! PostgreSQL EXPLAIN Document Parser
//!
//! Decodes the output of `EXPLAIN (ANALYZE, COSTS, VERBOSE, BUFFERS, FORMAT JSON)`
//! into a root [`Node`] and the document-level sections (timings, triggers,
//! JIT) that describe the whole statement rather than any single operator.
//!
//! # Examples
//!
//! ```
//! use pgexplain_analyzer::parser::{parse_document_sections, parse_root};
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100
//!     },
//!     "Planning Time": 0.1,
//!     "Execution Time": 2.5
//!   }
//! ]"#;
//!
//! let root = parse_root(json_output).unwrap();
//! assert_eq!(root.node_type, "Seq Scan");
//!
//! let sections = parse_document_sections(json_output).unwrap();
//! assert_eq!(sections.execution_time(), 2.5);
//! ```

use crate::error::ParseError;
use crate::plan::Node;
use crate::props;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Maximum number of nested operators accepted in a plan
pub const MAX_PLAN_DEPTH: usize = 256;

/// Result type for EXPLAIN parsing
pub type Result<T> = std::result::Result<T, ParseError>;

/// Statement-level sections of an EXPLAIN document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocumentSections {
    #[serde(rename = "Planning Time", default)]
    pub planning_time: Option<f64>,
    #[serde(rename = "Execution Time", default)]
    pub execution_time: Option<f64>,
    /// Reported instead of `Execution Time` by servers older than 9.4
    #[serde(rename = "Total Runtime", default)]
    pub total_runtime: Option<f64>,
    #[serde(rename = "Triggers", default)]
    pub triggers: Vec<TriggerSection>,
    #[serde(rename = "JIT", default)]
    pub jit: Option<JitSection>,
}

impl DocumentSections {
    /// Planning time in milliseconds, zero when not reported
    pub fn planning_time(&self) -> f64 {
        self.planning_time.unwrap_or(0.0)
    }

    /// Execution time in milliseconds, zero when not reported
    pub fn execution_time(&self) -> f64 {
        self.execution_time.or(self.total_runtime).unwrap_or(0.0)
    }
}

/// One entry of the `Triggers` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TriggerSection {
    #[serde(rename = "Trigger Name", default)]
    pub trigger_name: String,
    #[serde(rename = "Constraint Name", default)]
    pub constraint_name: Option<String>,
    #[serde(rename = "Relation", default)]
    pub relation: Option<String>,
    #[serde(rename = "Time", default)]
    pub time: f64,
    #[serde(rename = "Calls", default)]
    pub calls: f64,
}

/// The `JIT` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JitSection {
    #[serde(rename = "Functions", default)]
    pub functions: u64,
    #[serde(rename = "Options", default)]
    pub options: JitOptions,
    #[serde(rename = "Timing", default)]
    pub timing: JitTiming,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JitOptions {
    #[serde(rename = "Inlining", default)]
    pub inlining: bool,
    #[serde(rename = "Optimization", default)]
    pub optimization: bool,
    #[serde(rename = "Expressions", default)]
    pub expressions: bool,
    #[serde(rename = "Deforming", default)]
    pub deforming: bool,
}

/// JIT phase timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JitTiming {
    #[serde(rename = "Generation", default, deserialize_with = "phase_time")]
    pub generation: f64,
    #[serde(rename = "Inlining", default, deserialize_with = "phase_time")]
    pub inlining: f64,
    #[serde(rename = "Optimization", default, deserialize_with = "phase_time")]
    pub optimization: f64,
    #[serde(rename = "Emission", default, deserialize_with = "phase_time")]
    pub emission: f64,
    #[serde(rename = "Total", default, deserialize_with = "phase_time")]
    pub total: f64,
}

/// Newer servers report some phases as `{"Deform": .., "Total": ..}`
fn phase_time<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Phase {
        Plain(f64),
        Detailed {
            #[serde(rename = "Total")]
            total: f64,
        },
    }

    Ok(match Phase::deserialize(deserializer)? {
        Phase::Plain(ms) => ms,
        Phase::Detailed { total } => total,
    })
}

/// Decodes the top `Plan` node of an EXPLAIN document
pub fn parse_root(raw: &str) -> Result<Node> {
    let mut document = parse_document(raw)?;
    let plan = take_plan(&mut document)?;
    parse_plan_node(plan, 1)
}

/// Extracts the statement-level sections of an EXPLAIN document
pub fn parse_document_sections(raw: &str) -> Result<DocumentSections> {
    let mut document = parse_document(raw)?;
    take_plan(&mut document)?;
    parse_sections(document)
}

/// Decodes both the root node and the document sections from one pass
pub fn parse_explain(raw: &str) -> Result<(Node, DocumentSections)> {
    let mut document = parse_document(raw)?;
    let plan = take_plan(&mut document)?;
    let root = parse_plan_node(plan, 1)?;
    let sections = parse_sections(document)?;
    Ok((root, sections))
}

/// Returns the statement object, unwrapping the single-element array
/// PostgreSQL wraps it in
fn parse_document(raw: &str) -> Result<serde_json::Map<String, Value>> {
    let value: Value = serde_json::from_str(raw.trim())?;

    let statement = match value {
        Value::Array(items) => items.into_iter().next().ok_or(ParseError::MissingPlan)?,
        other => other,
    };

    match statement {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::MissingPlan),
    }
}

fn take_plan(document: &mut serde_json::Map<String, Value>) -> Result<Value> {
    document.remove(props::PLAN).ok_or(ParseError::MissingPlan)
}

fn parse_sections(document: serde_json::Map<String, Value>) -> Result<DocumentSections> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| ParseError::InvalidStructure(format!("Invalid document section: {e}")))
}

/// Parses a single plan node from JSON
fn parse_plan_node(value: Value, depth: usize) -> Result<Node> {
    if depth > MAX_PLAN_DEPTH {
        return Err(ParseError::TooDeep {
            limit: MAX_PLAN_DEPTH,
        });
    }

    let Value::Object(map) = value else {
        return Err(ParseError::InvalidStructure(
            "Plan node is not an object".into(),
        ));
    };

    let mut node_type = None;
    let mut node = Node::default();

    for (key, val) in map {
        match key.as_str() {
            props::NODE_TYPE => match val {
                Value::String(s) => node_type = Some(s),
                _ => {
                    return Err(ParseError::InvalidStructure(
                        "Node Type is not a string".into(),
                    ));
                }
            },
            props::PLANS => {
                let Value::Array(children) = val else {
                    return Err(ParseError::InvalidStructure("Plans is not an array".into()));
                };
                node.plans.reserve(children.len());
                for child in children {
                    node.plans.push(parse_plan_node(child, depth + 1)?);
                }
            }
            _ => {
                node.props.insert(key, val);
            }
        }
    }

    node.node_type =
        node_type.ok_or_else(|| ParseError::InvalidStructure("Missing Node Type".into()))?;

    Ok(node)
}
