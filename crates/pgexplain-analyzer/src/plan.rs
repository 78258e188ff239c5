//! Plan Node Model - Data structures for representing PostgreSQL plan trees
//!
//! A [`Node`] keeps the handful of fields the engine walks structurally
//! (node type, children, relocated CTEs) as typed fields and every other
//! EXPLAIN property in an ordered, open property bag, so version-specific
//! keys survive analysis untouched.

use crate::error::AnalysisError;
use crate::props;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One operator of a PostgreSQL plan tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Raw operator name, e.g. "Seq Scan"
    #[serde(rename = "Node Type")]
    pub node_type: String,
    /// Every other property, in document order
    #[serde(flatten)]
    pub props: IndexMap<String, Value>,
    /// Child operators
    #[serde(rename = "Plans", default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<Node>,
    /// CTE subtrees relocated by the enricher, keyed by CTE name (root only)
    #[serde(rename = "CTEs", default, skip_serializing_if = "IndexMap::is_empty")]
    pub ctes: IndexMap<String, Node>,
}

impl Node {
    /// Creates a node with the given raw node type
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Sets a property
    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Adds a child node
    pub fn with_child(mut self, child: Node) -> Self {
        self.plans.push(child);
        self
    }

    /// Returns the classified operator kind
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_postgres_str(&self.node_type)
    }

    /// Returns a property, treating JSON null as absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key).filter(|v| !v.is_null())
    }

    /// Sets a property; non-finite numbers are stored as null
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.props.insert(key.to_string(), value.into());
    }

    /// Reads a numeric property, failing if it holds another JSON type
    pub fn number(&self, key: &str) -> Result<Option<f64>, AnalysisError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(_) => Err(self.invalid(key, "number")),
        }
    }

    /// Reads a string property, failing if it holds another JSON type
    pub fn text(&self, key: &str) -> Result<Option<&str>, AnalysisError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "string")),
        }
    }

    /// Lenient numeric read for already-analyzed trees
    pub fn number_or_zero(&self, key: &str) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Lenient string read for already-analyzed trees
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Lenient boolean read, `false` when absent
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn relation(&self) -> Option<&str> {
        self.str_prop(props::RELATION_NAME)
    }

    pub fn alias(&self) -> Option<&str> {
        self.str_prop(props::ALIAS)
    }

    pub fn index_name(&self) -> Option<&str> {
        self.str_prop(props::INDEX_NAME)
    }

    pub fn parent_relationship(&self) -> Option<&str> {
        self.str_prop(props::PARENT_RELATIONSHIP)
    }

    /// Returns true if this node hangs off its parent as an InitPlan
    pub fn is_init_plan(&self) -> bool {
        self.parent_relationship() == Some(props::INIT_PLAN)
    }

    /// Returns the schema-qualified relation name, if any
    pub fn qualified_relation(&self) -> Option<String> {
        let relation = self.relation()?;
        Some(match self.str_prop(props::SCHEMA) {
            Some(schema) => format!("{schema}.{relation}"),
            None => relation.to_string(),
        })
    }

    /// Returns an iterator over this subtree and its relocated CTEs (depth-first)
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter::new(self)
    }

    /// Returns the total number of nodes in this subtree, CTEs included
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if this is a leaf node (no children)
    pub fn is_leaf(&self) -> bool {
        self.plans.is_empty()
    }

    fn invalid(&self, field: &str, expected: &'static str) -> AnalysisError {
        AnalysisError::InvalidField {
            node_type: self.node_type.clone(),
            field: field.to_string(),
            expected,
        }
    }
}

/// Classified operator kind
///
/// The raw node type string is kept on [`Node`]; this is only used to group
/// operators for the statistics passes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    // Scan operations
    SeqScan,
    IndexScan,
    IndexOnlyScan,
    BitmapIndexScan,
    BitmapHeapScan,
    TidScan,
    SubqueryScan,
    FunctionScan,
    ValuesScan,
    CteScan,
    WorkTableScan,
    ForeignScan,

    // Join operations
    NestedLoop,
    HashJoin,
    MergeJoin,

    // Aggregation operations
    Aggregate,
    GroupAggregate,
    HashAggregate,
    WindowAgg,

    // Sort operations
    Sort,
    IncrementalSort,

    // Set operations
    Append,
    MergeAppend,
    RecursiveUnion,

    Limit,
    Materialize,
    Memoize,
    Hash,
    Unique,
    ModifyTable,
    Result,

    // Parallel query
    Gather,
    GatherMerge,

    Other,
}

impl NodeKind {
    /// Parses a node kind from PostgreSQL EXPLAIN output
    pub fn from_postgres_str(s: &str) -> Self {
        match s {
            "Seq Scan" | "Parallel Seq Scan" => Self::SeqScan,
            "Index Scan" | "Parallel Index Scan" => Self::IndexScan,
            "Index Only Scan" | "Parallel Index Only Scan" => Self::IndexOnlyScan,
            "Bitmap Index Scan" => Self::BitmapIndexScan,
            "Bitmap Heap Scan" | "Parallel Bitmap Heap Scan" => Self::BitmapHeapScan,
            "Tid Scan" | "TID Scan" | "Tid Range Scan" => Self::TidScan,
            "Subquery Scan" => Self::SubqueryScan,
            "Function Scan" => Self::FunctionScan,
            "Values Scan" => Self::ValuesScan,
            "CTE Scan" => Self::CteScan,
            "WorkTable Scan" => Self::WorkTableScan,
            "Foreign Scan" => Self::ForeignScan,
            "Nested Loop" => Self::NestedLoop,
            "Hash Join" => Self::HashJoin,
            "Merge Join" => Self::MergeJoin,
            "Aggregate" => Self::Aggregate,
            "GroupAggregate" | "Group Aggregate" => Self::GroupAggregate,
            "HashAggregate" | "Hash Aggregate" => Self::HashAggregate,
            "WindowAgg" => Self::WindowAgg,
            "Sort" => Self::Sort,
            "Incremental Sort" => Self::IncrementalSort,
            "Append" | "Parallel Append" => Self::Append,
            "Merge Append" => Self::MergeAppend,
            "Recursive Union" => Self::RecursiveUnion,
            "Limit" => Self::Limit,
            "Materialize" => Self::Materialize,
            "Memoize" => Self::Memoize,
            "Hash" => Self::Hash,
            "Unique" => Self::Unique,
            "ModifyTable" => Self::ModifyTable,
            "Result" => Self::Result,
            "Gather" => Self::Gather,
            "Gather Merge" => Self::GatherMerge,
            _ => Self::Other,
        }
    }

    /// Returns true if this operator reads a relation
    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            Self::SeqScan
                | Self::IndexScan
                | Self::IndexOnlyScan
                | Self::BitmapIndexScan
                | Self::BitmapHeapScan
                | Self::TidScan
                | Self::ForeignScan
        )
    }

    /// Returns true if this operator reads an index
    pub fn is_index_scan(&self) -> bool {
        matches!(
            self,
            Self::IndexScan | Self::IndexOnlyScan | Self::BitmapIndexScan
        )
    }

    /// Returns true if this operator represents a join
    pub fn is_join(&self) -> bool {
        matches!(self, Self::NestedLoop | Self::HashJoin | Self::MergeJoin)
    }

    /// Returns true if this operator coordinates parallel workers
    pub fn is_gather(&self) -> bool {
        matches!(self, Self::Gather | Self::GatherMerge)
    }
}

/// Iterator for traversing plan nodes depth-first
///
/// Visits the main tree first, then every relocated CTE subtree in the
/// order the CTEs were discovered.
pub struct NodeIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> NodeIter<'a> {
    fn new(root: &'a Node) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // CTEs go below the children so they come out after the main tree
        self.stack.extend(node.ctes.values().rev());
        self.stack.extend(node.plans.iter().rev());
        Some(node)
    }
}
