use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub type FlowId = Uuid;
pub type OperationId = Uuid;

/// Persisted flow: trigger definition plus a flat list of operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub status: FlowStatus,
    pub trigger: TriggerKind,
    #[serde(default)]
    pub options: TriggerOptions,
    /// Root operation. A missing or dangling root makes the flow a no-op.
    #[serde(default)]
    pub operation: Option<OperationId>,
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
}

impl FlowRecord {
    pub fn new(name: impl Into<String>, trigger: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: FlowStatus::Active,
            trigger,
            options: TriggerOptions::default(),
            operation: None,
            operations: Vec::new(),
        }
    }

    /// Add an operation; the first one added becomes the root.
    pub fn add_operation(&mut self, operation: OperationRecord) -> OperationId {
        let id = operation.id;
        if self.operation.is_none() {
            self.operation = Some(id);
        }
        self.operations.push(operation);
        id
    }

    pub fn with_root(mut self, root: Option<OperationId>) -> Self {
        self.operation = root;
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.options.scope.push(event.into());
        self
    }

    pub fn with_cron(mut self, expression: impl Into<String>) -> Self {
        self.options.cron = Some(expression.into());
        self
    }

    pub fn with_return(mut self, key: impl Into<String>) -> Self {
        self.options.return_key = Some(key.into());
        self
    }

    pub fn with_status(mut self, status: FlowStatus) -> Self {
        self.status = status;
        self
    }

    pub fn find_operation(&self, id: OperationId) -> Option<&OperationRecord> {
        self.operations.iter().find(|op| op.id == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Blocking hook; the run result is handed back to the event bus.
    Filter,
    /// Fire-and-forget hook.
    Action,
    /// Lifecycle hook, fired once per init point.
    Init,
    /// Cron schedule, runs with a null payload.
    Schedule,
    /// Not bound to any event; only started by other operations.
    Operation,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Filter => "filter",
            Self::Action => "action",
            Self::Init => "init",
            Self::Schedule => "schedule",
            Self::Operation => "operation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerOptions {
    /// Event names for filter / action / init triggers.
    #[serde(default, deserialize_with = "one_or_many")]
    pub scope: Vec<String>,
    /// Collections the `items.*` scopes expand over.
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub cron: Option<String>,
    /// Context key (or dotted path, or `$all`) returned from a run.
    #[serde(default, rename = "return")]
    pub return_key: Option<String>,
}

const ITEM_SCOPES: [&str; 3] = ["items.create", "items.update", "items.delete"];
const SYSTEM_PREFIX: &str = "directus_";

impl TriggerOptions {
    /// Event names to bind, with `items.*` scopes expanded per collection.
    pub fn events(&self) -> Vec<String> {
        self.scope
            .iter()
            .flat_map(|scope| {
                if !ITEM_SCOPES.contains(&scope.as_str()) {
                    return vec![scope.clone()];
                }
                self.collections
                    .iter()
                    .map(|collection| match collection.strip_prefix(SYSTEM_PREFIX) {
                        Some(system) => {
                            let action = scope.split('.').nth(1).unwrap_or_default();
                            format!("{system}.{action}")
                        }
                        None => format!("{collection}.{scope}"),
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(event)) => vec![event],
        Some(OneOrMany::Many(events)) => events,
    })
}

/// Persisted operation, successors referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    /// Context key for the produced value; defaults to the id.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub operation_type: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub resolve: Option<OperationId>,
    #[serde(default)]
    pub reject: Option<OperationId>,
}

impl OperationRecord {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: None,
            operation_type: operation_type.into(),
            options: Value::Null,
            resolve: None,
            reject: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn on_resolve(mut self, next: OperationId) -> Self {
        self.resolve = Some(next);
        self
    }

    pub fn on_reject(mut self, next: OperationId) -> Self {
        self.reject = Some(next);
        self
    }

    pub fn successor(&self, edge: Edge) -> Option<OperationId> {
        match edge {
            Edge::Resolve => self.resolve,
            Edge::Reject => self.reject,
        }
    }

    pub fn context_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Resolve,
    Reject,
}

impl Edge {
    pub const ALL: [Edge; 2] = [Edge::Resolve, Edge::Reject];
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => f.write_str("resolve"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// Materialized operation: successors are nested nodes, ids are gone.
///
/// Shared sub-trees (two edges pointing at the same record) are stored once
/// behind an `Arc`; walking still sees a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationNode {
    pub key: String,
    pub operation_type: String,
    pub options: Value,
    pub resolve: Option<Arc<OperationNode>>,
    pub reject: Option<Arc<OperationNode>>,
}

impl OperationNode {
    pub fn successor(&self, edge: Edge) -> Option<&OperationNode> {
        match edge {
            Edge::Resolve => self.resolve.as_deref(),
            Edge::Reject => self.reject.as_deref(),
        }
    }

    /// Number of nodes in the tree rooted here.
    pub fn count(&self) -> usize {
        1 + Edge::ALL
            .iter()
            .filter_map(|edge| self.successor(*edge))
            .map(OperationNode::count)
            .sum::<usize>()
    }

    /// Depth-first search by context key.
    pub fn find(&self, key: &str) -> Option<&OperationNode> {
        if self.key == key {
            return Some(self);
        }
        Edge::ALL
            .iter()
            .filter_map(|edge| self.successor(*edge))
            .find_map(|node| node.find(key))
    }
}

/// Executable flow produced by the tree builder.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    pub trigger: TriggerKind,
    pub options: TriggerOptions,
    pub root: Option<Arc<OperationNode>>,
}

impl Flow {
    pub fn node_count(&self) -> usize {
        self.root.as_deref().map_or(0, OperationNode::count)
    }
}
