use crate::flow::FlowId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub const TRIGGER_KEY: &str = "$trigger";
pub const LAST_KEY: &str = "$last";
pub const ACCOUNTABILITY_KEY: &str = "$accountability";
pub const ENV_KEY: &str = "$env";
/// Return selector for the whole keyed data map.
pub const ALL_KEY: &str = "$all";

/// Per-run keyed data: operation key -> last produced value, plus the
/// reserved `$` keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedData(Map<String, Value>);

impl KeyedData {
    pub fn new(trigger: Value, accountability: Option<Value>, env: Map<String, Value>) -> Self {
        let mut data = Map::new();
        data.insert(TRIGGER_KEY.to_string(), trigger.clone());
        data.insert(LAST_KEY.to_string(), trigger);
        data.insert(
            ACCOUNTABILITY_KEY.to_string(),
            accountability.unwrap_or(Value::Null),
        );
        data.insert(ENV_KEY.to_string(), Value::Object(env));
        Self(data)
    }

    pub fn trigger(&self) -> &Value {
        self.0.get(TRIGGER_KEY).unwrap_or(&Value::Null)
    }

    pub fn last(&self) -> &Value {
        self.0.get(LAST_KEY).unwrap_or(&Value::Null)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Store a step result under its key and under `$last`.
    pub fn record(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value.clone());
        self.0.insert(LAST_KEY.to_string(), value);
    }

    /// Resolve a dotted path such as `$last.items.0.id`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        // Whole keys win over dotted lookups so keys containing dots still resolve.
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Value returned by a run for the given `return` option.
    pub fn select(&self, return_key: Option<&str>) -> Value {
        match return_key {
            Some(ALL_KEY) => Value::Object(self.0.clone()),
            Some(path) => self.get_path(path).cloned().unwrap_or(Value::Null),
            None => self.trigger().clone(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Starts a loaded flow by id. Implemented by the flow runner and handed to
/// operations through [`RuntimeContext`] so they can invoke sub-flows.
#[async_trait]
pub trait FlowInvoker: Send + Sync {
    async fn run_operation_flow(&self, flow: FlowId, data: Value, ctx: RuntimeContext) -> Value;
}

/// Ambient information handed to every operation handler.
#[derive(Clone, Default)]
pub struct RuntimeContext {
    pub accountability: Option<Value>,
    pub schema: Option<Value>,
    pub extra: Map<String, Value>,
    flows: Option<Arc<dyn FlowInvoker>>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accountability(mut self, accountability: Value) -> Self {
        self.accountability = Some(accountability);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_flows(mut self, flows: Arc<dyn FlowInvoker>) -> Self {
        self.flows = Some(flows);
        self
    }

    pub fn flows(&self) -> Option<&Arc<dyn FlowInvoker>> {
        self.flows.as_ref()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("accountability", &self.accountability)
            .field("schema", &self.schema.is_some())
            .field("extra", &self.extra)
            .field("flows", &self.flows.is_some())
            .finish()
    }
}
