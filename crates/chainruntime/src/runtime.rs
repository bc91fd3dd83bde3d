use crate::executor::{FlowRun, FlowRunner};
use crate::loader::FlowSource;
use crate::registry::{OperationRegistry, SharedRegistry};
use crate::tree::materialize;
use crate::triggers::{TriggerHandlerRecord, TriggerRegistrar};
use chaincore::{
    EventBus, EventHooks, ExecutionEvent, Flow, FlowError, FlowId, FlowInvoker, Operation,
    RuntimeContext, Scheduler,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Owns the loaded flow set: materializes flows from a source, binds their
/// triggers and tears everything down again on unload.
///
/// Load, unload and reload are serialized through one async mutex, so
/// concurrent reload requests queue up instead of double-binding.
pub struct FlowRuntime {
    registry: SharedRegistry,
    runner: FlowRunner,
    registrar: TriggerRegistrar,
    source: Arc<dyn FlowSource>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    state: Mutex<LoadState>,
}

#[derive(Default)]
struct LoadState {
    loaded: bool,
    records: Vec<TriggerHandlerRecord>,
}

/// What a load did.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub loaded: Vec<FlowId>,
    /// Flows left out because they could not be materialized.
    pub skipped: Vec<(FlowId, String)>,
    pub bindings: usize,
}

impl FlowRuntime {
    pub fn new(
        source: Arc<dyn FlowSource>,
        hooks: Arc<dyn EventHooks>,
        scheduler: Arc<dyn Scheduler>,
        config: RuntimeConfig,
    ) -> Self {
        let registry = OperationRegistry::new().shared();
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let runner = FlowRunner::new(registry.clone(), event_bus.clone(), config.collect_env());

        Self {
            registry,
            runner,
            registrar: TriggerRegistrar::new(hooks, scheduler),
            source,
            event_bus,
            config,
            state: Mutex::new(LoadState::default()),
        }
    }

    /// Get access to the operation registry for registering operation types
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn add_operation(&self, operation: Arc<dyn Operation>) {
        self.registry.write().register(operation);
    }

    pub fn clear_operations(&self) {
        self.registry.write().clear();
    }

    pub fn runner(&self) -> &FlowRunner {
        &self.runner
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Load flows unless they already are.
    pub async fn initialize(&self) -> Result<Option<LoadReport>, FlowError> {
        let mut state = self.state.lock().await;
        if state.loaded {
            return Ok(None);
        }
        self.load_locked(&mut state).await.map(Some)
    }

    /// Unbind everything and load the current flow set again.
    pub async fn reload(&self) -> Result<Option<LoadReport>, FlowError> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            tracing::warn!("Flows have to be loaded before they can be reloaded");
            return Ok(None);
        }
        self.unload_locked(&mut state);
        self.load_locked(&mut state).await.map(Some)
    }

    pub async fn unload(&self) {
        let mut state = self.state.lock().await;
        self.unload_locked(&mut state);
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    /// Number of active trigger bindings (event handlers plus scheduled tasks).
    pub async fn binding_count(&self) -> usize {
        let state = self.state.lock().await;
        state.records.iter().map(|record| record.bindings.len()).sum()
    }

    pub fn flow(&self, id: FlowId) -> Option<Arc<Flow>> {
        self.runner.flows().read().get(&id).cloned()
    }

    pub fn flows(&self) -> Vec<Arc<Flow>> {
        self.runner.flows().read().values().cloned().collect()
    }

    /// Start a loaded operation-triggered flow by id; any other id yields `null`.
    pub async fn run_operation_flow(&self, id: FlowId, data: Value, ctx: RuntimeContext) -> Value {
        self.runner.run_operation_flow(id, data, ctx).await
    }

    /// Start any loaded flow by id, whatever its trigger, and return the full run trace.
    pub async fn run_flow_with_report(
        &self,
        id: FlowId,
        data: Value,
        ctx: RuntimeContext,
    ) -> Result<FlowRun, FlowError> {
        let flow = self.flow(id).ok_or(FlowError::NotFound(id))?;
        Ok(self.runner.run_with_report(&flow, data, ctx).await)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    async fn load_locked(&self, state: &mut LoadState) -> Result<LoadReport, FlowError> {
        let records = self.source.active_flows().await?;
        let mut report = LoadReport::default();
        let mut flows = Vec::with_capacity(records.len());

        for record in &records {
            match materialize(record) {
                Ok(flow) => flows.push(Arc::new(flow)),
                Err(e) if self.config.load_policy == LoadPolicy::AbortOnInvalid => {
                    tracing::error!("Aborting flow load: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Skipping flow {} ({}): {}", record.name, record.id, e);
                    report.skipped.push((record.id, e.to_string()));
                }
            }
        }

        {
            let mut index = self.runner.flows().write();
            index.clear();
            index.extend(flows.iter().map(|flow| (flow.id, flow.clone())));
        }

        state.records = self.registrar.bind_all(&flows, &self.runner);
        state.loaded = true;

        report.loaded = flows.iter().map(|flow| flow.id).collect();
        report.bindings = state.records.iter().map(|record| record.bindings.len()).sum();
        tracing::info!(
            "Loaded {} flow(s), {} skipped, {} trigger binding(s)",
            report.loaded.len(),
            report.skipped.len(),
            report.bindings
        );
        Ok(report)
    }

    fn unload_locked(&self, state: &mut LoadState) {
        self.registrar.unbind_all(std::mem::take(&mut state.records));
        self.runner.flows().write().clear();
        state.loaded = false;
    }
}

impl Drop for FlowRuntime {
    fn drop(&mut self) {
        // Stop cron tasks and release bus handlers that would otherwise outlive the runtime.
        let records = std::mem::take(&mut self.state.get_mut().records);
        self.registrar.unbind_all(records);
    }
}

/// What to do when a flow in the loaded set cannot be materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Log and leave that flow out; the rest loads.
    #[default]
    SkipInvalid,
    /// Fail the whole load.
    AbortOnInvalid,
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Environment variables exposed to flows under `$env`.
    pub env_allow_list: Vec<String>,
    pub load_policy: LoadPolicy,
}

impl RuntimeConfig {
    /// Defaults overridden by `FLOWS_EVENT_BUFFER_SIZE`, `FLOWS_ENV_ALLOW_LIST`
    /// (comma separated) and `FLOWS_LOAD_POLICY` (`skip` | `abort`).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("FLOWS_EVENT_BUFFER_SIZE") {
            match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.event_buffer_size = size,
                _ => tracing::warn!(
                    "FLOWS_EVENT_BUFFER_SIZE must be a positive integer, got '{}', using {}",
                    value,
                    config.event_buffer_size
                ),
            }
        }

        if let Ok(list) = std::env::var("FLOWS_ENV_ALLOW_LIST") {
            config.env_allow_list = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        match std::env::var("FLOWS_LOAD_POLICY").as_deref().map(str::trim) {
            Ok("abort") => config.load_policy = LoadPolicy::AbortOnInvalid,
            Ok("skip") | Err(_) => {}
            Ok(other) => tracing::warn!("Unknown FLOWS_LOAD_POLICY '{}', using skip", other),
        }

        config
    }

    /// Snapshot of the allow-listed environment.
    pub fn collect_env(&self) -> Map<String, Value> {
        self.env_allow_list
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| (name.clone(), Value::String(value)))
            })
            .collect()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            env_allow_list: Vec::new(),
            load_policy: LoadPolicy::SkipInvalid,
        }
    }
}
