use crate::RuntimeContext;
use futures_util::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `(payload, meta, context)`; returns the (possibly replaced) payload.
pub type FilterHandler =
    Arc<dyn Fn(Value, Value, RuntimeContext) -> BoxFuture<'static, Value> + Send + Sync>;

/// `(meta, context)`; fire-and-forget.
pub type ActionHandler = Arc<dyn Fn(Value, RuntimeContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// `(meta)`; lifecycle init points.
pub type InitHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Subscription surface of the application event bus.
///
/// Handlers are removed by identity, so `off_*` must be given a clone of the
/// `Arc` passed to `on_*`.
pub trait EventHooks: Send + Sync {
    fn on_filter(&self, event: &str, handler: FilterHandler);
    fn off_filter(&self, event: &str, handler: &FilterHandler);

    fn on_action(&self, event: &str, handler: ActionHandler);
    fn off_action(&self, event: &str, handler: &ActionHandler);

    fn on_init(&self, event: &str, handler: InitHandler);
    fn off_init(&self, event: &str, handler: &InitHandler);
}

type Handlers<H> = RwLock<HashMap<String, Vec<H>>>;

/// In-process event bus.
///
/// Filters run in registration order, each receiving the previous result.
/// Actions and init handlers for one event run concurrently.
#[derive(Default)]
pub struct HookBus {
    filters: Handlers<FilterHandler>,
    actions: Handlers<ActionHandler>,
    inits: Handlers<InitHandler>,
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emit_filter(
        &self,
        event: &str,
        payload: Value,
        meta: Value,
        ctx: RuntimeContext,
    ) -> Value {
        let handlers = snapshot(&self.filters, event);
        let mut payload = payload;
        for handler in handlers {
            payload = handler(payload, meta.clone(), ctx.clone()).await;
        }
        payload
    }

    pub async fn emit_action(&self, event: &str, meta: Value, ctx: RuntimeContext) {
        let handlers = snapshot(&self.actions, event);
        join_all(handlers.iter().map(|handler| handler(meta.clone(), ctx.clone()))).await;
    }

    pub async fn emit_init(&self, event: &str, meta: Value) {
        let handlers = snapshot(&self.inits, event);
        join_all(handlers.iter().map(|handler| handler(meta.clone()))).await;
    }

    /// Total number of registered handlers across all kinds and events.
    pub fn handler_count(&self) -> usize {
        count(&self.filters) + count(&self.actions) + count(&self.inits)
    }

    pub fn filter_count(&self, event: &str) -> usize {
        self.filters.read().get(event).map_or(0, Vec::len)
    }

    pub fn action_count(&self, event: &str) -> usize {
        self.actions.read().get(event).map_or(0, Vec::len)
    }

    pub fn init_count(&self, event: &str) -> usize {
        self.inits.read().get(event).map_or(0, Vec::len)
    }
}

impl EventHooks for HookBus {
    fn on_filter(&self, event: &str, handler: FilterHandler) {
        add(&self.filters, event, handler);
    }

    fn off_filter(&self, event: &str, handler: &FilterHandler) {
        remove(&self.filters, event, handler);
    }

    fn on_action(&self, event: &str, handler: ActionHandler) {
        add(&self.actions, event, handler);
    }

    fn off_action(&self, event: &str, handler: &ActionHandler) {
        remove(&self.actions, event, handler);
    }

    fn on_init(&self, event: &str, handler: InitHandler) {
        add(&self.inits, event, handler);
    }

    fn off_init(&self, event: &str, handler: &InitHandler) {
        remove(&self.inits, event, handler);
    }
}

fn snapshot<H: Clone>(handlers: &Handlers<H>, event: &str) -> Vec<H> {
    handlers.read().get(event).cloned().unwrap_or_default()
}

fn count<H>(handlers: &Handlers<H>) -> usize {
    handlers.read().values().map(Vec::len).sum()
}

fn add<H>(handlers: &Handlers<H>, event: &str, handler: H) {
    handlers
        .write()
        .entry(event.to_string())
        .or_default()
        .push(handler);
}

fn remove<T: ?Sized>(handlers: &Handlers<Arc<T>>, event: &str, handler: &Arc<T>) {
    let mut handlers = handlers.write();
    if let Some(list) = handlers.get_mut(event) {
        list.retain(|registered| !Arc::ptr_eq(registered, handler));
        if list.is_empty() {
            handlers.remove(event);
        }
    }
}
