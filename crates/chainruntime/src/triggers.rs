use crate::executor::FlowRunner;
use chaincore::{
    ActionHandler, EventHooks, FilterHandler, Flow, FlowId, InitHandler, RuntimeContext,
    ScheduledTask, Scheduler, TickHandler, TriggerKind,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// A single handler the registrar attached on behalf of a flow.
#[derive(Clone)]
pub enum TriggerBinding {
    Filter { event: String, handler: FilterHandler },
    Action { event: String, handler: ActionHandler },
    Init { event: String, handler: InitHandler },
    Schedule { task: ScheduledTask },
}

impl TriggerBinding {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Filter { .. } => TriggerKind::Filter,
            Self::Action { .. } => TriggerKind::Action,
            Self::Init { .. } => TriggerKind::Init,
            Self::Schedule { .. } => TriggerKind::Schedule,
        }
    }
}

/// Everything bound for one flow, kept so it can be unbound exactly.
#[derive(Clone)]
pub struct TriggerHandlerRecord {
    pub flow: FlowId,
    pub bindings: Vec<TriggerBinding>,
}

/// Binds flows to the event bus and the scheduler.
#[derive(Clone)]
pub struct TriggerRegistrar {
    hooks: Arc<dyn EventHooks>,
    scheduler: Arc<dyn Scheduler>,
}

impl TriggerRegistrar {
    pub fn new(hooks: Arc<dyn EventHooks>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { hooks, scheduler }
    }

    /// Bind every flow's trigger. Flows whose trigger cannot be bound (no
    /// event names, invalid cron) are logged and left without bindings.
    pub fn bind_all(&self, flows: &[Arc<Flow>], runner: &FlowRunner) -> Vec<TriggerHandlerRecord> {
        flows
            .iter()
            .filter_map(|flow| {
                let bindings = self.bind(flow, runner);
                if bindings.is_empty() {
                    return None;
                }
                tracing::info!(
                    "Bound {} trigger for flow {} ({} handler(s))",
                    flow.trigger,
                    flow.id,
                    bindings.len()
                );
                Some(TriggerHandlerRecord {
                    flow: flow.id,
                    bindings,
                })
            })
            .collect()
    }

    /// Remove exactly the handlers `bind_all` added and stop scheduled tasks.
    pub fn unbind_all(&self, records: Vec<TriggerHandlerRecord>) {
        for record in records {
            for binding in record.bindings {
                match binding {
                    TriggerBinding::Filter { event, handler } => self.hooks.off_filter(&event, &handler),
                    TriggerBinding::Action { event, handler } => self.hooks.off_action(&event, &handler),
                    TriggerBinding::Init { event, handler } => self.hooks.off_init(&event, &handler),
                    TriggerBinding::Schedule { task } => task.stop(),
                }
            }
            tracing::debug!("Unbound triggers for flow {}", record.flow);
        }
    }

    fn bind(&self, flow: &Arc<Flow>, runner: &FlowRunner) -> Vec<TriggerBinding> {
        match flow.trigger {
            TriggerKind::Filter => {
                let handler = filter_handler(flow.clone(), runner.clone());
                self.bind_events(flow, |event| {
                    self.hooks.on_filter(event, handler.clone());
                    TriggerBinding::Filter {
                        event: event.to_string(),
                        handler: handler.clone(),
                    }
                })
            }
            TriggerKind::Action => {
                let handler = action_handler(flow.clone(), runner.clone());
                self.bind_events(flow, |event| {
                    self.hooks.on_action(event, handler.clone());
                    TriggerBinding::Action {
                        event: event.to_string(),
                        handler: handler.clone(),
                    }
                })
            }
            TriggerKind::Init => {
                let handler = init_handler(flow.clone(), runner.clone());
                self.bind_events(flow, |event| {
                    self.hooks.on_init(event, handler.clone());
                    TriggerBinding::Init {
                        event: event.to_string(),
                        handler: handler.clone(),
                    }
                })
            }
            TriggerKind::Schedule => self.bind_schedule(flow, runner).into_iter().collect(),
            TriggerKind::Operation => Vec::new(),
        }
    }

    fn bind_events(
        &self,
        flow: &Flow,
        mut bind: impl FnMut(&str) -> TriggerBinding,
    ) -> Vec<TriggerBinding> {
        let events = flow.options.events();
        if events.is_empty() {
            tracing::warn!("Flow {} has a {} trigger without events, skipping", flow.id, flow.trigger);
        }
        events.iter().map(|event| bind(event)).collect()
    }

    fn bind_schedule(&self, flow: &Arc<Flow>, runner: &FlowRunner) -> Option<TriggerBinding> {
        let expression = flow.options.cron.as_deref().unwrap_or_default();
        if !self.scheduler.validate(expression) {
            tracing::warn!(
                "Couldn't register cron trigger. Provided cron is invalid: {}",
                expression
            );
            return None;
        }

        let tick: TickHandler = {
            let flow = flow.clone();
            let runner = runner.clone();
            Arc::new(move || -> BoxFuture<'static, ()> {
                let flow = flow.clone();
                let runner = runner.clone();
                Box::pin(async move {
                    runner.run(&flow, Value::Null, RuntimeContext::new()).await;
                })
            })
        };

        match self.scheduler.schedule(expression, tick) {
            Ok(task) => Some(TriggerBinding::Schedule { task }),
            Err(e) => {
                tracing::warn!("Couldn't schedule flow {}: {}", flow.id, e);
                None
            }
        }
    }
}

/// Runs the flow with the filter payload and hands the result back to the bus.
fn filter_handler(flow: Arc<Flow>, runner: FlowRunner) -> FilterHandler {
    Arc::new(
        move |payload: Value, _meta: Value, ctx: RuntimeContext| -> BoxFuture<'static, Value> {
            let flow = flow.clone();
            let runner = runner.clone();
            Box::pin(async move { runner.run(&flow, payload, ctx).await })
        },
    )
}

fn action_handler(flow: Arc<Flow>, runner: FlowRunner) -> ActionHandler {
    Arc::new(
        move |meta: Value, ctx: RuntimeContext| -> BoxFuture<'static, ()> {
            let flow = flow.clone();
            let runner = runner.clone();
            Box::pin(async move {
                runner.run(&flow, meta, ctx).await;
            })
        },
    )
}

fn init_handler(flow: Arc<Flow>, runner: FlowRunner) -> InitHandler {
    Arc::new(move |meta: Value| -> BoxFuture<'static, ()> {
        let flow = flow.clone();
        let runner = runner.clone();
        Box::pin(async move {
            runner.run(&flow, meta, RuntimeContext::new()).await;
        })
    })
}
