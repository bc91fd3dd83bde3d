// crates/chainruntime/tests/triggers_test.rs

mod common;

use chaincore::{
    FilterHandler, EventHooks, Flow, FlowRecord, HookBus, OperationRecord, RuntimeContext,
    TriggerKind,
};
use chainruntime::{materialize, CronScheduler, TriggerBinding, TriggerRegistrar};
use common::*;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn flow(record: FlowRecord) -> Arc<Flow> {
    Arc::new(materialize(&record).unwrap())
}

fn single(name: &str, trigger: TriggerKind, operation_type: &str) -> FlowRecord {
    let mut record = FlowRecord::new(name, trigger);
    record.add_operation(OperationRecord::new(operation_type).with_key("step"));
    record
}

#[tokio::test]
async fn test_filter_flow_result_goes_back_to_the_bus() {
    let hooks = Arc::new(HookBus::new());
    let registrar = TriggerRegistrar::new(hooks.clone(), Arc::new(RecordingScheduler::default()));
    let runner = runner_with(vec![
        constant("stamp", json!({ "title": "stamped" })),
        failing("explode", "nope"),
    ]);

    let replacing = flow(
        single("replace", TriggerKind::Filter, "stamp")
            .with_event("articles.items.create")
            .with_return("$last"),
    );
    let records = registrar.bind_all(&[replacing], &runner);
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].bindings[0], TriggerBinding::Filter { .. }));

    let result = hooks
        .emit_filter(
            "articles.items.create",
            json!({ "title": "draft" }),
            json!({ "collection": "articles" }),
            RuntimeContext::new(),
        )
        .await;
    assert_eq!(result, json!({ "title": "stamped" }));

    // A failing filter flow without `return` hands the payload back untouched.
    let failing_flow = flow(single("fails", TriggerKind::Filter, "explode").with_event("users.create"));
    registrar.bind_all(&[failing_flow], &runner);
    let result = hooks
        .emit_filter("users.create", json!({ "email": "a@b.c" }), json!({}), RuntimeContext::new())
        .await;
    assert_eq!(result, json!({ "email": "a@b.c" }));
}

#[tokio::test]
async fn test_action_and_init_flows_run_with_meta() {
    let hooks = Arc::new(HookBus::new());
    let registrar = TriggerRegistrar::new(hooks.clone(), Arc::new(RecordingScheduler::default()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = runner_with(vec![reporting("report", tx), failing("explode", "nope")]);

    let flows = vec![
        flow(single("on create", TriggerKind::Action, "report").with_event("items.create")),
        flow(single("on start", TriggerKind::Init, "report").with_event("app.after")),
        flow(single("broken", TriggerKind::Action, "explode").with_event("items.create")),
    ];
    let records = registrar.bind_all(&flows, &runner);
    assert_eq!(records.len(), 3);
    assert_eq!(hooks.action_count("items.create"), 2);
    assert_eq!(hooks.init_count("app.after"), 1);

    hooks
        .emit_action("items.create", json!({ "key": 1 }), RuntimeContext::new())
        .await;
    assert_eq!(rx.recv().await, Some(json!({ "key": 1 })));

    hooks.emit_init("app.after", json!({ "phase": "after" })).await;
    assert_eq!(rx.recv().await, Some(json!({ "phase": "after" })));
}

#[tokio::test]
async fn test_flows_bind_once_per_expanded_event() {
    let hooks = Arc::new(HookBus::new());
    let registrar = TriggerRegistrar::new(hooks.clone(), Arc::new(RecordingScheduler::default()));
    let runner = runner_with(vec![]);

    let mut record = single("multi", TriggerKind::Action, "log");
    record.options.scope = vec!["items.update".into(), "server.start".into()];
    record.options.collections = vec!["articles".into(), "pages".into()];

    let records = registrar.bind_all(&[flow(record)], &runner);
    assert_eq!(records[0].bindings.len(), 3);
    assert_eq!(hooks.action_count("articles.items.update"), 1);
    assert_eq!(hooks.action_count("pages.items.update"), 1);
    assert_eq!(hooks.action_count("server.start"), 1);
}

#[tokio::test]
async fn test_invalid_cron_skips_only_that_flow() {
    init_tracing();
    let hooks = Arc::new(HookBus::new());
    let scheduler = Arc::new(RecordingScheduler::default());
    let registrar = TriggerRegistrar::new(hooks.clone(), scheduler.clone());
    let runner = runner_with(vec![]);

    let bad = flow(single("bad cron", TriggerKind::Schedule, "log").with_cron("invalid"));
    let good = flow(single("good cron", TriggerKind::Schedule, "log").with_cron("*/5 * * * *"));
    let action = flow(single("action", TriggerKind::Action, "log").with_event("items.create"));
    let (good_id, action_id) = (good.id, action.id);

    let records = registrar.bind_all(&[bad, good, action], &runner);

    let bound: Vec<_> = records.iter().map(|record| record.flow).collect();
    assert_eq!(bound, vec![good_id, action_id]);
    assert_eq!(scheduler.active_tasks(), 1);
    assert_eq!(hooks.action_count("items.create"), 1);
}

#[tokio::test]
async fn test_operation_flows_bind_nothing() {
    let hooks = Arc::new(HookBus::new());
    let registrar = TriggerRegistrar::new(hooks.clone(), Arc::new(RecordingScheduler::default()));
    let runner = runner_with(vec![]);

    let records = registrar.bind_all(&[flow(single("callable", TriggerKind::Operation, "log"))], &runner);
    assert!(records.is_empty());
    assert_eq!(hooks.handler_count(), 0);
}

#[tokio::test]
async fn test_unbind_removes_exactly_what_was_bound() {
    let hooks = Arc::new(HookBus::new());
    let scheduler = Arc::new(RecordingScheduler::default());
    let registrar = TriggerRegistrar::new(hooks.clone(), scheduler.clone());
    let runner = runner_with(vec![]);

    // Someone else's handler on the same event must survive.
    let foreign: FilterHandler =
        Arc::new(|payload: Value, _meta: Value, _ctx: RuntimeContext| -> BoxFuture<'static, Value> {
            Box::pin(async move { payload })
        });
    hooks.on_filter("items.create", foreign);

    let flows = vec![
        flow(single("filter", TriggerKind::Filter, "log").with_event("items.create")),
        flow(single("action", TriggerKind::Action, "log").with_event("items.create")),
        flow(single("init", TriggerKind::Init, "log").with_event("app.before")),
        flow(single("cron", TriggerKind::Schedule, "log").with_cron("* * * * *")),
    ];
    let records = registrar.bind_all(&flows, &runner);
    assert_eq!(hooks.handler_count(), 4);
    assert_eq!(scheduler.active_tasks(), 1);

    registrar.unbind_all(records);

    assert_eq!(hooks.handler_count(), 1);
    assert_eq!(hooks.filter_count("items.create"), 1);
    assert_eq!(scheduler.active_tasks(), 0);
}

#[tokio::test]
async fn test_cron_ticks_run_the_flow_until_stopped() {
    tokio::time::pause();

    let hooks = Arc::new(HookBus::new());
    let registrar = TriggerRegistrar::new(hooks, Arc::new(CronScheduler::new()));
    let counter = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let runner = runner_with(vec![counting("count", counter.clone()), reporting("report", tx)]);

    let mut record = FlowRecord::new("every second", TriggerKind::Schedule).with_cron("* * * * * *");
    let report = OperationRecord::new("report");
    record.add_operation(OperationRecord::new("count").on_resolve(report.id));
    record.add_operation(report);

    let records = registrar.bind_all(&[flow(record)], &runner);
    assert_eq!(records.len(), 1);

    // Scheduled runs get a null payload.
    let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("cron should tick")
        .expect("channel open");
    assert_eq!(payload, Value::Null);

    registrar.unbind_all(records);
    tokio::task::yield_now().await;
    let after_stop = counter.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_stop);
}
