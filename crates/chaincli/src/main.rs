// crates/chaincli/src/main.rs

use anyhow::{Context, Result};
use chaincore::{
    ExecutionEvent, FlowRecord, HookBus, OperationRecord, RuntimeContext, StepStatus, TriggerKind,
};
use chainruntime::{materialize, CronScheduler, FlowRuntime, FlowSource, JsonFlowSource, RuntimeConfig};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chain")]
#[command(about = "Flow automation engine CLI", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one flow by id
    Run {
        /// Flow JSON file or directory of flow files
        #[arg(short, long)]
        file: PathBuf,

        /// Id of the flow to run
        #[arg(long)]
        flow: Uuid,

        /// Trigger payload as JSON
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Emit an event on the in-process hook bus and print the filter result
    Emit {
        #[arg(short, long)]
        file: PathBuf,

        /// Event name, e.g. `articles.items.create`
        event: String,

        #[arg(short, long, value_enum, default_value_t = HookKind::Action)]
        kind: HookKind,

        /// Payload (filter) or meta (action / init) as JSON
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Load flows, bind triggers and keep running until Ctrl-C
    Serve {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Check that every flow in a file or directory materializes
    Validate {
        file: PathBuf,
    },

    /// List available operation types
    Operations,

    /// Write an example flow file
    Init {
        #[arg(short, long, default_value = "flows.json")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HookKind {
    Filter,
    Action,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run { file, flow, input } => run_flow(file, flow, input).await?,
        Commands::Emit {
            file,
            event,
            kind,
            payload,
        } => emit_event(file, event, kind, payload).await?,
        Commands::Serve { file } => serve(file).await?,
        Commands::Validate { file } => validate_flows(file).await?,
        Commands::Operations => list_operations(),
        Commands::Init { output } => create_example_flows(output)?,
    }

    Ok(())
}

fn build_runtime(file: PathBuf, hooks: Arc<HookBus>) -> FlowRuntime {
    let runtime = FlowRuntime::new(
        Arc::new(JsonFlowSource::new(file)),
        hooks,
        Arc::new(CronScheduler::new()),
        RuntimeConfig::from_env(),
    );
    chainops::register_all(&mut runtime.registry().write());
    runtime
}

fn parse_json(input: Option<String>) -> Result<Value> {
    match input {
        Some(text) => serde_json::from_str(&text).context("input is not valid JSON"),
        None => Ok(Value::Null),
    }
}

async fn load(runtime: &FlowRuntime) -> Result<()> {
    if let Some(report) = runtime.initialize().await? {
        println!(
            "📋 Loaded {} flow(s), {} trigger binding(s)",
            report.loaded.len(),
            report.bindings
        );
        for (id, reason) in &report.skipped {
            println!("   ⚠️  skipped {}: {}", id, reason);
        }
    }
    Ok(())
}

/// Print execution events until the channel closes
fn spawn_event_printer(runtime: &FlowRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::FlowStarted { flow_id, .. } => {
                    println!("▶️  Flow {} started", flow_id);
                }
                ExecutionEvent::OperationStarted { key, operation_type, .. } => {
                    println!("  ⚡ {} ({})", key, operation_type);
                }
                ExecutionEvent::OperationFinished { key, status, duration_ms, .. } => {
                    let marker = match status {
                        StepStatus::Resolve => "✅",
                        StepStatus::Reject => "❌",
                        StepStatus::Unknown => "❔",
                    };
                    println!("  {} {} finished in {}ms", marker, key, duration_ms);
                }
                ExecutionEvent::FlowCompleted { flow_id, steps, duration_ms, .. } => {
                    println!("✨ Flow {} completed: {} step(s) in {}ms", flow_id, steps, duration_ms);
                }
            }
        }
    })
}

async fn run_flow(file: PathBuf, flow: Uuid, input: Option<String>) -> Result<()> {
    let data = parse_json(input)?;
    let runtime = build_runtime(file, Arc::new(HookBus::new()));
    load(&runtime).await?;

    let printer = spawn_event_printer(&runtime);
    let run = runtime
        .run_flow_with_report(flow, data, RuntimeContext::new())
        .await?;

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    println!();
    println!("📊 Run {}", run.run_id);
    println!("   Visited: {}", run.visited().join(" → "));
    println!("📤 Result:");
    println!("{}", serde_json::to_string_pretty(&run.value)?);

    Ok(())
}

async fn emit_event(
    file: PathBuf,
    event: String,
    kind: HookKind,
    payload: Option<String>,
) -> Result<()> {
    let payload = parse_json(payload)?;
    let hooks = Arc::new(HookBus::new());
    let runtime = build_runtime(file, hooks.clone());
    load(&runtime).await?;

    let printer = spawn_event_printer(&runtime);
    let result = match kind {
        HookKind::Filter => {
            let result = hooks
                .emit_filter(&event, payload, json!({ "event": event }), RuntimeContext::new())
                .await;
            Some(result)
        }
        HookKind::Action => {
            hooks.emit_action(&event, payload, RuntimeContext::new()).await;
            None
        }
        HookKind::Init => {
            hooks.emit_init(&event, payload).await;
            None
        }
    };

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    if let Some(result) = result {
        println!();
        println!("📤 Filter result:");
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    runtime.unload().await;
    Ok(())
}

async fn serve(file: PathBuf) -> Result<()> {
    let hooks = Arc::new(HookBus::new());
    let runtime = build_runtime(file, hooks.clone());
    load(&runtime).await?;

    let printer = spawn_event_printer(&runtime);
    hooks.emit_init("app.after", json!({})).await;

    println!("🚀 Running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.unload().await;
    printer.abort();
    println!("👋 Stopped");
    Ok(())
}

async fn validate_flows(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flows: {}", file.display());

    let flows = JsonFlowSource::new(&file).active_flows().await?;
    let mut invalid = 0;

    for record in &flows {
        match materialize(record) {
            Ok(flow) => {
                println!(
                    "✅ {} ({}): {} trigger, {} operation(s) reachable",
                    record.name,
                    record.id,
                    record.trigger,
                    flow.node_count()
                );
            }
            Err(e) => {
                invalid += 1;
                println!("❌ {} ({}): {}", record.name, record.id, e);
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} flow(s) are invalid", invalid, flows.len());
    }
    Ok(())
}

fn list_operations() {
    println!("📦 Available Operation Types:");
    println!();

    let mut registry = chainruntime::OperationRegistry::new();
    chainops::register_all(&mut registry);

    for operation_type in registry.list_operation_types() {
        if let Some(metadata) = registry.get_metadata(&operation_type) {
            println!("  • {} ({})", operation_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", operation_type);
        }
    }
}

fn create_example_flows(output: PathBuf) -> Result<()> {
    // Child flow: greets whatever it is triggered with.
    let mut greet = FlowRecord::new("Greet item", TriggerKind::Operation).with_return("$last");
    greet.add_operation(
        OperationRecord::new("transform")
            .with_key("greeting")
            .with_options(json!({ "json": { "hello": "{{ $trigger }}" } })),
    );

    // Parent flow: fans out over the action payload in batches of two.
    let mut parent = FlowRecord::new("Greet everyone", TriggerKind::Action)
        .with_event("people.items.create")
        .with_return("fan_out");
    let report = OperationRecord::new("log")
        .with_key("report")
        .with_options(json!({ "message": "greeted:{{#each fan_out}} {{hello}}{{/each}}" }));
    let failed = OperationRecord::new("log")
        .with_key("failed")
        .with_options(json!({ "message": "fan-out failed: {{ $last.message }}" }));
    let fan_out = OperationRecord::new("trigger")
        .with_key("fan_out")
        .with_options(json!({
            "flow": greet.id,
            "payload": "{{ $trigger.names }}",
            "iterationMode": "batch",
            "batchSize": 2,
        }))
        .on_resolve(report.id)
        .on_reject(failed.id);
    parent.add_operation(fan_out);
    parent.add_operation(report);
    parent.add_operation(failed);

    // Heartbeat every minute.
    let mut heartbeat = FlowRecord::new("Heartbeat", TriggerKind::Schedule).with_cron("* * * * *");
    heartbeat.add_operation(
        OperationRecord::new("log").with_options(json!({ "message": "still alive" })),
    );

    let parent_id = parent.id;
    let flows = vec![greet, parent, heartbeat];
    std::fs::write(&output, serde_json::to_string_pretty(&flows)?)?;

    println!("✨ Created example flows: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  chain run --file {} --flow {} --input '{{\"names\": [\"ada\", \"grace\", \"linus\"]}}'",
        output.display(),
        parent_id
    );

    Ok(())
}
