// crates/mediacli/src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediacore::{ExecutionEvent, NodeEvent, RunStatus, Workflow};
use mediaruntime::{resolver, FlowRuntime, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mediaflow")]
#[command(about = "Media workflow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Answer LLM calls locally instead of calling Gemini
        #[arg(long)]
        offline: bool,

        /// Artificial delay per node, in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },

    /// Check a workflow file's edges and report cycles
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node kinds
    Nodes,

    /// Write the sample "Product Marketing Kit" workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            verbose,
            offline,
            latency_ms,
        } => {
            let level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
                )
                .init();

            let config = RuntimeConfig {
                simulated_latency: Duration::from_millis(latency_ms),
                ..RuntimeConfig::default()
            };
            run_workflow(&file, offline, config).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let workflow = Workflow::load(file)?;
    tracing::debug!("Parsed workflow {} from {}", workflow.id, file.display());
    Ok(workflow)
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { scope, targets, .. } => {
            println!("Run started ({:?}): {}", scope, targets.join(", "));
        }
        ExecutionEvent::NodeStarted { node_id, kind, .. } => {
            println!("  > {} ({})", node_id, kind);
        }
        ExecutionEvent::NodeCompleted {
            node_id, duration_ms, ..
        } => {
            println!("  ok {} in {}ms", node_id, duration_ms);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  FAILED {}: {}", node_id, error);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => println!("     [{}] {}", node_id, message),
            NodeEvent::Warning { message } => println!("     [{}] warning: {}", node_id, message),
        },
        ExecutionEvent::RunCompleted {
            status, duration_ms, ..
        } => match status {
            RunStatus::Success => println!("Run completed successfully in {}ms", duration_ms),
            _ => println!("Run failed after {}ms", duration_ms),
        },
        ExecutionEvent::WorkflowReset { .. } => {}
    }
}

async fn run_workflow(file: &Path, offline: bool, config: RuntimeConfig) -> Result<()> {
    println!("Loading workflow from: {}", file.display());

    let workflow = load_workflow(file)?;

    println!("Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let registry = if offline {
        medianodes::offline_registry()
    } else {
        medianodes::gemini_registry()
    };
    let runtime = FlowRuntime::with_config(workflow, registry, config);

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
            if matches!(event, ExecutionEvent::RunCompleted { .. }) {
                break;
            }
        }
    });

    let run = runtime
        .run_workflow()
        .await
        .ok_or_else(|| anyhow::anyhow!("A run is already in progress"))?;
    event_task.await?;

    println!();
    println!("Execution Summary:");
    println!("   Run ID: {}", run.id);
    println!("   Status: {:?}", run.status);
    println!("   Duration: {}ms", run.duration_ms);

    if !run.results.is_empty() {
        println!();
        println!("Outputs:");
        for (node_id, value) in &run.results {
            println!("   {}: {}", node_id, value.to_text());
        }
    }

    let workflow = runtime.workflow().await;
    let failures: Vec<_> = workflow
        .nodes
        .iter()
        .filter_map(|n| n.error_message.as_ref().map(|e| (n.id.as_str(), e)))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("Errors:");
        for (node_id, error) in failures {
            println!("   {}: {}", node_id, error);
        }
    }

    if run.status != RunStatus::Success {
        anyhow::bail!("workflow run failed");
    }

    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let workflow = load_workflow(file)?;

    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());

    let problems = resolver::workflow_problems(&workflow);
    for problem in &problems {
        println!("   {}", problem);
    }
    if !problems.is_empty() {
        anyhow::bail!("{} problem(s) found", problems.len());
    }

    println!("Workflow is valid");
    Ok(())
}

fn list_nodes() {
    println!("Available Node Kinds:");
    println!();

    let registry = medianodes::offline_registry();
    for metadata in registry.catalog() {
        println!("  * {} [{}] ({})", metadata.label, metadata.kind, metadata.category);
        println!("    {}", metadata.description);
        for input in &metadata.inputs {
            let port = input
                .port
                .map(|p| format!("{p}: "))
                .unwrap_or_default();
            println!("      <- {}{}", port, input.description);
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let workflow = medianodes::product_marketing_kit()?;

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  mediaflow run --file {} --offline", output.display());

    Ok(())
}
