// Copyright (c) 2025 Workflow Orchestrator Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI front-end for the workflow orchestrator: `validate`, `run`, and a
//! best-effort in-process `cancel` demo, driven locally against the Engine
//! API rather than over an out-of-scope REST/WS surface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use orchestrator_core::{EngineConfig, EventBus, ExecutorRegistry, SubmitConfig, Workflow, WorkflowEngine};
use orchestrator_events::{InMemoryExecutionStore, MetricsSubscriber, PersistenceSubscriber};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Workflow Orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition
    Validate {
        /// Path to workflow file (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Run a workflow to completion
    Run {
        /// Path to workflow file (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: String,

        /// Input JSON string, or a path to a JSON file
        #[arg(short, long)]
        input: Option<String>,

        /// Maximum concurrently admitted executions
        #[arg(long, default_value = "100")]
        max_concurrent: usize,

        /// Overrides the execution-level timeout (e.g. "5m", "30s")
        #[arg(long)]
        timeout: Option<String>,
    },

    /// Submit a workflow and cancel it shortly after, demonstrating
    /// mid-flight cancellation. There is no long-lived server in this CLI,
    /// so this issues `submit` then `cancel` against the same in-process
    /// engine rather than against a separately running execution.
    Cancel {
        /// Path to workflow file (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: String,

        /// Input JSON string, or a path to a JSON file
        #[arg(short, long)]
        input: Option<String>,

        /// Delay before issuing the cancellation (e.g. "100ms")
        #[arg(long, default_value = "100ms")]
        after: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("orchestrator={log_level}").into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Run { file, input, max_concurrent, timeout } => run_workflow(&file, input.as_deref(), max_concurrent, timeout.as_deref()).await,
        Commands::Cancel { file, input, after } => cancel_demo(&file, input.as_deref(), &after).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn read_workflow(file_path: &str) -> Result<Workflow> {
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read workflow file: {file_path}"))?;
    if file_path.ends_with(".json") {
        Workflow::from_json(&content).with_context(|| format!("failed to parse workflow JSON: {file_path}"))
    } else {
        Workflow::from_yaml(&content).with_context(|| format!("failed to parse workflow YAML: {file_path}"))
    }
}

fn parse_input(input_str: &str) -> Result<HashMap<String, Value>> {
    if Path::new(input_str).exists() {
        let content = fs::read_to_string(input_str).with_context(|| format!("failed to read input file: {input_str}"))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse input JSON from file: {input_str}"))
    } else {
        serde_json::from_str(input_str).with_context(|| "failed to parse input JSON string")
    }
}

fn validate_workflow(file_path: &str) -> Result<()> {
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);
    let workflow = read_workflow(file_path)?;
    let registry = ExecutorRegistry::new();
    orchestrator_executors::register_all(&registry);

    workflow.validate().with_context(|| "workflow validation failed")?;
    for (index, step) in workflow.steps.iter().enumerate() {
        registry.validate(index, step).with_context(|| format!("step '{}' validation failed", step.id))?;
    }

    println!("{}", "\u{2713} Workflow is valid".green().bold());
    println!("  Name: {}", workflow.name);
    println!("  Version: {}", workflow.version);
    println!("  Steps: {}", workflow.steps.len());
    Ok(())
}

fn build_engine(max_concurrent: usize) -> WorkflowEngine {
    let registry = ExecutorRegistry::new();
    orchestrator_executors::register_all(&registry);

    let bus = EventBus::new();
    bus.subscribe(Arc::new(PersistenceSubscriber::new(Arc::new(InMemoryExecutionStore::new()))));
    bus.subscribe(Arc::new(MetricsSubscriber::new()));

    WorkflowEngine::new(
        registry,
        bus,
        EngineConfig {
            max_concurrent,
            ..EngineConfig::default()
        },
    )
}

async fn await_terminal(engine: &WorkflowEngine, execution_id: uuid::Uuid) -> Result<orchestrator_core::Execution> {
    loop {
        let execution = engine.get(execution_id).await.with_context(|| "execution disappeared from the engine")?;
        if execution.status.is_terminal() {
            return Ok(execution);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn run_workflow(file_path: &str, input: Option<&str>, max_concurrent: usize, timeout: Option<&str>) -> Result<()> {
    println!("{} {}", "Running workflow:".cyan().bold(), file_path);
    let workflow = read_workflow(file_path)?;
    let inputs = input.map(parse_input).transpose()?.unwrap_or_default();
    info!(workflow = %workflow.name, inputs = ?inputs, "submitting workflow");

    let engine = build_engine(max_concurrent);
    let submit_config = SubmitConfig {
        timeout: timeout.map(humantime::parse_duration).transpose().with_context(|| "invalid --timeout value")?,
    };

    let execution = engine.submit(Arc::new(workflow), inputs, submit_config).with_context(|| "submission was rejected")?;
    println!("{}", "Executing workflow...".cyan());

    let execution = await_terminal(&engine, execution.id).await?;

    match execution.status {
        orchestrator_core::ExecutionStatus::Completed => {
            println!("{}", "\u{2713} Workflow completed successfully".green().bold());
            println!("\n{}", "Output:".cyan().bold());
            println!("{}", serde_json::to_string_pretty(&execution.output).unwrap_or_else(|_| format!("{:?}", execution.output)));
            Ok(())
        }
        orchestrator_core::ExecutionStatus::Failed => {
            anyhow::bail!("workflow execution failed: {}", execution.error.unwrap_or_default())
        }
        orchestrator_core::ExecutionStatus::Cancelled => {
            anyhow::bail!("workflow execution was cancelled")
        }
        other => anyhow::bail!("unexpected non-terminal status after await: {other:?}"),
    }
}

async fn cancel_demo(file_path: &str, input: Option<&str>, after: &str) -> Result<()> {
    let delay = humantime::parse_duration(after).with_context(|| "invalid --after value")?;
    println!("{} {}", "Submitting then cancelling workflow:".cyan().bold(), file_path);

    let workflow = read_workflow(file_path)?;
    let inputs = input.map(parse_input).transpose()?.unwrap_or_default();
    let engine = build_engine(100);

    let execution = engine.submit(Arc::new(workflow), inputs, SubmitConfig::default()).with_context(|| "submission was rejected")?;
    tokio::time::sleep(delay).await;

    match engine.cancel(execution.id).await {
        Ok(()) => info!(execution_id = %execution.id, "cancellation signalled"),
        Err(e) => info!(execution_id = %execution.id, error = %e, "execution had already reached a terminal state"),
    }

    let execution = await_terminal(&engine, execution.id).await?;
    println!("{}", "Final status:".cyan().bold());
    println!("  {:?}", execution.status);
    Ok(())
}
