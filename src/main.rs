// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::filter::EnvFilter;

use cli::{Cli, Commands};
use otto_config::Config;
use otto_engine::{Engine, SubmitArgs};
use otto_tools::{EchoTool, ToolRegistry, WebFetchTool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = otto_config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::ListTools => {
            for schema in build_registry(&config).schemas() {
                let summary = schema.description.lines().next().unwrap_or_default();
                println!("{:<12} {}", schema.name, summary);
            }
            Ok(())
        }
        Commands::Run {
            plan,
            name,
            tools,
            model,
            schedule,
            max_steps,
            max_runs,
            run_timeout,
            wait_for_runs,
            json,
        } => {
            let run_timeout = run_timeout
                .map(|s| humantime::parse_duration(&s))
                .transpose()
                .context("parsing --run-timeout")?;
            let args = SubmitArgs {
                name: name.unwrap_or_else(|| "cli".into()),
                plan,
                tools,
                schedule,
                model,
                max_steps,
                max_runs,
                run_timeout,
                wait_for_runs,
                ..Default::default()
            };
            run(config, args, json).await
        }
    }
}

async fn run(config: Config, args: SubmitArgs, json: bool) -> anyhow::Result<()> {
    let model = otto_model::from_config(&config.model)?;
    let registry = Arc::new(build_registry(&config));
    let engine = Engine::with_config(model, registry, config.engine.clone());

    let receipt = engine.submit_plan(args)?;
    eprintln!("submitted {} (task {})", receipt.name, receipt.task_id);

    if receipt.scheduled {
        let handle = engine.wait_for_scheduler(&receipt.task_id).await;
        let state = handle.wait().await;
        if let Some(e) = &state.error {
            warn!(error = %e, "schedule reported an error");
        }
        println!("schedule finished after {} run(s)", state.completed_runs);
        return Ok(());
    }

    let handle = engine.wait_for_plan(&receipt.task_id).await;

    // Follow the audit history as the execution publishes it.
    let mut printed = 0;
    let final_state = loop {
        let state = handle.state();
        for entry in &state.history[printed..] {
            eprintln!("[{}] {}", format!("{:?}", entry.kind).to_lowercase(), entry.content);
        }
        printed = state.history.len();
        if state.completed_at.is_some() || state.error.is_some() {
            break state;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&final_state)?);
    } else {
        println!("{}", final_state.output);
    }
    if let Some(e) = final_state.error {
        anyhow::bail!("execution failed: {e}");
    }
    Ok(())
}

/// Build the process-wide tool registry from configuration.
fn build_registry(config: &Config) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in &config.tools.enabled {
        match name.as_str() {
            "echo" => registry.register(EchoTool),
            "web_fetch" => registry.register(WebFetchTool::new(config.tools.fetch_max_chars)),
            other => warn!(tool = other, "unknown tool in config; skipping"),
        }
    }
    registry
}

/// Logging goes to stderr so plan output on stdout stays pipeable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("OTTO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
