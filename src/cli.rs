// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "otto", version, about = "A durable autonomous-agent execution engine")]
pub struct Cli {
    /// Explicit config file (merged over the discovered layers)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging to stderr (equivalent to OTTO_LOG=debug)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a plan and follow it to completion.
    Run {
        /// The plan to execute, free-form natural language
        plan: String,

        /// Display name for the execution
        #[arg(long)]
        name: Option<String>,

        /// Tools the model may use (comma-separated registry names)
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,

        /// Model name forwarded to the provider
        #[arg(long)]
        model: Option<String>,

        /// iCalendar RRULE; makes this a recurring schedule
        #[arg(long)]
        schedule: Option<String>,

        /// Step budget for the execution (default 500)
        #[arg(long)]
        max_steps: Option<u32>,

        /// Run budget for a schedule (default 1000)
        #[arg(long)]
        max_runs: Option<u32>,

        /// Per-run timeout for scheduled runs, e.g. "5m" or "90s"
        #[arg(long)]
        run_timeout: Option<String>,

        /// Serialise scheduled runs: each run awaits the previous one
        #[arg(long)]
        wait_for_runs: bool,

        /// Print the final execution state as JSON instead of plain output
        #[arg(long)]
        json: bool,
    },

    /// Print the merged configuration and exit.
    ShowConfig,

    /// List the tools available in the registry.
    ListTools,
}
