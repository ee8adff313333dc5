//! `rwpv` - reputation-weighted consensus from the command line
//!
//! # Usage
//!
//! ```bash
//! # One prediction
//! rwpv --agents agents.toml predict --features 0.1,0.2
//!
//! # Replay labelled JSONL samples with feedback
//! rwpv --agents agents.toml replay --input samples.jsonl
//!
//! # Same, plus the last 5 feedback events
//! rwpv --agents agents.toml replay --input samples.jsonl --history 5
//!
//! # Tighter per-agent timeout
//! RWPV_AGENT_TIMEOUT_MS=500 rwpv --agents agents.toml replay --input samples.jsonl
//! ```
//!
//! Results are printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rwpv_agents::{load_samples, replay, AgentRoster};
use serde_json::json;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Agent roster TOML file
    #[arg(long, global = true, default_value = "agents.toml")]
    agents: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one feature vector
    Predict {
        /// Comma-separated feature values
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        features: Vec<f64>,
    },
    /// Predict and feed back every sample of a JSONL file
    Replay {
        /// JSONL file of `{"features": [..], "label": 0|1}` lines
        #[arg(long)]
        input: PathBuf,

        /// Also print the last N feedback events
        #[arg(long)]
        history: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let roster = AgentRoster::load(&args.agents)?;
    let engine = roster.build_engine()?;
    info!(
        roster = %args.agents.display(),
        agents = engine.agent_ids().len(),
        "Engine built from roster"
    );

    let output = match args.command {
        Command::Predict { features } => {
            let result = engine
                .predict(&features)
                .await
                .context("Consensus prediction failed")?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Replay { input, history } => {
            let samples = load_samples(&input)?;
            info!(samples = samples.len(), input = %input.display(), "Replaying samples");
            let report = replay(&engine, &samples).await?;
            match history {
                Some(limit) => {
                    let recent = engine.recent_history(limit).await;
                    let combined = json!({ "report": report, "history": recent });
                    serde_json::to_string_pretty(&combined)?
                }
                None => serde_json::to_string_pretty(&report)?,
            }
        }
    };
    println!("{}", output);

    Ok(())
}
