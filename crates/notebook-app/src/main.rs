//! kiro-notebook: chat with an ACP agent about the documents in a workspace.
//!
//! This crate is the composition root (DI wiring layer). It assembles the
//! platform adapters, hands them to the session manager, and drives it from
//! a line-oriented command loop.

mod app;
mod commands;
mod stub;


use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notebook_types::{config::NotebookConfig, model::ModelId};

#[derive(Parser)]
#[command(name = "kiro-notebook")]
#[command(about = "Chat with an AI agent about local documents")]
#[command(version)]
struct Cli {
    /// Workspace directory (defaults to the current directory)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Path to the agent CLI (discovered when omitted)
    #[arg(long)]
    cli: Option<String>,

    /// Model to start with, e.g. claude-sonnet-4.6
    #[arg(short, long)]
    model: Option<String>,

    /// Truncate context files longer than this many characters
    #[arg(long)]
    max_context_chars: Option<usize>,
}

impl Cli {
    fn config(&self) -> Result<NotebookConfig> {
        let mut config = NotebookConfig::default();
        if let Some(cli) = &self.cli {
            config.agent.cli_path = Some(cli.clone());
        }
        if let Some(model) = &self.model {
            config.default_model = model.parse::<ModelId>()?;
        }
        if let Some(max) = self.max_context_chars {
            config.agent.max_context_chars = max;
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let workspace = match &cli.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Cannot read current directory")?,
    };
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("Invalid workspace: {}", workspace.display()))?;
    log::info!("kiro-notebook starting in {}", workspace.display());

    // Sessions, adapters and the event bus are single-threaded (Rc/RefCell).
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let app = app::NotebookApp::new(config, workspace).await;
            app.run().await
        })
        .await
}
