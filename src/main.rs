use std::io::Write as _;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use deskpilot::agent::engine::AgentEngine;
use deskpilot::agent::state::RunStatus;
use deskpilot::config;
use deskpilot::errors::PilotResult;
use deskpilot::executor::dispatcher::Executor;
use deskpilot::executor::input::EnigoDriver;
use deskpilot::llm::openai::OpenAiVisionClient;
use deskpilot::perception::screenshot::PrimaryMonitorSource;

/// Drive the computer's mouse and keyboard with a vision-capable model.
#[derive(Parser, Debug)]
#[command(name = "deskpilot", version, about)]
struct Cli {
    /// Vision-capable model identifier (overrides config.toml)
    #[arg(short, long)]
    model: Option<String>,

    /// Objective to accomplish; read interactively when omitted
    #[arg(short, long)]
    prompt: Option<String>,

    /// Upper bound on model-call iterations (overrides config.toml)
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    // Load .env if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "deskpilot failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> PilotResult<ExitCode> {
    let mut cfg = config::load_config()?;
    if let Some(model) = cli.model {
        cfg.llm.model = model;
    }
    if let Some(cap) = cli.max_iterations {
        cfg.session.max_iterations = cap;
    }
    if !cfg.safety.enable_write_filter {
        tracing::warn!("write safety filter is DISABLED; destructive text will be typed verbatim");
    }

    let objective = match cli.prompt {
        Some(p) => p,
        None => read_objective()?,
    };
    if objective.is_empty() {
        tracing::error!("no objective given");
        return Ok(ExitCode::FAILURE);
    }

    let api_key = cfg.llm.resolve_api_key()?;
    let client = OpenAiVisionClient::new(&cfg.llm, api_key)?;
    let driver = EnigoDriver::new()?;
    let executor = Executor::with_write_filter(driver, cfg.safety.enable_write_filter);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after the current action");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut engine = AgentEngine::new(
        client,
        PrimaryMonitorSource,
        executor,
        objective,
        &cfg.session,
        stop,
    );
    let report = engine.run().await;

    match report.status {
        RunStatus::Done => {
            tracing::info!(
                iterations = report.iterations,
                summary = %report.summary,
                "run finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Cancelled => {
            tracing::info!(iterations = report.iterations, "run cancelled");
            Ok(ExitCode::SUCCESS)
        }
        RunStatus::Aborted => {
            tracing::error!(
                iterations = report.iterations,
                error = %report.summary,
                "run aborted"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_objective() -> PilotResult<String> {
    print!("Objective: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
