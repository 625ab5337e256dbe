//! Agent-SRE service entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agent_memory::{DomainMemoryManager, MemoryConfig};
use agent_sre::config::{AgentConfig, OperationMode};
use agent_sre::few_shot::ExampleDatabase;
use agent_sre::lambda::LambdaInvoker;
use agent_sre::rag::RemediationRag;
use agent_sre::selection::{LlmClient, RecursiveReasoner, RemediationSelector};
use agent_sre::server::{build_router, AppState};
use agent_sre::workflow::WorkflowEngine;
use approvals::ApprovalManager;
use notify::Notifier;

const APPROVAL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// AI-augmented SRE remediation agent.
#[derive(Parser)]
#[command(name = "agent-sre")]
#[command(about = "Receives Prometheus alerts as CloudEvents and drives remediations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the CloudEvent sink and approval callback server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080", env = "PORT")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port } => serve(port).await,
    }
}

async fn serve(port: u16) -> Result<()> {
    let config = AgentConfig::from_env();

    let memory = Arc::new(DomainMemoryManager::new(&MemoryConfig::from_env()));
    memory
        .connect()
        .await
        .context("failed to connect memory stores")?;

    let approvals = if config.operation_mode == OperationMode::Supervised {
        let manager = Arc::new(ApprovalManager::from_env());
        manager.spawn_timeout_sweep(APPROVAL_SWEEP_INTERVAL);
        info!("approval manager initialized");
        Some(manager)
    } else {
        None
    };

    let notifier = Arc::new(Notifier::from_env());
    let rag = Arc::new(RemediationRag::with_hash_embedder());
    let examples = Arc::new(ExampleDatabase::load(&config.example_db_path));

    let selector = Arc::new(RemediationSelector::new(
        RecursiveReasoner::new(&config.reasoner_url, config.trm_model_path.clone()),
        LlmClient::new(config.llm_url.clone()),
        Arc::clone(&rag),
        Arc::clone(&examples),
    ));
    let invoker = Arc::new(LambdaInvoker::new(&config.lambda_namespace));

    let engine = Arc::new(WorkflowEngine::new(
        config.clone(),
        selector,
        invoker,
        approvals.clone(),
        Arc::clone(&memory),
        notifier,
        rag,
        examples,
    ));

    let state = Arc::new(AppState::new(engine, approvals, Arc::clone(&memory)));
    state.mark_ready();

    let router = build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!(
        port,
        operation_mode = ?config.operation_mode,
        "agent started"
    );

    axum::serve(listener, router)
        .await
        .context("server error")?;

    memory.disconnect().await.ok();
    Ok(())
}
