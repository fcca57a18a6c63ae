//! flowhub server binary
//!
//! Composition root: configuration, database, engine, task fabric,
//! HTTP API and graceful shutdown.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowhub::api::routes::{create_router, AppState};
use flowhub::auth::{RemoteTokenVerifier, SharedVerifier, StaticTokenVerifier};
use flowhub::config::ServerConfig;
use flowhub::db::repositories::SqliteCheckpointStore;
use flowhub::db::DatabaseConnection;
use flowhub::fabric::Fabric;
use flowhub::services::{ChatService, ExecutionService, WorkflowService};
use flowhub::shutdown::ShutdownCoordinator;

use flowhub_engine::{EngineConfig, ExecutionEngine, NodeEvaluator};
use flowhub_llm::{ChatClient, ChatModel, LlmConfig, MockChatModel};
use flowhub_skills::{EnvSecretStore, InMemorySkillRegistry, SkillInvoker};

#[derive(Parser, Debug)]
#[command(name = "flowhub-server", about = "Agent workflow platform server")]
struct Args {
    /// Bind address override
    #[arg(long, env = "FLOWHUB_BIND_ADDR")]
    bind: Option<String>,

    /// Disable the automation task fabric
    #[arg(long, default_value_t = false)]
    no_fabric: bool,

    /// Use the mock chat model instead of a provider (local development)
    #[arg(long, default_value_t = false)]
    mock_llm: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    info!(database = %config.database_url, bind = %config.bind_addr, "starting flowhub");

    let db = DatabaseConnection::new(&config.database_url).await?;

    let model: Arc<dyn ChatModel> = if args.mock_llm {
        Arc::new(MockChatModel::new())
    } else {
        Arc::new(ChatClient::new(LlmConfig::from_env()?)?)
    };

    let evaluator = Arc::new(NodeEvaluator::new(
        Arc::clone(&model),
        Arc::new(InMemorySkillRegistry::new()),
        Arc::new(SkillInvoker::new(Arc::new(EnvSecretStore::new()))),
    ));
    let engine = Arc::new(ExecutionEngine::new(
        evaluator,
        Arc::new(SqliteCheckpointStore::new(db.pool().clone())),
        EngineConfig {
            max_concurrency: config.max_concurrency,
            reentry_cap: config.reentry_cap,
            checkpoint_every: config.checkpoint_every,
            ..EngineConfig::default()
        },
    ));

    let verifier: SharedVerifier = match std::env::var("FLOWHUB_IDENTITY_INTROSPECT_URL") {
        Ok(url) => Arc::new(RemoteTokenVerifier::new(url)),
        Err(_) => {
            // Local development accepts FLOWHUB_DEV_TOKEN as "dev" user
            let verifier = StaticTokenVerifier::new();
            let token =
                std::env::var("FLOWHUB_DEV_TOKEN").unwrap_or_else(|_| "dev-token".to_string());
            verifier.insert(token, "dev", true);
            Arc::new(verifier)
        }
    };

    let workflows = WorkflowService::new(db.clone());
    let executions = ExecutionService::new(
        db.clone(),
        engine,
        workflows.clone(),
        config.quota_limit_per_day,
    );
    let chat = ChatService::new(db.clone(), executions.clone());

    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers();

    let fabric_handle = if args.no_fabric {
        None
    } else {
        let fabric = Fabric::build(&config, db.clone(), model);
        let fabric_shutdown = shutdown.clone();
        Some(tokio::spawn(fabric.run(fabric_shutdown)))
    };

    // Cancel in-flight runs the moment shutdown is requested; their
    // event streams end and the listener can drain its connections
    let cancel_shutdown = shutdown.clone();
    let cancel_executions = executions.clone();
    tokio::spawn(async move {
        cancel_shutdown.wait().await;
        cancel_executions.cancel_all();
    });

    let state = AppState {
        db,
        verifier,
        workflows,
        executions: executions.clone(),
        chat: chat.clone(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await?;

    // Cancelled runs still have persisters writing terminal records;
    // flush them before tearing the runtime down
    executions.cancel_all();
    executions.wait_background().await;
    chat.wait_background().await;

    if let Some(handle) = fabric_handle {
        let _ = handle.await;
    }
    info!("flowhub stopped");
    Ok(())
}
