//! leadflow-processor - Lead Processing Service
//!
//! Event-driven core of the lead platform: consumes lead lifecycle
//! events from the bus, drives each lead through the classification /
//! enrichment / embedding pipeline, persists vector representations for
//! similarity search, and routes qualified leads to agents.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use leadflow_common::config::load_toml_config;
use leadflow_common::events::BusClient;
use leadflow_processor::config::Settings;
use leadflow_processor::db::{self, SqliteLeadStore};
use leadflow_processor::services::{
    AiServiceClient, EnrichmentResolver, KnowledgeBaseSearcher, RoundRobinStrategy,
    RoutingService, VectorIndexClient,
};
use leadflow_processor::types::{AiService, VectorIndex};
use leadflow_processor::workflow::{
    spawn_subscriptions, ProcessingPipeline, QueueManager, SubscriptionContext,
};
use leadflow_processor::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting leadflow-processor (Lead Processing Service)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (ENV → TOML → defaults)
    let toml_config = load_toml_config(None).context("Failed to load configuration")?;
    let settings = Settings::resolve(&toml_config);

    // Database
    let db_pool = db::init_database_pool(&settings.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", settings.database_path.display());
    let store = Arc::new(SqliteLeadStore::new(db_pool));

    // Bus connection is required; unreachable broker aborts startup
    // (exit code 1) and restart supervision takes over
    let bus = BusClient::connect(&settings.bus_url)
        .await
        .context("Failed to connect to message bus")?;

    // External-provider clients, shared across workers
    let ai: Arc<dyn AiService> = Arc::new(
        AiServiceClient::new(settings.ai.clone()).context("Failed to build AI client")?,
    );
    let index: Arc<dyn VectorIndex> = Arc::new(
        VectorIndexClient::new(settings.vector.clone())
            .context("Failed to build vector index client")?,
    );
    let enrichment = Arc::new(
        EnrichmentResolver::new(settings.enrichment.clone())
            .context("Failed to build enrichment resolver")?,
    );
    let knowledge = Arc::new(KnowledgeBaseSearcher::new(
        ai.clone(),
        index.clone(),
        settings.knowledge_collection.clone(),
    ));

    let pipeline = Arc::new(ProcessingPipeline::new(
        ai,
        index,
        enrichment,
        knowledge,
        settings.pipeline.clone(),
    ));

    // Queue workers bound concurrent pipeline runs
    let queue = Arc::new(QueueManager::new(settings.queue.clone()));
    queue.start_processing(pipeline, Some(bus.clone())).await;

    let routing = Arc::new(RoutingService::new(
        store.clone(),
        Arc::new(RoundRobinStrategy::new(settings.routing_agents.clone())),
        Some(bus.clone()),
    ));

    // Subscription loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = Arc::new(SubscriptionContext {
        queue: queue.clone(),
        routing,
        store: store.clone(),
    });
    let subscription_handles = spawn_subscriptions(bus.clone(), ctx, shutdown_rx.clone());

    // A subscription loop dying outside shutdown is unrecoverable; exit
    // non-zero so an orchestrator restarts the process instead of
    // letting it hang silently
    let monitor_rx = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut loops: FuturesUnordered<_> = subscription_handles.into_iter().collect();
        while let Some(result) = loops.next().await {
            if *monitor_rx.borrow() {
                continue;
            }
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Subscription loop terminated unexpectedly");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "Subscription task panicked");
                    std::process::exit(1);
                }
            }
        }
    });

    // HTTP surface: health + routing status
    let app = leadflow_processor::build_router(AppState::new(store, queue.clone()));
    let addr = format!("{}:{}", settings.server_host, settings.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Graceful shutdown: stop subscriptions, drain in-flight jobs,
    // release the bus connection
    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    queue.close().await;
    if let Err(e) = bus.close().await {
        error!(error = %e, "Bus close failed");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
