//! MovieMate API Gateway
//!
//! The HTTP surface for chat sessions.
//! Handles:
//! - Session lifecycle (create, inspect, reset, close)
//! - Message answering as JSON or as an SSE stream
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;
#[cfg(test)]
mod test_support;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use moviemate_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    llm::create_language_model,
    metrics,
};
use moviemate_search::{create_index, load_chunks_jsonl, ChunkIndexer};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Logging settings come from the config, so load it before tracing
    let config = AppConfig::load();
    init_tracing(
        &config
            .as_ref()
            .map(|c| c.observability.clone())
            .unwrap_or_default(),
    );

    info!("Starting MovieMate API Gateway v{}", moviemate_common::VERSION);

    let config = config.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    install_metrics_exporter(&config.observability)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = build_state(config).await?;

    // Build the router
    let app = create_router(state);

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Serve Prometheus metrics on their own port (0 disables)
fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            metrics::EMBEDDING_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Wire the providers and the index, seeding a memory index when configured
async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_language_model(&config.llm)?;
    let index = create_index(&config.index, config.embedding.dimension)?;

    info!(
        embedder = embedder.model_name(),
        llm = llm.model_name(),
        index = %config.index.provider,
        mode = %config.chat.mode,
        "Components ready"
    );

    if let Some(path) = &config.index.seed_path {
        let chunks = load_chunks_jsonl(path).await?;
        let written = ChunkIndexer::new(embedder.clone(), index.clone())
            .with_batch_size(config.embedding.batch_size)
            .index_chunks(chunks)
            .await?;
        info!(path = %path, chunks = written, "Seeded vector index");
    }

    Ok(AppState::new(config, embedder, llm, index))
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/sessions/{id}/reset", post(handlers::sessions::reset_session))
        .route("/sessions/{id}/messages", post(handlers::chat::send_message))
        .route_layer(axum::middleware::from_fn(middleware::track_requests));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
