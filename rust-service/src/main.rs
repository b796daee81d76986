//! Kindling server - HTTP front end and worker pool in one process.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kindling::collab::{KindlegenConverter, MercuryClient, PostmarkClient};
use kindling::{
    AppState, BounceGuard, Config, Dispatcher, Intake, KvStore, MemoryStore, Pipeline,
    StatusStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        redis_configured = config.redis_url.is_some(),
        mercury_token_set = !config.mercury_token.is_empty(),
        postmark_token_set = !config.postmark_token.is_empty(),
        kindlegen_binary = %config.kindlegen_binary,
        workers = config.worker_concurrency,
        queue_capacity = config.queue_capacity,
        "config_loaded"
    );

    let store = connect_store(&config).await?;
    let statuses = StatusStore::new(Arc::clone(&store), config.status_ttl());
    let bounces = BounceGuard::new(store, config.bounce_ttl());

    // Shared HTTP client for the collaborators
    let client = Client::builder()
        .pool_max_idle_per_host(16)
        .build()
        .context("Failed to create HTTP client")?;

    let pipeline = Pipeline {
        extractor: Arc::new(MercuryClient::new(
            client.clone(),
            config.mercury_url.clone(),
            config.mercury_token.clone(),
            config.request_timeout(),
        )),
        converter: Arc::new(KindlegenConverter::new(config.kindlegen_binary.clone())),
        mailer: Arc::new(PostmarkClient::new(
            client,
            config.postmark_url.clone(),
            config.postmark_token.clone(),
            config.from.clone(),
            config.request_timeout(),
        )),
        statuses: statuses.clone(),
        bounces: bounces.clone(),
    };

    let dispatcher = Dispatcher::run(config.worker_concurrency, config.queue_capacity, pipeline);
    let intake = Intake::new(dispatcher.clone(), bounces);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = kindling::web::router(AppState::new(intake, statuses));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let in-flight jobs finish
    dispatcher.shutdown().await;

    info!("server_shutdown_complete");

    Ok(())
}

#[cfg(feature = "redis")]
async fn connect_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    match &config.redis_url {
        Some(url) => {
            let store = kindling::store::RedisStore::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(store))
        }
        None => {
            info!("store_in_memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    if config.redis_url.is_some() {
        anyhow::bail!("REDIS_URL is set but the binary was built without the redis feature");
    }
    info!("store_in_memory");
    Ok(Arc::new(MemoryStore::new()))
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("server_shutting_down");
}
