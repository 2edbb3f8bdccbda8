//! alert-sync service binary.
//!
//! Receives Keep alert webhooks and Mattermost button callbacks, and runs
//! the poll reconciler alongside the HTTP server.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use alert_sync::{
    server, AlertBackend, AlertProcessor, CallbackProcessor, ChatClient, Config, InMemoryMetrics,
    KeepClient, MattermostClient, MemoryStore, MessageRenderer, MetricsRecorder, Poller,
    SqliteStore, TrackingStore, UserMapper,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting alert-sync...");

    let config = Config::default()
        .validate()
        .context("Invalid configuration")?;
    info!(?config, "Configuration loaded");

    // validate() guarantees these are set
    let mattermost_url = config.mattermost_url.clone().unwrap_or_default();
    let mattermost_token = config.mattermost_token.clone().unwrap_or_default();
    let channel_id = config.channel_id.clone().unwrap_or_default();

    let backend: Arc<dyn AlertBackend> = Arc::new(
        KeepClient::new(&config.keep_url, config.keep_api_key.as_deref())
            .context("Failed to create Keep client")?,
    );
    let chat: Arc<dyn ChatClient> = Arc::new(
        MattermostClient::new(&mattermost_url, &mattermost_token)
            .context("Failed to create Mattermost client")?,
    );

    let store: Arc<dyn TrackingStore> = if let Some(path) = &config.store_path {
        let store = SqliteStore::open(path, config.store_namespace.clone(), config.store_ttl)
            .with_context(|| format!("Failed to open tracking store at {}", path.display()))?;
        info!(path = %path.display(), "Using SQLite tracking store");
        Arc::new(store)
    } else {
        warn!("STORE_PATH not set, tracking state will not survive restarts");
        Arc::new(MemoryStore::with_ttl(
            config.store_namespace.clone(),
            config.store_ttl,
        ))
    };

    let users = Arc::new(if let Some(path) = &config.user_mapping_file {
        let mapper = UserMapper::load(path)
            .with_context(|| format!("Failed to load user mapping from {}", path.display()))?;
        info!(users = mapper.len(), "User mapping loaded");
        mapper
    } else {
        info!("No USER_MAPPING_FILE configured, usernames pass through unmapped");
        UserMapper::default()
    });

    let metrics = Arc::new(InMemoryMetrics::new());
    let recorder: Arc<dyn MetricsRecorder> = metrics.clone();
    let renderer = MessageRenderer::new(config.callback_url.clone());

    let alerts = Arc::new(AlertProcessor::new(
        Arc::clone(&backend),
        Arc::clone(&chat),
        Arc::clone(&store),
        renderer.clone(),
        Arc::clone(&users),
        Arc::clone(&recorder),
        channel_id,
    ));
    let callbacks = Arc::new(CallbackProcessor::new(
        Arc::clone(&backend),
        Arc::clone(&chat),
        Arc::clone(&store),
        renderer.clone(),
        Arc::clone(&users),
        Arc::clone(&recorder),
        config.callback.clone(),
    ));

    // Poll reconciler
    let shutdown = CancellationToken::new();
    let poller_handle = if config.poll_enabled {
        let poller = Poller::new(
            backend,
            chat,
            Arc::clone(&store),
            renderer,
            users,
            recorder,
            config.poll.clone(),
        );
        let token = shutdown.clone();
        Some(tokio::spawn(async move { poller.run(token).await }))
    } else {
        info!("Poll reconciler disabled");
        None
    };

    let state = server::AppState {
        alerts,
        callbacks: Arc::clone(&callbacks),
        metrics,
        webhook_secret: config.webhook_secret.clone(),
    };
    let app = server::build_router(state, config.max_body_bytes);

    let addr = format!("0.0.0.0:{}", config.port);
    server::serve(app, &addr, shutdown_signal())
        .await
        .context("Server error")?;

    // Drain background work before the store goes away
    shutdown.cancel();
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Poll reconciler task failed");
        }
    }
    info!(
        in_flight = callbacks.in_flight(),
        "Waiting for callback background work"
    );
    callbacks.wait().await;
    drop(store);

    info!("alert-sync stopped");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,alert_sync=info"))
        .context("Invalid log filter")?;

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
