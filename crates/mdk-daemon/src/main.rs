//! mdk-daemon entry point.
//!
//! Loads config, sets up tracing, picks the store backend, wires middleware,
//! and starts the HTTP server. Handlers live in `routes.rs`; shared state in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mdk_audit::AuditWriter;
use mdk_config::{
    load_layered_yaml, report_unused_keys, ConfigProfile, DeskConfig, StoreBackend,
    UnusedKeyPolicy,
};
use mdk_daemon::{routes, state};
use mdk_db::{MemoryMemoStore, PgMemoStore};
use mdk_lifecycle::LifecycleService;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Comma-separated YAML layers, base first.
const ENV_CONFIG_PATHS: &str = "MDK_CONFIG_PATHS";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let paths_raw = std::env::var(ENV_CONFIG_PATHS).unwrap_or_default();
    let paths: Vec<&str> = paths_raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = load_layered_yaml(&paths)?;
    let cfg = loaded.desk()?;

    init_tracing(&cfg.logging.filter);
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    let unused = report_unused_keys(
        ConfigProfile::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "unused config key");
    }

    let (service, backend) = build_service(&cfg).await?;
    let shared = Arc::new(state::AppState::new(Arc::new(service), backend));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cfg
        .daemon_addr()
        .parse()
        .with_context(|| format!("invalid daemon address: {}", cfg.daemon_addr()))?;
    info!(store = backend, "mdk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

async fn build_service(cfg: &DeskConfig) -> anyhow::Result<(LifecycleService, &'static str)> {
    let capacity = cfg.subscriptions.change_feed_capacity;

    let (service, backend) = match cfg.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryMemoStore::with_feed_capacity(capacity));
            (LifecycleService::from_store(store), "memory")
        }
        StoreBackend::Postgres => {
            let url = cfg.resolve_database_url()?;
            let pool = mdk_db::connect(&url, cfg.store.max_connections).await?;
            mdk_db::migrate(&pool).await?;
            let store = Arc::new(PgMemoStore::with_feed_capacity(pool, capacity));
            (LifecycleService::from_store(store), "postgres")
        }
    };

    let service = match &cfg.audit.path {
        Some(path) => {
            let writer = AuditWriter::resume(path, cfg.audit.hash_chain)
                .with_context(|| format!("open audit trail {path}"))?;
            info!(path = %path, events = writer.seq(), "audit trail attached");
            service.with_audit(writer)
        }
        None => service,
    };

    Ok((service, backend))
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
