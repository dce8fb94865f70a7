//! TDR Backend
//!
//! Caching proxy in front of the GitLab API: keeps the project lists of the
//! tracked TDR groups in memory and passes pipeline requests through.

mod api;
mod auth;
mod catalog;
mod config;
mod errors;
mod gitlab;
mod models;
mod version;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog::{CatalogQuery, CatalogSynchronizer, RefreshOutcome, SnapshotStore};
use config::{Config, DEFAULT_CONFIG_PATH};
use gitlab::{GitLabClient, RemoteCatalog};

/// CORS preflight cache lifetime on the protected routes.
const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "tdr-backend", about = "Caching GitLab proxy for the TDR frontend")]
struct Cli {
    /// Path of the optional YAML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the build snapshot tag and exit
    #[arg(long)]
    version: bool,
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogQuery>,
    pub remote: Arc<dyn RemoteCatalog>,
    pub config: Arc<Config>,
    /// Numeric id of the project whose pipeline is triggered
    pub pipeline_project_id: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if cli.version {
        println!("Build snapshot tag {}", version::snapshot_tag());
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let default_level = if config.debug { "debug" } else { config.log_level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(snapshot = %version::snapshot_tag(), "Starting TDR backend");
    match &config.source {
        Some(path) => tracing::info!("Config file: {:?}", path),
        None => tracing::info!("Config file not found, using environment variables"),
    }
    tracing::info!("GitLab API: {}", config.gitlab_url);
    tracing::info!("Frontend origin: {}", config.frontend_origin);
    tracing::info!("Groups: {:?}", config.groups);
    tracing::info!("Update interval: {}s", config.update_interval_seconds);
    tracing::info!("Commit history window: {} days", config.commit_history_days);

    let remote: Arc<dyn RemoteCatalog> = Arc::new(GitLabClient::new(&config)?);

    // Resolve the pipeline project and the tracked groups; both are fatal on failure
    let pipeline_project = remote
        .get_project(&config.pipeline_project)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to resolve pipeline project"))?;
    tracing::info!("Pipeline project ID: {}", pipeline_project.id);

    let group_ids =
        catalog::resolve_groups(remote.as_ref(), config.parent_group_id, &config.groups)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to resolve groups"))?;

    // Populate the catalog before accepting traffic
    let store = Arc::new(SnapshotStore::new());
    let synchronizer = Arc::new(CatalogSynchronizer::new(
        remote.clone(),
        store.clone(),
        group_ids,
    ));
    match synchronizer.refresh().await {
        RefreshOutcome::Published {
            revision,
            refreshed,
            retained,
            missing,
        } => tracing::info!(revision, refreshed, retained, missing, "Initial catalog loaded"),
        RefreshOutcome::Abandoned { failed } => {
            tracing::warn!(failed, "Initial catalog refresh failed, serving an empty catalog")
        }
        RefreshOutcome::Skipped => {}
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = synchronizer.spawn(config.update_interval(), shutdown_rx);

    let state = AppState {
        catalog: Arc::new(CatalogQuery::new(remote.clone(), store, &config)),
        remote,
        config: Arc::new(config.clone()),
        pipeline_project_id: pipeline_project.id,
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.address).await?;
    tracing::info!("Server listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stopping...");
    let _ = shutdown_tx.send(true);
    sync_handle.await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(frontend_origin(&state.config.frontend_origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([HeaderName::from_static(auth::API_KEY_HEADER), header::CONTENT_TYPE])
        .max_age(CORS_MAX_AGE);

    let api_key: Arc<str> = Arc::from(state.config.api_token.as_str());

    // Key-protected routes
    let api_routes = Router::new()
        .route("/types", get(api::list_types))
        .route("/projects/{id}", get(api::list_projects))
        .route("/commits/{group}/{id}", get(api::get_commits))
        .route("/status/pipeline/{id}", get(api::pipeline_status))
        .route("/trigger", post(api::trigger_pipeline))
        .route_layer(middleware::from_fn(move |req, next| {
            auth::api_key_layer(api_key.clone(), req, next)
        }))
        .layer(cors);

    // Liveness routes (no auth required)
    let public_routes = Router::new()
        .route("/ping", get(api::ping))
        .route("/lastUpdated", get(api::last_updated))
        .route("/version", get(api::version));

    Router::new()
        .merge(api_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn frontend_origin(origin: &str) -> HeaderValue {
    HeaderValue::from_str(origin).unwrap_or_else(|e| {
        tracing::warn!(%origin, error = %e, "Invalid frontend origin, CORS will reject all origins");
        HeaderValue::from_static("null")
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
