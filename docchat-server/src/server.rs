use anyhow::Context;
use axum::{Extension, Router, middleware, response::IntoResponse, routing::get, serve};
use shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::{
    app_state::AppState,
    db::bootstrap,
    middleware::{
        auth::auth_middleware,
        request_context::{self, RequestIdState},
    },
    routes,
    services::{
        chat_stream::{ChatStreamManager, SharedStreams, StreamSettings},
        completion_client::HttpCompletionClient,
    },
    tracer,
};
use axum::http::{HeaderValue, StatusCode, header};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus handle. Falls back to a detached recorder when another
/// global recorder is already installed.
pub fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the global tracing subscriber from the logging configuration.
///
/// Returns the configured level. A subscriber installed earlier is left in place.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let _ = if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).try_init()
    } else {
        fmt_builder.with_ansi(true).try_init()
    };

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Connects to PostgreSQL.
///
/// # Errors
/// Returns an error if no URL is configured or the pool cannot connect.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let url = db
        .url
        .as_deref()
        .ok_or_else(|| sqlx::Error::Configuration("database url is not set".into()))?;
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| http::HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(config.server.cors.allow_credentials);
    }

    cors
}

/// Routes mounted under `/api`, all behind the auth middleware.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(routes::chat::create_chat_router())
        .merge(routes::documents::create_documents_router())
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Builds the application with a fresh stream hub sized from `config.sse`.
pub fn create_app_router(
    state: Arc<AppState>,
    config: Arc<Config>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let streams: SharedStreams = Arc::new(ChatStreamManager::new(StreamSettings::from(
        &config.sse,
    )));
    create_app_router_with_streams(state, config, metrics_handle, streams)
}

/// Builds the application around an existing stream hub.
pub fn create_app_router_with_streams(
    state: Arc<AppState>,
    config: Arc<Config>,
    metrics_handle: PrometheusHandle,
    streams: SharedStreams,
) -> Router {
    let cors = create_cors_layer(&config);
    let request_id_state = RequestIdState::from_config(&config);

    Router::new()
        .nest("/api", create_api_router())
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(Extension(streams))
        .layer(Extension(config))
        .layer(Extension(metrics_handle))
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .layer(cors)
}

/// Resolves when the process receives Ctrl+C.
pub async fn create_shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

async fn create_app_state(config: &Config) -> anyhow::Result<AppState> {
    let client = Arc::new(
        HttpCompletionClient::new(config.llm.clone()).context("building completion client")?,
    );

    if config.db.url.is_none() {
        warn!("no database configured, chats are kept in memory");
        return Ok(AppState::in_memory(client, config.llm.clone()));
    }

    let pool = create_database_pool(&config.db)
        .await
        .context("connecting to database")?;
    bootstrap::ensure_liveness(&pool)
        .await
        .context("database liveness check")?;
    bootstrap::run(&pool).await?;
    bootstrap::ensure_readiness(&pool)
        .await
        .context("database readiness check")?;

    Ok(AppState::postgres(pool, client, config.llm.clone()))
}

/// Starts the server and serves until shutdown.
///
/// # Errors
/// Returns an error if storage cannot be prepared or the listener cannot bind.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!(profile = ?config.profile, "starting docchat server");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);
    let state = Arc::new(create_app_state(&config).await?);

    let app = create_app_router(state, Arc::clone(&config), metrics_handle);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Listening on {}", addr);

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    Ok(())
}
