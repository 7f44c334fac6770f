//! Server assembly and lifecycle.

use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use axum::http::{HeaderValue, StatusCode, header};
use axum::{Extension, Router, response::IntoResponse, routing::get, serve};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    app_state::AppState,
    db::bootstrap,
    handlers::socket::ws_handler,
    registry::InProcessRegistry,
    router::EventRouter,
    routes,
    store::PgChatStore,
};

const DB_MAX_CONNECTIONS: u32 = 10;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
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

/// Initializes the tracing subscriber for logging using the provided configuration.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    if matches!(config.log_format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).init();
    } else {
        fmt_builder.with_ansi(true).init();
    }

    config.log_level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates a database connection pool from the configured URL.
///
/// # Errors
/// Returns an error if the database connection pool cannot be created.
pub async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect(&config.database_url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(DB_MAX_CONNECTIONS));
    Ok(pool)
}

/// Creates the application state with the given database pool.
pub fn create_app_state(pool: Option<sqlx::PgPool>) -> Arc<AppState> {
    Arc::new(AppState { pool })
}

/// Creates the CORS layer for the application.
///
/// Socket clients come from the marketplace web origin; credentials never
/// ride on these endpoints, so any-origin is acceptable here.
pub fn create_cors_layer() -> CorsLayer {
    use http::Method;

    CorsLayer::new()
        .allow_methods(AllowMethods::list(vec![Method::GET, Method::POST]))
        .allow_headers(AllowHeaders::any())
        .allow_origin(AllowOrigin::any())
}

/// Creates the main application router with all middleware and routes.
pub fn create_app_router(
    state: Arc<AppState>,
    event_router: Arc<EventRouter>,
    metrics_handle: PrometheusHandle,
) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(event_router))
        .layer(Extension(metrics_handle))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Creates the graceful shutdown signal handler.
pub async fn create_shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install CTRL+C signal handler");
        return;
    }
    info!("Shutting down...");
}

/// Starts the socket server and binds it to the configured port.
///
/// # Errors
/// Returns an error if the database is unreachable or the listener fails.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    initialize_tracing(&config);
    info!("Starting server...");

    let metrics_handle = metrics_handle();

    let pool = create_database_pool(&config)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    bootstrap::ensure_liveness(&pool)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    bootstrap::run(&pool)
        .await
        .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;

    let state = create_app_state(Some(pool.clone()));
    let event_router = Arc::new(EventRouter::new(
        Arc::new(PgChatStore::new(pool)),
        Arc::new(InProcessRegistry::new()),
    ));

    let app = create_app_router(state, event_router, metrics_handle.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let shutdown_signal = create_shutdown_signal();

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
