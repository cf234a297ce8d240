use std::{
    error::Error,
    str::FromStr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
    serve,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{Subscriber, error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter};

use crate::{
    app_state::AppState,
    db::bootstrap,
    middleware::{
        auth::{AuthState, auth_middleware},
        request_context::{self, RequestIdState},
    },
    routes,
    services::{
        broadcast_bus::BroadcastBus, memory_message_store::InMemoryMessageStore,
        message_gateway::MessageGateway, message_store::MessageStore,
        pg_message_store::PgMessageStore,
    },
    tracer,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide Prometheus recorder, installed on first use.
pub fn metrics_handle() -> PrometheusHandle {
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

/// Builds the log subscriber for `config`, writing through `writer`.
fn build_subscriber<W>(config: &Config, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(writer);

    match config.logging.format {
        LogFormat::Json => Box::new(builder.json().with_ansi(false).finish()),
        LogFormat::Text => Box::new(builder.with_ansi(true).finish()),
    }
}

/// Installs the global log subscriber and returns the configured level. A
/// subscriber installed earlier stays in place.
pub fn initialize_tracing(config: &Config) -> String {
    let subscriber = build_subscriber(config, std::io::stdout);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        warn!("tracing subscriber already installed");
    }
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

/// Creates a database connection pool with the configured statement timeout.
///
/// # Errors
/// Returns an error if the URL is invalid or no connection can be made.
#[allow(clippy::cast_precision_loss)]
pub async fn create_database_pool(
    url: &str,
    db: &DatabaseConfig,
) -> Result<sqlx::PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(url)?
        .options([("statement_timeout", db.statement_timeout_ms.to_string())]);
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect_with(options)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    metrics::gauge!("db_statement_timeout_ms").set(db.statement_timeout_ms as f64);
    Ok(pool)
}

/// Opens, checks and bootstraps the database.
async fn prepare_database(url: &str, db: &DatabaseConfig) -> Result<sqlx::PgPool, Box<dyn Error>> {
    let pool = create_database_pool(url, db).await?;
    bootstrap::ensure_liveness(&pool).await?;
    bootstrap::run(&pool, db).await?;
    bootstrap::ensure_readiness(&pool).await?;
    Ok(pool)
}

/// Creates the application state around the selected message store.
pub fn create_app_state(
    store: Arc<dyn MessageStore>,
    pool: Option<sqlx::PgPool>,
    config: Arc<Config>,
) -> Arc<AppState> {
    let gateway = MessageGateway::new(store, BroadcastBus::new());
    Arc::new(AppState::new(gateway, pool, config))
}

/// Creates the CORS layer for the application.
///
/// An empty origin list allows any origin.
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.server.cors.allow_credentials)
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    cors
}

/// Creates the main application router with all middleware and routes.
///
/// The request id layer is outermost so the trace span and the auth layer see
/// the request context.
pub fn create_app_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let config = Arc::clone(&state.config);
    let request_id_state = RequestIdState::from_config(&config);
    let auth_state = AuthState::from_config(&config);

    Router::new()
        .merge(routes::messages::create_router_messages())
        .merge(routes::health::create_health_router())
        .merge(routes::openapi::openapi_routes())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(metrics_handle))
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
        .layer(create_cors_layer(&config))
        .layer(tracer::create_trace_layer())
        .layer(middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
        .with_state(state)
}

/// Resolves on CTRL+C, then closes every push stream so graceful shutdown
/// does not wait on open SSE connections.
pub async fn create_shutdown_signal(bus: BroadcastBus) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for CTRL+C");
    }
    info!("Shutting down...");
    bus.shutdown();
}

/// Starts the server with the resolved configuration.
///
/// Without a database URL messages are kept in memory for the lifetime of the
/// process.
///
/// # Errors
/// Returns an error if the database cannot be prepared or the listener cannot
/// bind.
pub async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    initialize_tracing(&config);
    info!(profile = %config.profile, "Starting server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);

    let (store, pool): (Arc<dyn MessageStore>, Option<sqlx::PgPool>) = match &config.db.url {
        Some(url) => {
            let pool = prepare_database(url, &config.db).await?;
            (Arc::new(PgMessageStore::new(pool.clone())), Some(pool))
        }
        None => {
            warn!("no database configured; messages are kept in memory");
            (Arc::new(InMemoryMessageStore::new()), None)
        }
    };

    let state = create_app_state(store, pool, Arc::clone(&config));
    let bus = state.bus().clone();
    let app = create_app_router(state, metrics_handle);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    serve(listener, app)
        .with_graceful_shutdown(create_shutdown_signal(bus))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::Value;
    use shared::config::server::Profile;
    use std::{io, sync::Mutex};
    use tower::ServiceExt;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// First line logged for one `info!` event under `format`.
    fn log_line(format: LogFormat) -> String {
        let mut config = Config::default_for_profile(Profile::Dev);
        config.logging.format = format;
        let captured = Captured::default();
        let writer = captured.clone();

        let subscriber = build_subscriber(&config, move || writer.clone());
        tracing::subscriber::with_default(subscriber, || {
            info!(chat = "chat:1", "stream opened");
        });

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn app() -> Router {
        let state = Arc::new(AppState::in_memory(Arc::new(InMemoryMessageStore::new())));
        create_app_router(state, metrics_handle())
    }

    #[test]
    fn initialize_tracing_returns_configured_level() {
        let config = Config::default_for_profile(Profile::Dev);
        assert_eq!(initialize_tracing(&config), config.logging.level);
    }

    #[test]
    fn log_format_selects_json_or_text() {
        let json: Value = serde_json::from_str(&log_line(LogFormat::Json)).unwrap();
        assert_eq!(json["fields"]["message"], "stream opened");
        assert_eq!(json["fields"]["chat"], "chat:1");

        let text = log_line(LogFormat::Text);
        assert!(serde_json::from_str::<Value>(&text).is_err());
        assert!(text.contains("stream opened"), "{text}");
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_counters() {
        metrics::counter!("health_checks_total", "endpoint" => "test").increment(1);

        let response = app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("health_checks_total"));
    }

    #[tokio::test]
    async fn request_id_is_echoed_or_assigned() {
        let echoed = app()
            .oneshot(
                Request::get("/healthz")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(echoed.headers()["x-request-id"], "req-42");

        let assigned = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(
            !assigned.headers()["x-request-id"]
                .to_str()
                .unwrap()
                .is_empty()
        );
    }
}
