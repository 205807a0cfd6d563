use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_poll_routes;
use agora::config::AppConfig;
use agora::error::AppError;
use agora::polls::{PollService, PollStore};
use agora::store::{MemoryStore, PgStore};
use agora::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(config.environment, &config.telemetry)?;

    match config.storage.database_url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, config.storage.max_connections).await?;
            store.migrate().await?;
            info!(
                max_connections = config.storage.max_connections,
                "postgres store connected"
            );
            serve(config, store).await
        }
        None => {
            warn!("DATABASE_URL not set; polls and votes are kept in memory");
            serve(config, MemoryStore::new()).await
        }
    }
}

pub(crate) async fn migrate() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(config.environment, &config.telemetry)?;

    let url = config.storage.require_database_url()?;
    let store = PgStore::connect(url, config.storage.max_connections).await?;
    store.migrate().await?;
    Ok(())
}

async fn serve<S>(config: AppConfig, store: S) -> Result<(), AppError>
where
    S: PollStore,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let poll_service = Arc::new(PollService::new(Arc::new(store)));

    let app = with_poll_routes(poll_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "poll service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
