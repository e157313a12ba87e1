use anyhow::Context;
use iot_data_api::config::Config;
use iot_data_api::db::{self, PgRecordStore};
use iot_data_api::metrics;
use iot_data_api::rest::{self, AppState};
use std::env;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    info!("Starting IoT data API");
    info!(profile = ?config.profile, "Configuration loaded");
    info!("Database: {}:{}/{}", config.database.host, config.database.port, config.database.name);

    metrics::init_metrics().context("failed to register metrics")?;

    let pool = db::make_pool(&config.database)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PgRecordStore::new(pool.clone()));
    let state = AppState::new(store, config.server.readiness_timeout());
    let app = rest::create_router(state, &config.cors, config.server.request_timeout());

    let http_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", http_addr))?;

    info!("HTTP server listening on {}", http_addr);

    let shutdown_started = Arc::new(Notify::new());
    let notify = shutdown_started.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            notify.notify_one();
        })
        .into_future();
    tokio::pin!(server);

    let grace = config.server.shutdown_grace();
    tokio::select! {
        result = &mut server => {
            result.context("HTTP server error")?;
        }
        _ = async {
            shutdown_started.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_secs = grace.as_secs(),
                "Grace period elapsed, abandoning in-flight requests"
            );
        }
    }

    info!("Closing database pool");
    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
}
