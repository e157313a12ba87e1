use crate::config::CorsConfig;
use crate::db::RecordStore;
use crate::errors::Error;
use crate::metrics::{self, READINESS_FAILURES_TOTAL};
use crate::model::{Record, SingleRecordResponse};
use crate::query::{fetch_latest, fetch_records, QueryShape};
use crate::validate::RecordParams;
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub readiness_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, readiness_timeout: Duration) -> Self {
        Self {
            store,
            readiness_timeout,
        }
    }
}

pub fn create_router(state: AppState, cors: &CorsConfig, request_timeout: Duration) -> Router {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/latest", get(latest_record))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/metrics", get(metrics_handler))
        // Paths served by earlier deployments
        .route("/iot-data", get(list_records))
        .route("/iot-data/latest", get(latest_record))
        .route("/readiness", get(readiness))
        .route("/liveness", get(liveness))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the configured origins. Only exact matches are echoed back;
/// every OPTIONS request is answered here and never reaches a handler.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                warn!("Ignoring wildcard CORS origin");
                return None;
            }
            match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring unparsable CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.max_age_secs))
}

async fn list_records(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Record>>, AppError> {
    let params = RecordParams::from_pairs(pairs);
    let shape = QueryShape::from_params(&params, Utc::now()).map_err(|e| {
        warn!(error = %e, ?params, "Rejected record query");
        AppError::from(e)
    })?;

    let records = fetch_records(state.store.as_ref(), shape)
        .await
        .map_err(|e| {
            error!(error = %e, shape = shape.name(), ?params, "Failed to query records");
            AppError::from(e)
        })?;

    Ok(Json(records))
}

async fn latest_record(
    State(state): State<AppState>,
) -> Result<Json<SingleRecordResponse>, AppError> {
    let latest = fetch_latest(state.store.as_ref()).await.map_err(|e| {
        error!(error = %e, shape = QueryShape::Latest.name(), "Failed to query latest record");
        AppError::from(e)
    })?;

    match latest {
        Some(data) => Ok(Json(SingleRecordResponse { data })),
        None => Err(AppError::NotFound("No data found")),
    }
}

async fn readiness(State(state): State<AppState>) -> Response {
    let outcome = tokio::time::timeout(state.readiness_timeout, state.store.ping()).await;

    match outcome {
        Ok(Ok(())) => (StatusCode::OK, "OK").into_response(),
        Ok(Err(e)) => {
            READINESS_FAILURES_TOTAL.inc();
            warn!(error = %e, "Readiness probe failed: database not ready");
            (StatusCode::SERVICE_UNAVAILABLE, "Database not ready").into_response()
        }
        Err(_) => {
            READINESS_FAILURES_TOTAL.inc();
            warn!(
                timeout_ms = state.readiness_timeout.as_millis() as u64,
                "Readiness probe timed out"
            );
            (StatusCode::SERVICE_UNAVAILABLE, "Database not ready").into_response()
        }
    }
}

async fn liveness() -> &'static str {
    "OK"
}

async fn metrics_handler() -> Result<String, AppError> {
    metrics::gather_metrics().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        AppError::from(e)
    })
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(&'static str),
    Internal(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidParameter { name, .. } => {
                AppError::BadRequest(format!("Invalid value for parameter '{}'", name))
            }
            other => AppError::Internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            // Details stay in the logs
            AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
