use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::ServiceConfig;
use crate::predict::{PredictError, PredictionService};
use crate::types::{ErrorResponse, HealthResponse, StatusResponse};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<PredictionService>,
    pub config: Arc<ServiceConfig>,
}

pub fn router(state: ApiState) -> Router {
    let allow_origin = allow_origin_header(&state.config.cors_origin);

    Router::new()
        .route("/", get(index))
        .route("/predict", post(predict).options(preflight))
        .route("/health", get(health))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            allow_origin,
        ))
}

pub async fn serve<F>(state: ApiState, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[API] Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index(State(state): State<ApiState>) -> Response {
    match tokio::fs::read_to_string(&state.config.index_path).await {
        Ok(html) => Html(html).into_response(),
        Err(error) => {
            log::warn!(
                "[API] Cannot read index page {}: {}",
                state.config.index_path.display(),
                error
            );
            (StatusCode::NOT_FOUND, "Index page not found").into_response()
        }
    }
}

async fn preflight() -> impl IntoResponse {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST"),
        ],
        Json(StatusResponse { status: "ok" }),
    )
}

async fn predict(State(state): State<ApiState>, body: Bytes) -> Response {
    let result = serde_json::from_slice::<Value>(&body)
        .map_err(|error| PredictError::Validation(format!("Invalid JSON body: {}", error)))
        .and_then(|payload| state.service.predict(&payload));

    match result {
        Ok(prediction) => (StatusCode::OK, Json(prediction)).into_response(),
        Err(error) => {
            match &error {
                PredictError::Validation(message) => log::debug!("[PREDICT] Rejected: {}", message),
                PredictError::ModelUnavailable => log::warn!("[PREDICT] Request without model"),
                PredictError::Internal(message) => log::error!("[PREDICT] {}", message),
            }
            let status = error_status(&error, state.config.strict_status);
            (
                status,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.service.model_loaded(),
    })
}

fn error_status(error: &PredictError, strict: bool) -> StatusCode {
    if !strict {
        return StatusCode::OK;
    }

    match error {
        PredictError::Validation(_) => StatusCode::BAD_REQUEST,
        PredictError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn allow_origin_header(origin: &str) -> HeaderValue {
    origin
        .trim()
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("*"))
}
