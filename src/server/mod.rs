//! HTTP boundary for the analysis pipeline.
//!
//! Routes:
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/analyze`, `/` | run the pipeline on an [`AnalysisRequest`] |
//! | `GET` | `/health` | liveness and version |
//!
//! The pipeline is blocking, so each analysis runs on Tokio's blocking pool
//! inside the caller's request context.

use crate::models::AnalysisRequest;
use crate::observability::{
    REQUEST_ID_HEADER, RequestContext, enter_request_context, scope_request_context,
};
use crate::services::{ClinicalBrainService, SERVICE_VERSION};
use crate::{Error, Result};
use axum::extract::rejection::StringRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
struct AppState {
    service: Arc<ClinicalBrainService>,
    max_body_bytes: usize,
}

/// Error envelope returned for every failed request.
#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// An error response with its status code.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                error: error.into(),
                details,
            },
        }
    }

    fn too_large(max: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body too large",
            Some(format!("max: {max} bytes")),
        )
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => Self::new(StatusCode::BAD_REQUEST, message, None),
            Error::UnknownTier(tier) => Self::new(
                StatusCode::BAD_REQUEST,
                "unknown model tier",
                Some(tier),
            ),
            Error::Invocation(e) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "model invocation failed",
                Some(e.code().to_string()),
            ),
            Error::Parsing { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "model response could not be parsed",
                None,
            ),
            Error::Selection(_) | Error::OperationFailed { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
                None,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

/// Builds the router.
///
/// Bodies above `max_body_bytes` are rejected with 413.
pub fn router(service: Arc<ClinicalBrainService>, max_body_bytes: usize) -> Router {
    let state = AppState {
        service,
        max_body_bytes,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    Router::new()
        .route("/", post(analyze))
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves the router until the process is interrupted.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    service: Arc<ClinicalBrainService>,
    addr: &str,
    max_body_bytes: usize,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "bind".to_string(),
            cause: format!("{addr}: {e}"),
        })?;

    tracing::info!(addr, max_body_bytes, "Clinical brain server listening");

    axum::serve(listener, router(service, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::OperationFailed {
            operation: "serve".to_string(),
            cause: e.to_string(),
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: SERVICE_VERSION,
    })
}

async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<String, StringRejection>,
) -> Response {
    let context = RequestContext::from_header_value(
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );
    let request_id = context.request_id().to_string();

    let mut response = scope_request_context(context.clone(), async move {
        match handle_analyze(state, context, body).await {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(err) => err.into_response(),
        }
    })
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn handle_analyze(
    state: AppState,
    context: RequestContext,
    body: std::result::Result<String, StringRejection>,
) -> std::result::Result<crate::models::AnalysisResponse, ApiError> {
    let body = body.map_err(|rejection| {
        let status = rejection.status();
        tracing::warn!(status = status.as_u16(), error = %rejection, "Request body rejected");
        metrics::counter!("clinical_brain_requests_total", "status" => "rejected").increment(1);
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::too_large(state.max_body_bytes)
        } else {
            ApiError::new(status, "invalid request body", Some(rejection.body_text()))
        }
    })?;

    let request: AnalysisRequest = serde_json::from_str(&body).map_err(|e| {
        tracing::info!(error = %e, "Malformed analysis request");
        metrics::counter!("clinical_brain_requests_total", "status" => "malformed").increment(1);
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "malformed JSON body",
            Some(e.to_string()),
        )
    })?;

    let service = Arc::clone(&state.service);
    let span = context.span("analyze");
    tokio::task::spawn_blocking(move || {
        let _context = enter_request_context(context);
        let _span = span.enter();
        service.analyze(&request)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Analysis task failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error", None)
    })?
    .map_err(ApiError::from)
}
