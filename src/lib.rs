//! Core library for the support assistant.  This module wires together
//! validation, the ticket analyzer and the HTTP surface:
//!
//! * `POST /` analyses a ticket (so does `POST` on any other path),
//! * `GET /health` is a liveness probe,
//! * `OPTIONS` on any path answers cross-origin preflight.
//!
//! Every response carries permissive CORS headers and every failure is a
//! JSON `{"error": ...}` body.

pub mod analysis;
pub mod codec;
mod config;
pub mod inference;
pub mod telemetry;
pub mod validate;

pub use config::{AppConfig, RotationConfig, SinkConfig};

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use crate::analysis::TicketAnalyzer;
pub use crate::codec::{Analysis, AnalysisResult, ApiError, HealthStatus};
pub use crate::inference::{BedrockClient, GenerationParams, InferenceClient, InferenceError};
pub use crate::telemetry::TelemetrySink;
pub use crate::validate::{AnalysisRequest, TicketLimits};

/// Application state shared across handlers.  Everything in here is
/// read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: TicketAnalyzer,
    pub limits: TicketLimits,
    pub region: String,
    pub model_id: String,
    pub telemetry: TelemetrySink,
}

impl AppState {
    /// Assemble state around an explicit client (or none).  Used by
    /// [`build_state`] and by tests that substitute a double.
    pub fn with_client(
        config: &AppConfig,
        client: Option<Arc<dyn InferenceClient>>,
        telemetry: TelemetrySink,
    ) -> Self {
        let params = GenerationParams {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_millis(config.inference_timeout_ms),
        };
        Self {
            analyzer: TicketAnalyzer::new(client, params, telemetry.clone()),
            limits: TicketLimits {
                max_ticket_chars: config.max_ticket_chars,
                max_request_bytes: config.max_request_bytes,
            },
            region: config.region.clone(),
            model_id: config.model_id.clone(),
            telemetry,
        }
    }
}

/// Build state from a resolved configuration.  A Bedrock client that cannot
/// be constructed is logged and left out; analysis requests then answer 503.
pub fn build_state(config: &AppConfig) -> AppState {
    let telemetry = TelemetrySink::from_config(&config.sinks);
    let endpoint = config.resolved_endpoint();
    let client: Option<Arc<dyn InferenceClient>> =
        match BedrockClient::new(&endpoint, &config.model_id, config.bearer_token.clone()) {
            Ok(client) => {
                telemetry.info(
                    "inference_client_ready",
                    json!({
                        "region": config.region,
                        "endpoint": endpoint,
                        "model": config.model_id,
                        "bearer_auth": config.bearer_token.is_some(),
                    }),
                );
                Some(Arc::new(client))
            }
            Err(err) => {
                telemetry.error(
                    "inference_client_failed",
                    json!({ "endpoint": endpoint, "error": format!("{:#}", err) }),
                );
                None
            }
        };
    telemetry.info(
        "sinks_configured",
        json!({
            "log_file": telemetry.has_file(),
            "collector": telemetry.has_collector(),
        }),
    );
    AppState::with_client(config, client, telemetry)
}

/// Build state from environment variables.  See [`AppConfig::from_env`] for
/// the variables read.
pub fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    Ok(build_state(&config))
}

/// Build the Axum router and attach handlers and layers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.limits.max_request_bytes;

    Router::new()
        .route(
            "/",
            post(analyze_handler)
                .options(preflight_handler)
                .fallback(fallback_handler),
        )
        .route(
            "/health",
            get(health_handler)
                .options(preflight_handler)
                .fallback(fallback_handler),
        )
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .with_state(state)
}

/// Handler for `POST /`.  Validates the payload, runs the analyzer and
/// renders either the analysis or the mapped error.
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let body = match body {
        Ok(bytes) => bytes,
        Err(rejection) => return handle_body_rejection(&state, content_type, rejection),
    };

    let req = match validate::validate(content_type, content_length, &body, &state.limits) {
        Ok(req) => req,
        Err(err) => {
            state.telemetry.warn(
                "request_rejected",
                json!({ "status": err.status.as_u16(), "error": err.message }),
            );
            return err.into_response();
        }
    };

    match state.analyzer.analyze(&req).await {
        Ok(result) => result.into_response(),
        Err(err) => err.into_response(),
    }
}

fn handle_body_rejection(
    state: &AppState,
    content_type: Option<&str>,
    rejection: BytesRejection,
) -> Response {
    if let Err(err) = validate::check_content_type(content_type) {
        return err.into_response();
    }
    let err = match rejection {
        BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
            ApiError::payload_too_large()
        }
        other => {
            state.telemetry.warn(
                "body_unreadable",
                json!({ "error": other.body_text() }),
            );
            ApiError::invalid_json()
        }
    };
    state.telemetry.warn(
        "request_rejected",
        json!({ "status": err.status.as_u16(), "error": err.message }),
    );
    err.into_response()
}

/// Liveness probe.  Reports only that the process answers.
async fn health_handler(State(state): State<AppState>) -> Response {
    state.telemetry.info("health_check", serde_json::Value::Null);
    HealthStatus::now(&state.region, &state.model_id).into_response()
}

async fn preflight_handler() -> Response {
    StatusCode::OK.into_response()
}

/// Catch-all for unmatched paths and methods.  `POST` is analysed whatever
/// the path, `OPTIONS` is a preflight, anything else is 404.
async fn fallback_handler(
    method: Method,
    state: State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method == Method::POST {
        return analyze_handler(state, headers, body).await;
    }
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    ApiError::not_found().into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");
    codec::internal_error_response()
}
