//! Wire envelope for the assistant.
//!
//! Successful analyses serialise as `{ticket_id, analysis}`, failures as
//! `{error}`.  Serialisation itself never fails outward: anything that cannot
//! be encoded degrades to a fixed `500` body.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

pub const SERVICE_NAME: &str = "bedrock-support-assistant";

const INTERNAL_ERROR_BODY: &str = r#"{"error":"Internal server error"}"#;

/// Caller-facing error.  Only carries a safe message; provider detail is
/// logged where the error is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_content_type() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "Content-Type must be application/json",
        )
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "No content provided")
    }

    pub fn payload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    }

    pub fn invalid_json() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid JSON")
    }

    pub fn missing_ticket() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Missing or empty 'ticket' field")
    }

    pub fn ticket_too_long(limit: usize) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Ticket exceeds maximum length of {} characters", limit),
        )
    }

    pub fn service_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Bedrock service unavailable")
    }

    pub fn throttled() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Service temporarily unavailable (throttled)",
        )
    }

    pub fn access_denied() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "Access denied - check AWS credentials and permissions",
        )
    }

    pub fn bedrock_error() -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "Bedrock service error")
    }

    pub fn aws_error() -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "AWS service error")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        json_response(
            self.status,
            &ErrorBody {
                error: &self.message,
            },
        )
    }
}

/// Model output as returned to the caller.  Parsed JSON is passed through
/// untouched; anything else is wrapped as `{"analysis": <text>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    Structured(Value),
    Raw { analysis: String },
}

impl Analysis {
    /// Interpret raw model text.  The four requested keys are not checked.
    pub fn from_model_text(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Analysis::Structured(value),
            Err(_) => Analysis::Raw {
                analysis: raw.to_string(),
            },
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Analysis::Structured(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub ticket_id: Value,
    pub analysis: Analysis,
}

impl IntoResponse for AnalysisResult {
    fn into_response(self) -> Response {
        json_response(StatusCode::OK, &self)
    }
}

/// Liveness payload, built fresh for every probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
    pub region: String,
    pub model: String,
}

impl HealthStatus {
    pub fn now(region: &str, model: &str) -> Self {
        Self {
            status: "healthy",
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            service: SERVICE_NAME,
            region: region.to_string(),
            model: model.to_string(),
        }
    }
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        json_response(StatusCode::OK, &self)
    }
}

/// Encode `body` as a JSON response with the given status.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_json_content_type(status, bytes),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialise response body");
            internal_error_response()
        }
    }
}

/// Fixed `500` body that needs no serialisation.
pub fn internal_error_response() -> Response {
    with_json_content_type(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR_BODY.as_bytes().to_vec(),
    )
}

fn with_json_content_type(status: StatusCode, bytes: Vec<u8>) -> Response {
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )],
        bytes,
    )
        .into_response()
}
