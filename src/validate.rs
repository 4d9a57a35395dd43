//! Request validation for `POST /`.
//!
//! Checks run in a fixed order and stop at the first failure:
//! content type, declared length, size cap, JSON syntax, `ticket` presence,
//! ticket length.  Nothing here performs IO.

use serde_json::Value;

use crate::codec::ApiError;

pub const DEFAULT_TICKET_ID: &str = "N/A";

#[derive(Debug, Clone, Copy)]
pub struct TicketLimits {
    /// Maximum ticket length in characters after trimming.
    pub max_ticket_chars: usize,
    /// Hard cap on the request body in bytes.
    pub max_request_bytes: usize,
}

impl Default for TicketLimits {
    fn default() -> Self {
        Self {
            max_ticket_chars: crate::config::DEFAULT_MAX_TICKET_CHARS,
            max_request_bytes: crate::config::DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

/// A ticket that passed validation.
///
/// `ticket_id` is whatever JSON value the caller sent, echoed back as is.
/// Only an absent key is replaced by [`DEFAULT_TICKET_ID`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    ticket: String,
    ticket_id: Value,
}

impl AnalysisRequest {
    /// Build a request directly, applying the same trimming and defaulting
    /// as [`validate`].  Length limits are not checked here.
    pub fn new(ticket: &str, ticket_id: Option<Value>) -> Self {
        Self {
            ticket: ticket.trim().to_string(),
            ticket_id: ticket_id.unwrap_or_else(|| Value::from(DEFAULT_TICKET_ID)),
        }
    }

    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    pub fn ticket_id(&self) -> &Value {
        &self.ticket_id
    }
}

/// First check of the chain, usable before the body has been read.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    let declares_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if declares_json {
        Ok(())
    } else {
        Err(ApiError::bad_content_type())
    }
}

/// Validate a raw `POST /` payload.
///
/// `content_length` is the declared `Content-Length`; when the header is
/// absent (chunked uploads) the buffered body length is used instead.
pub fn validate(
    content_type: Option<&str>,
    content_length: Option<u64>,
    body: &[u8],
    limits: &TicketLimits,
) -> Result<AnalysisRequest, ApiError> {
    check_content_type(content_type)?;

    let length = content_length.unwrap_or(body.len() as u64);
    if length == 0 {
        return Err(ApiError::no_content());
    }
    if length > limits.max_request_bytes as u64 {
        return Err(ApiError::payload_too_large());
    }

    let payload: Value = serde_json::from_slice(body).map_err(|_| ApiError::invalid_json())?;

    let ticket = payload
        .get("ticket")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(ApiError::missing_ticket)?;

    if ticket.chars().count() > limits.max_ticket_chars {
        return Err(ApiError::ticket_too_long(limits.max_ticket_chars));
    }

    let ticket_id = payload
        .get("ticket_id")
        .cloned()
        .unwrap_or_else(|| Value::from(DEFAULT_TICKET_ID));

    Ok(AnalysisRequest {
        ticket: ticket.to_string(),
        ticket_id,
    })
}
