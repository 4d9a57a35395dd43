//! Ticket analysis: prompt construction, the inference call and mapping of
//! its outcome onto the caller-facing contract.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::codec::{Analysis, AnalysisResult, ApiError};
use crate::inference::{GenerationParams, InferenceClient, InferenceError};
use crate::telemetry::TelemetrySink;
use crate::validate::AnalysisRequest;

pub const SYSTEM_PROMPT: &str = "You are a support ticket analyzer. Analyze the following support ticket and provide:
1. A brief summary (1-2 sentences)
2. Severity level (critical, high, medium, low)
3. Category (technical, billing, account, other)
4. Suggested response to send to the customer

Format your response as JSON with fields: summary, severity, category, suggested_response";

/// Full prompt sent to the model for one ticket.
pub fn build_prompt(ticket: &str) -> String {
    format!("{}\n\nSupport Ticket:\n{}", SYSTEM_PROMPT, ticket)
}

/// Caller-facing error for a failed inference call.
pub fn map_inference_error(err: &InferenceError) -> ApiError {
    match err {
        InferenceError::Throttled(_) => ApiError::throttled(),
        InferenceError::AccessDenied(_) => ApiError::access_denied(),
        InferenceError::Service { .. } => ApiError::bedrock_error(),
        InferenceError::Transport(_) | InferenceError::Timeout(_) => ApiError::aws_error(),
        InferenceError::Malformed(_) => ApiError::internal(),
    }
}

/// Runs one ticket through the model.  Holds the shared client handle;
/// cloning is cheap and every call is independent.
#[derive(Clone)]
pub struct TicketAnalyzer {
    client: Option<Arc<dyn InferenceClient>>,
    params: GenerationParams,
    telemetry: TelemetrySink,
}

impl TicketAnalyzer {
    pub fn new(
        client: Option<Arc<dyn InferenceClient>>,
        params: GenerationParams,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            client,
            params,
            telemetry,
        }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub async fn analyze(&self, req: &AnalysisRequest) -> Result<AnalysisResult, ApiError> {
        let Some(client) = self.client.as_ref() else {
            self.telemetry.warn(
                "inference_unavailable",
                json!({ "ticket_id": req.ticket_id() }),
            );
            return Err(ApiError::service_unavailable());
        };

        let prompt = build_prompt(req.ticket());
        let start = Instant::now();
        // The client carries its own timeout; this bounds test doubles and
        // any client that ignores it.
        let outcome = match tokio::time::timeout(
            self.params.timeout,
            client.invoke(&prompt, &self.params),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(InferenceError::Timeout(self.params.timeout.as_millis() as u64)),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(raw) => {
                let analysis = Analysis::from_model_text(&raw);
                self.telemetry.info(
                    "ticket_analyzed",
                    json!({
                        "ticket_id": req.ticket_id(),
                        "model": client.model_id(),
                        "latency_ms": latency_ms,
                        "structured": analysis.is_structured(),
                    }),
                );
                Ok(AnalysisResult {
                    ticket_id: req.ticket_id().clone(),
                    analysis,
                })
            }
            Err(err) => {
                let api_err = map_inference_error(&err);
                self.telemetry.error(
                    "inference_failed",
                    json!({
                        "ticket_id": req.ticket_id(),
                        "model": client.model_id(),
                        "latency_ms": latency_ms,
                        "kind": err.kind(),
                        "error": err.to_string(),
                        "status": api_err.status.as_u16(),
                    }),
                );
                Err(api_err)
            }
        }
    }
}
