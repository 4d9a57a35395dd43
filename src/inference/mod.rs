//! Inference client abstraction.
//!
//! The analyzer only sees the [`InferenceClient`] trait; the Bedrock runtime
//! implementation lives in [`bedrock`].  Test doubles implement the same
//! trait.

use std::time::Duration;

pub mod bedrock;

pub use self::bedrock::BedrockClient;

/// Generation parameters sent with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on a single call, including connect and body read.
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Failure of a single inference call.  Display output is for logs only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("throttled by provider: {0}")]
    Throttled(String),
    #[error("access denied by provider: {0}")]
    AccessDenied(String),
    #[error("provider error {code}: {detail}")]
    Service { code: String, detail: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no reply within {0} ms")]
    Timeout(u64),
    #[error("unexpected reply shape: {0}")]
    Malformed(String),
}

impl InferenceError {
    /// Short stable label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Throttled(_) => "throttled",
            InferenceError::AccessDenied(_) => "access_denied",
            InferenceError::Service { .. } => "service_error",
            InferenceError::Transport(_) => "transport_error",
            InferenceError::Timeout(_) => "timeout",
            InferenceError::Malformed(_) => "malformed_reply",
        }
    }
}

/// Something that turns a prompt into generated text.
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    fn model_id(&self) -> &str;

    async fn invoke(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, InferenceError>;
}
