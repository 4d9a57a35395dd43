use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{GenerationParams, InferenceClient, InferenceError};

/// Bedrock runtime client speaking the Amazon Nova `InvokeModel` format.
///
/// Authentication uses a Bedrock API key sent as a bearer token; request
/// signing is left to whatever proxy sits in front when no key is set.
pub struct BedrockClient {
    invoke_url: String,
    model_id: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl BedrockClient {
    pub fn new(endpoint: &str, model_id: &str, bearer_token: Option<String>) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/');
        reqwest::Url::parse(endpoint)
            .with_context(|| format!("invalid Bedrock endpoint '{}'", endpoint))?;
        let invoke_url = format!(
            "{}/model/{}/invoke",
            endpoint,
            urlencoding::encode(model_id)
        );
        reqwest::Url::parse(&invoke_url)
            .with_context(|| format!("invalid invoke URL '{}'", invoke_url))?;
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            invoke_url,
            model_id: model_id.to_string(),
            bearer_token,
            client,
        })
    }

    pub fn invoke_url(&self) -> &str {
        &self.invoke_url
    }
}

#[derive(Serialize)]
struct NovaRequest<'a> {
    messages: [NovaMessage<'a>; 1],
    #[serde(rename = "inferenceConfig")]
    inference_config: NovaInferenceConfig,
}

#[derive(Serialize)]
struct NovaMessage<'a> {
    role: &'static str,
    content: [NovaText<'a>; 1],
}

#[derive(Serialize)]
struct NovaText<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct NovaInferenceConfig {
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct NovaResponse {
    output: NovaOutput,
}

#[derive(Deserialize)]
struct NovaOutput {
    message: NovaReplyMessage,
}

#[derive(Deserialize)]
struct NovaReplyMessage {
    #[serde(default)]
    content: Vec<NovaReplyBlock>,
}

#[derive(Deserialize)]
struct NovaReplyBlock {
    text: Option<String>,
}

fn render_body(prompt: &str, params: &GenerationParams) -> Result<Vec<u8>, InferenceError> {
    let body = NovaRequest {
        messages: [NovaMessage {
            role: "user",
            content: [NovaText { text: prompt }],
        }],
        inference_config: NovaInferenceConfig {
            max_new_tokens: params.max_tokens,
            temperature: params.temperature,
        },
    };
    serde_json::to_vec(&body).map_err(|e| InferenceError::Malformed(e.to_string()))
}

fn extract_text(body: &str) -> Result<String, InferenceError> {
    let parsed: NovaResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::Malformed(e.to_string()))?;
    parsed
        .output
        .message
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| InferenceError::Malformed("reply has no text content".into()))
}

/// Map a non-success reply onto an [`InferenceError`].  The error code comes
/// from `x-amzn-ErrorType`, then the body's `__type`/`code`, then the status.
fn classify_error(status: StatusCode, error_type: Option<&str>, body: &str) -> InferenceError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let body_field = |key: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let code = error_type
        .map(|t| t.split(':').next().unwrap_or(t).to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            body_field("__type").map(|t| t.rsplit('#').next().unwrap_or(&t).to_string())
        })
        .or_else(|| body_field("code"))
        .unwrap_or_else(|| match status {
            StatusCode::TOO_MANY_REQUESTS => "ThrottlingException".to_string(),
            StatusCode::FORBIDDEN => "AccessDeniedException".to_string(),
            other => format!("HTTP{}", other.as_u16()),
        });
    let detail = body_field("message")
        .or_else(|| body_field("Message"))
        .unwrap_or_else(|| format!("status {}", status.as_u16()));

    if code.contains("ThrottlingException") {
        InferenceError::Throttled(detail)
    } else if code.contains("AccessDeniedException") {
        InferenceError::AccessDenied(detail)
    } else {
        InferenceError::Service { code, detail }
    }
}

#[async_trait::async_trait]
impl InferenceClient for BedrockClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, InferenceError> {
        let body = render_body(prompt, params)?;
        let mut rb = self
            .client
            .post(&self.invoke_url)
            .timeout(params.timeout)
            .header("content-type", "application/json")
            .header("accept", "application/json");
        if let Some(tok) = &self.bearer_token {
            rb = rb.bearer_auth(tok);
        }
        let timeout_ms = params.timeout.as_millis() as u64;
        let resp = rb.body(body).send().await.map_err(|err| {
            if err.is_timeout() {
                InferenceError::Timeout(timeout_ms)
            } else {
                InferenceError::Transport(err.to_string())
            }
        })?;
        let status = resp.status();
        let error_type = resp
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await.map_err(|err| {
            if err.is_timeout() {
                InferenceError::Timeout(timeout_ms)
            } else {
                InferenceError::Transport(err.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(classify_error(status, error_type.as_deref(), &text));
        }
        extract_text(&text)
    }
}
