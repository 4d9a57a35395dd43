use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};

pub const DEFAULT_REGION: &str = "eu-west-2";
pub const DEFAULT_MODEL_ID: &str = "amazon.nova-pro-v1:0";
pub const DEFAULT_MAX_TICKET_CHARS: usize = 5000;
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub max_bytes: Option<u64>,
    pub keep: usize,
    pub compress: bool,
}

/// Which log sinks are enabled besides the console.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub log_file: Option<String>,
    pub rotation: RotationConfig,
    pub collector_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub region: String,
    pub model_id: String,
    /// Explicit runtime endpoint; derived from `region` when unset.
    pub endpoint: Option<String>,
    pub bearer_token: Option<String>,
    pub inference_timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_ticket_chars: usize,
    pub max_request_bytes: usize,
    pub sinks: SinkConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let region = parse_string_env("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let model_id =
            parse_string_env("BEDROCK_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let endpoint = parse_string_env("BEDROCK_ENDPOINT");
        let bearer_token = parse_string_env("AWS_BEARER_TOKEN_BEDROCK");

        let port = parse_optional::<u16>("PORT")?.unwrap_or(8080);
        let inference_timeout_ms = parse_optional::<u64>("BEDROCK_TIMEOUT_MS")?.unwrap_or(30_000);
        let max_tokens = parse_optional::<u32>("BEDROCK_MAX_TOKENS")?
            .filter(|n| *n > 0)
            .unwrap_or(1024);
        let temperature = parse_optional::<f32>("BEDROCK_TEMPERATURE")?.unwrap_or(0.7);
        if !(0.0..=1.0).contains(&temperature) {
            return Err(anyhow!("BEDROCK_TEMPERATURE must be between 0 and 1"));
        }
        let max_ticket_chars = parse_optional::<usize>("ASSISTANT_MAX_TICKET_CHARS")?
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_TICKET_CHARS);
        let max_request_bytes = parse_optional::<usize>("ASSISTANT_MAX_REQUEST_BYTES")?
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);

        let rotation = RotationConfig {
            max_bytes: parse_optional::<u64>("LOG_MAX_BYTES")?,
            keep: parse_optional::<usize>("LOG_ROTATE_KEEP")?.unwrap_or(1),
            compress: parse_bool_env("LOG_ROTATE_COMPRESS")?.unwrap_or(false),
        };
        let sinks = SinkConfig {
            log_file: parse_string_env("LOG_FILE"),
            rotation,
            collector_url: parse_string_env("LOG_COLLECTOR_URL"),
        };

        Ok(Self {
            port,
            region,
            model_id,
            endpoint,
            bearer_token,
            inference_timeout_ms,
            max_tokens,
            temperature,
            max_ticket_chars,
            max_request_bytes,
            sinks,
        })
    }

    /// Runtime endpoint the inference client talks to.
    pub fn resolved_endpoint(&self) -> String {
        match &self.endpoint {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }
}

fn parse_string_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional<T: FromStr>(var: &str) -> Result<Option<T>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", var, value.trim())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
