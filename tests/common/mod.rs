#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use support_assistant::{
    app, AppConfig, AppState, GenerationParams, InferenceClient, InferenceError, RotationConfig,
    SinkConfig, TelemetrySink,
};

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    fn capture(&mut self, key: &str) {
        if !self.originals.contains_key(key) {
            self.originals
                .insert(key.to_string(), std::env::var(key).ok());
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Configuration with production defaults and no sinks.
pub fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        region: "eu-west-2".into(),
        model_id: "amazon.nova-pro-v1:0".into(),
        endpoint: None,
        bearer_token: None,
        inference_timeout_ms: 2_000,
        max_tokens: 1024,
        temperature: 0.7,
        max_ticket_chars: 5000,
        max_request_bytes: 10 * 1024 * 1024,
        sinks: SinkConfig {
            log_file: None,
            rotation: RotationConfig {
                max_bytes: None,
                keep: 1,
                compress: false,
            },
            collector_url: None,
        },
    }
}

pub enum StubReply {
    Text(String),
    Fail(InferenceError),
    Panic,
}

/// In-process stand-in for the inference service.
pub struct StubClient {
    reply: StubReply,
    calls: AtomicUsize,
}

impl StubClient {
    pub fn new(reply: StubReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InferenceClient for StubClient {
    fn model_id(&self) -> &str {
        "stub"
    }

    async fn invoke(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            StubReply::Text(text) => Ok(text.clone()),
            StubReply::Fail(err) => Err(err.clone()),
            StubReply::Panic => panic!("stub inference client exploded"),
        }
    }
}

pub fn stub_app(reply: StubReply) -> (Router, Arc<StubClient>) {
    stub_app_with(&test_config(), reply)
}

pub fn stub_app_with(config: &AppConfig, reply: StubReply) -> (Router, Arc<StubClient>) {
    let client = StubClient::new(reply);
    let state = AppState::with_client(
        config,
        Some(client.clone() as Arc<dyn InferenceClient>),
        TelemetrySink::disabled(),
    );
    (app(state), client)
}

pub fn app_without_client() -> Router {
    app(AppState::with_client(
        &test_config(),
        None,
        TelemetrySink::disabled(),
    ))
}

pub fn post_json(body: impl Into<String>) -> Request<Body> {
    let body: String = body.into();
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}
