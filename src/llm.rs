//! Language-model clients.
//!
//! Implementations of the core [`LanguageModel`] trait:
//! - **[`OllamaModel`]**: `POST /api/generate` with `stream = false`.
//! - **[`OpenAIModel`]**: `POST /v1/chat/completions` on any OpenAI-compatible endpoint.
//!
//! Every call is bounded by the timeout the synthesis loop passes in.
//! Errors map onto [`GenerationError`]:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | timeout elapsed | `Timeout` |
//! | connection refused / DNS / TLS | `Unavailable` |
//! | non-success status, malformed body | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use sql_copilot_core::error::GenerationError;
use sql_copilot_core::synthesis::LanguageModel;

use crate::config::LlmConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Create the configured [`LanguageModel`].
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Send `request`, bounded by `timeout`, and return the JSON body.
async fn send_json(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    label: &str,
) -> Result<serde_json::Value, GenerationError> {
    let call = async {
        let response = request.send().await.map_err(|e| classify(e, label))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Backend(format!(
                "{} API error {}: {}",
                label, status, body_text
            )));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| {
                GenerationError::Backend(format!("{} returned invalid JSON: {}", label, e))
            })
    };

    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    }
}

fn classify(e: reqwest::Error, label: &str) -> GenerationError {
    if e.is_connect() || e.is_request() {
        GenerationError::Unavailable(format!("{}: {}", label, e))
    } else {
        GenerationError::Backend(format!("{}: {}", label, e))
    }
}

// ============ Ollama ============

pub struct OllamaModel {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama generate");
        let request = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body);
        let json = send_json(request, timeout, "Ollama").await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GenerationError::Backend("Ollama response missing 'response'".to_string())
            })
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAIModel {
    model: String,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAIModel {
    /// `OPENAI_API_KEY` is required for the default endpoint and optional
    /// for self-hosted compatible servers.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if config.url.is_none() && api_key.is_none() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let mut request = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let json = send_json(request, timeout, "OpenAI").await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GenerationError::Backend(
                    "OpenAI response missing choices[0].message.content".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn ollama(url: &str) -> OllamaModel {
        OllamaModel::new(&LlmConfig {
            url: Some(url.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["stream"], false);
                Json(json!({ "response": "SQL:\nSELECT 1" }))
            }),
        );
        let url = serve(app).await;
        let text = ollama(&url)
            .generate("question", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "SQL:\nSELECT 1");
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "response": "late" }))
            }),
        );
        let url = serve(app).await;
        let err = ollama(&url)
            .generate("question", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_unreachable_model_is_unavailable() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ollama(&format!("http://{}", addr))
            .generate("question", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_openai_compatible_endpoint() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "SELECT 2" } }]
                }))
            }),
        );
        let url = serve(app).await;
        let model = OpenAIModel::new(&LlmConfig {
            provider: "openai".to_string(),
            url: Some(url),
            ..Default::default()
        })
        .unwrap();
        let text = model.generate("q", Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "SELECT 2");
    }
}
