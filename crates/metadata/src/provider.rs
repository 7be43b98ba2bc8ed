use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::LlmError;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

/// A text-completion service reached over the network.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name recorded in provenance.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Send one prompt and return the raw reply text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown LLM provider '{other}' (expected ollama or openai)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL, without the provider-specific path.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "qwen2.5:14b-instruct-q4_K_M".to_string(),
            endpoint: "http://127.0.0.1:11434".to_string(),
            api_key: None,
            timeout: Duration::from_secs(3600),
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// `endpoint` joined with `path`, with exactly one slash between them.
    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Build the client for the configured provider.
pub fn build_client(cfg: &LlmConfig) -> Result<Box<dyn CompletionClient>, LlmError> {
    let http = reqwest::Client::builder()
        .timeout(cfg.timeout)
        .build()
        .map_err(|e| LlmError::Provider(format!("build HTTP client: {e}")))?;

    Ok(match cfg.provider {
        LlmProvider::Ollama => Box::new(OllamaClient::new(cfg, http)),
        LlmProvider::OpenAi => Box::new(OpenAiClient::new(cfg, http)),
    })
}

/// POST a JSON body and decode the JSON reply.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    body: &Value,
    bearer: Option<&str>,
) -> Result<Value, LlmError> {
    debug!(url = %url, provider, "LLM request");

    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let resp = request
        .send()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let detail = resp.text().await.unwrap_or_default();
        return Err(LlmError::Provider(format!(
            "{provider} returned {status}: {}",
            detail.trim()
        )));
    }

    resp.json()
        .await
        .map_err(|e| LlmError::InvalidResponse(format!("parse JSON: {e}")))
}
