//! Ollama completion client.
//!
//! Uses the non-streaming generate endpoint: https://github.com/ollama/ollama/blob/main/docs/api.md

use serde_json::{Value, json};

use crate::LlmError;
use crate::provider::{CompletionClient, LlmConfig, post_json};

pub struct OllamaClient {
    url: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(cfg: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            url: cfg.url("/api/generate"),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            client,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        })
    }
}

fn extract_reply(data: &Value) -> Result<String, LlmError> {
    data["response"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::InvalidResponse("ollama reply has no 'response' text".into()))
}

#[async_trait::async_trait]
impl CompletionClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = self.request_body(prompt);
        let data = post_json(&self.client, "ollama", &self.url, &body, None).await?;
        extract_reply(&data)
    }
}
