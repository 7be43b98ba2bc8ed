//! OpenAI-compatible chat completions client.

use serde_json::{Value, json};

use crate::LlmError;
use crate::provider::{CompletionClient, LlmConfig, post_json};

const SYSTEM_PROMPT: &str =
    "You are a disc metadata assistant. Reply with strict JSON only, no prose and no code fences.";

pub struct OpenAiClient {
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(cfg: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            url: cfg.url("/chat/completions"),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.trim().is_empty()),
            temperature: cfg.temperature,
            client,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        })
    }
}

fn extract_reply(data: &Value) -> Result<String, LlmError> {
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::InvalidResponse("reply has no choices[0].message.content".into()))
}

#[async_trait::async_trait]
impl CompletionClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = self.request_body(prompt);
        let data = post_json(
            &self.client,
            "openai",
            &self.url,
            &body,
            self.api_key.as_deref(),
        )
        .await?;
        extract_reply(&data)
    }
}
