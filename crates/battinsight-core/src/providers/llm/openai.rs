use super::LlmClient;
use crate::config::LlmConfig;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream error bodies are cut to this many characters before logging.
const ERROR_BODY_PREVIEW: usize = 300;

/// Chat-completions client (OpenAI or any compatible endpoint).
pub struct OpenAIClient {
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: serde_json::Value,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIClient {
    pub fn from_config(cfg: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<LlmResponse> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            anyhow::bail!("chat completion failed ({}): {}", status, preview);
        }

        let parsed: ChatResponse = resp.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat completion response has no content"))?;

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            meta: serde_json::json!({ "usage": parsed.usage }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let cfg = LlmConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..LlmConfig::default()
        };
        let client = OpenAIClient::from_config(&cfg, "sk-test".into()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "schema",
                },
                ChatMessage {
                    role: "user",
                    content: "top batteries",
                },
            ],
            temperature: 0.1,
            max_tokens: 500,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][1]["role"], "user");
        assert_eq!(v["max_tokens"], 500);
    }

    #[test]
    fn test_response_without_content_is_detected() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
