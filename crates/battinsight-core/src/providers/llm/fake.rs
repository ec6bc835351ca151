use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns a canned reply. Counts calls so tests can assert the model was
/// (or was not) consulted.
pub struct FakeClient {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, _system: &str, _prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(LlmResponse {
                text: text.clone(),
                provider: "fake".to_string(),
                model: "fake".to_string(),
                meta: serde_json::json!({}),
            }),
            Err(msg) => anyhow::bail!("{}", msg),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
