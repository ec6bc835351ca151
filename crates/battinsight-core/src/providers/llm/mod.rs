use crate::config::LlmConfig;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod openai;

/// Builds the configured client. `None` means the credential is missing,
/// which callers surface as a configuration failure rather than at startup.
pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Option<Arc<dyn LlmClient>>> {
    match cfg.provider.as_str() {
        "openai" => match &cfg.api_key {
            Some(key) => {
                let client: Arc<dyn LlmClient> =
                    Arc::new(openai::OpenAIClient::from_config(cfg, key.clone())?);
                Ok(Some(client))
            }
            None => Ok(None),
        },
        "fake" => {
            let reply = cfg.fake_reply.clone().unwrap_or_default();
            let client: Arc<dyn LlmClient> = Arc::new(fake::FakeClient::new(reply));
            Ok(Some(client))
        }
        other => anyhow::bail!("unknown llm provider '{}' (expected openai|fake)", other),
    }
}
