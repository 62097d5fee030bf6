use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

/// Upper bound on one chat call, enforced by the HTTP client rather than
/// per pipeline stage.
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    OpenAi,
    ZhipuAi,
    Deepseek,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::ZhipuAi => "zhipuai",
            LlmProvider::Deepseek => "deepseek",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "zhipuai" => Some(LlmProvider::ZhipuAi),
            "deepseek" => Some(LlmProvider::Deepseek),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    OpenAi(OpenAiConfig),
    ZhipuAi(ZhipuAiConfig),
    Deepseek(DeepseekConfig),
    Stub(StubConfig),
}

#[derive(Clone)]
struct OpenAiConfig {
    api_key: String,
    base_url: String,
}

#[derive(Clone)]
struct ZhipuAiConfig {
    api_key: String,
}

#[derive(Clone)]
struct DeepseekConfig {
    api_key: String,
}

#[derive(Clone)]
struct StubConfig {
    content: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")?;
        let config = match provider {
            LlmProvider::OpenAi => ProviderConfig::OpenAi(OpenAiConfig {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            }),
            LlmProvider::ZhipuAi => ProviderConfig::ZhipuAi(ZhipuAiConfig {
                api_key: read_api_key("ZHIPUAI_API_KEY")?,
            }),
            LlmProvider::Deepseek => ProviderConfig::Deepseek(DeepseekConfig {
                api_key: read_api_key("DEEPSEEK_API_KEY")?,
            }),
        };
        Ok(Self {
            http,
            provider,
            model,
            config,
        })
    }

    /// Offline client that answers every request with a fixed body. Used by
    /// tests and local smoke runs; never talks to the network.
    pub fn stub(provider: LlmProvider, content: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            provider,
            model: "stub".to_string(),
            config: ProviderConfig::Stub(StubConfig {
                content: content.into(),
            }),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat call, no retries. A failed call surfaces immediately and the
    /// caller never sees partial text.
    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.config {
            ProviderConfig::OpenAi(cfg) => {
                self.chat_completions(&cfg.base_url, &cfg.api_key, req, "openai")
                    .await
            }
            ProviderConfig::ZhipuAi(cfg) => {
                self.chat_completions(
                    "https://open.bigmodel.cn/api/paas/v4",
                    &cfg.api_key,
                    req,
                    "zhipuai",
                )
                .await
            }
            ProviderConfig::Deepseek(cfg) => {
                self.chat_completions("https://api.deepseek.com/v1", &cfg.api_key, req, "deepseek")
                    .await
            }
            ProviderConfig::Stub(cfg) => Ok(self.chat_stub(cfg, req)),
        }
    }

    async fn chat_completions(
        &self,
        base_url: &str,
        api_key: &str,
        req: &LlmRequest,
        label: &str,
    ) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{label} request failed"))?;
        let value = decode_chat_body(response, label).await?;
        let content = extract_chat_text(&value)
            .ok_or_else(|| anyhow!(format!("missing text in {label} response")))?;
        let usage: ChatUsage = value
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        Ok(LlmResponse {
            content,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    fn chat_stub(&self, cfg: &StubConfig, req: &LlmRequest) -> LlmResponse {
        LlmResponse {
            content: cfg.content.clone(),
            prompt_tokens: (req.user.chars().count() / 4) as u32,
            completion_tokens: (cfg.content.chars().count() / 4) as u32,
        }
    }
}

async fn decode_chat_body(response: reqwest::Response, label: &str) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(format!(
            "{label} returned error (status {status}): {body}"
        )));
    }
    serde_json::from_str(&body).with_context(|| format!("failed to decode {label} response"))
}

fn extract_chat_text(value: &Value) -> Option<String> {
    let choices = value.get("choices").and_then(|v| v.as_array())?;
    let choice = choices.first()?;
    let content = choice.get("message").and_then(|m| m.get("content"))?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    if let Some(parts) = content.as_array() {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if (var.contains("OPENAI") || var.contains("DEEPSEEK")) && !value.starts_with("sk-") {
        return Err(anyhow!(format!("{var} must start with 'sk-'")));
    }
    if var.contains("ZHIPUAI") && value.trim().is_empty() {
        return Err(anyhow!(format!("{var} must not be empty")));
    }
    Ok(())
}

#[derive(Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_identifier() {
        for provider in [
            LlmProvider::OpenAi,
            LlmProvider::ZhipuAi,
            LlmProvider::Deepseek,
        ] {
            assert_eq!(LlmProvider::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(LlmProvider::from_str("claude"), None);
    }

    #[test]
    fn extract_chat_text_reads_string_and_parts() {
        let plain = json!({
            "choices": [{ "message": { "content": "hello" } }]
        });
        assert_eq!(extract_chat_text(&plain).as_deref(), Some("hello"));
        let parts = json!({
            "choices": [{ "message": { "content": [{ "type": "text", "text": "hi" }] } }]
        });
        assert_eq!(extract_chat_text(&parts).as_deref(), Some("hi"));
        assert_eq!(extract_chat_text(&json!({ "choices": [] })), None);
    }

    #[tokio::test]
    async fn stub_client_returns_fixed_content() {
        let client = LlmClient::stub(LlmProvider::OpenAi, "{\"filename\": \"a.jpg\"}");
        let response = client
            .chat(&LlmRequest {
                system: None,
                user: "pick one".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.content, "{\"filename\": \"a.jpg\"}");
        assert!(response.total_tokens() > 0);
    }
}
