use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use emoji_llm::{LlmClient, LlmProvider, LlmRequest};

use crate::accounting::{TokenUsage, UsageAccumulator};
use crate::asset::{AssetResolver, EmojiAsset};
use crate::embedding::EmbeddingClient;
use crate::error::{EmojiError, Result};
use crate::parser::extract_selection;
use crate::pricing::PricingConfig;
use crate::prompt::PromptSelector;
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::settings::{LlmSettings, Settings};
use crate::store::VectorStoreBackend;

#[derive(Debug, Clone, Deserialize)]
pub struct EmojiRequest {
    pub prompt: String,
    pub req_id: String,
    #[serde(default = "default_provider")]
    pub llm: String,
}

fn default_provider() -> String {
    "openai".to_string()
}

/// The model's structured choice: one filename plus its justification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmojiSelection {
    pub filename: String,
    pub content: String,
}

/// One end-to-end invocation result, carrying the run id explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct EmojiOutcome {
    pub run_id: Option<Uuid>,
    pub emojiinfo: EmojiSelection,
    pub emojidetail: EmojiAsset,
    pub tokeninfo: TokenUsage,
}

/// Chat clients keyed by provider identifier, built once at startup.
pub struct ModelRegistry {
    clients: HashMap<String, LlmClient>,
}

impl ModelRegistry {
    /// Builds a client per configured provider. A provider whose credentials
    /// are absent is skipped with a warning; requests naming it are rejected
    /// as unknown.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let mut registry = Self::empty();
        let configured = [
            (LlmProvider::OpenAi, settings.openai_model.as_str()),
            (LlmProvider::ZhipuAi, settings.zhipuai_model.as_str()),
            (LlmProvider::Deepseek, settings.deepseek_model.as_str()),
        ];
        for (provider, model) in configured {
            match LlmClient::new(provider, model) {
                Ok(client) => registry.insert(client),
                Err(err) => warn!(
                    provider = provider.as_str(),
                    error = %err,
                    "provider unavailable"
                ),
            }
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn insert(&mut self, client: LlmClient) {
        self.clients
            .insert(client.provider().as_str().to_string(), client);
    }

    pub fn resolve(&self, provider: &str) -> Result<&LlmClient> {
        self.clients
            .get(&provider.to_lowercase())
            .ok_or_else(|| EmojiError::UnknownProvider(provider.to_string()))
    }
}

/// The selection pipeline. One instance serves all requests; per-invocation
/// state lives on the stack of `get_emoji`.
pub struct EmojiPipeline {
    retriever: Retriever,
    embeddings: EmbeddingClient,
    selector: PromptSelector,
    models: ModelRegistry,
    assets: AssetResolver,
    pricing: PricingConfig,
    embedding_weight: u64,
}

impl EmojiPipeline {
    pub fn new(
        store: Arc<VectorStoreBackend>,
        embeddings: EmbeddingClient,
        models: ModelRegistry,
        assets: AssetResolver,
        settings: &Settings,
    ) -> Self {
        Self {
            retriever: Retriever::new(store),
            embeddings,
            selector: PromptSelector::new(&settings.llm.structured_providers),
            models,
            assets,
            pricing: settings.pricing.clone(),
            embedding_weight: settings.llm.embedding_weight,
        }
    }

    /// Runs one invocation: retrieve, assemble context, generate, parse,
    /// resolve, account. Any failure surfaces immediately, nothing is
    /// retried.
    pub async fn get_emoji(&self, request: &EmojiRequest) -> Result<EmojiOutcome> {
        let mut tracer = crate::trace::RunTracer::default();
        let mut accumulator = UsageAccumulator::default();
        tracer.observe_start(Uuid::new_v4());
        info!(req_id = %request.req_id, provider = %request.llm, "emoji request");

        let client = self.models.resolve(&request.llm)?;

        tracer.observe_start(Uuid::new_v4());
        let fragments = self
            .retriever
            .search(&request.prompt, DEFAULT_TOP_K, &[])
            .await?;
        debug!(fragments = fragments.len(), "retrieval finished");
        let context = Retriever::format_context(&fragments);
        let prompt_text = self.selector.render(&request.llm, &context, &request.prompt);

        tracer.observe_start(Uuid::new_v4());
        let response = client
            .chat(&LlmRequest {
                system: None,
                user: prompt_text,
            })
            .await
            .map_err(|e| EmojiError::Llm(format!("{e:#}")))?;
        let rate = self.pricing.lookup(&request.llm, client.model());
        accumulator.record(&response, rate);

        let selection = extract_selection(&response.content)?;
        if !fragments
            .iter()
            .any(|fragment| fragment.filename == selection.filename)
        {
            // The model is told to pick from the candidate list, but a
            // filename outside it is accepted as-is.
            warn!(
                filename = %selection.filename,
                "selected filename is not among the retrieved candidates"
            );
        }

        let asset = self.assets.resolve(&selection.filename).await?;
        let usage = accumulator.finalize(
            &request.llm,
            self.embeddings.total_tokens(),
            self.embedding_weight,
        );
        Ok(EmojiOutcome {
            run_id: tracer.run_id(),
            emojiinfo: selection,
            emojidetail: asset,
            tokeninfo: usage,
        })
    }
}
