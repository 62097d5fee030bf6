use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{EmojiError, Result};
use crate::pricing::PricingConfig;

/// Settings loaded from a TOML file. Every field has a default so a partial
/// file (or none at all) still yields a runnable configuration; API keys
/// stay in the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub vectorstore: VectorStoreSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub dataset: DatasetSettings,
    #[serde(default)]
    pub object_store: Option<ObjectStoreSettings>,
    #[serde(default)]
    pub trace: Option<TraceSettings>,
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config_path = env::var("EMOJI_CONFIG").unwrap_or_else(|_| "emoji.toml".to_string());
        let path = Path::new(&config_path);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| EmojiError::Config(format!("failed to read {config_path}: {e}")))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EmojiError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub cors_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_enabled: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreSettings {
    /// Backend name; anything other than a recognized name fails at startup.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub remote: Option<RemoteVectorStoreSettings>,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            database: default_database(),
            path: default_store_path(),
            remote: None,
        }
    }
}

fn default_database() -> String {
    "local".to_string()
}

fn default_store_path() -> String {
    "local_data/vectorstore/emoji.sqlite".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteVectorStoreSettings {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "emoji".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    /// Providers whose chat interface reliably follows an explicit JSON
    /// schema; everything else falls back to the simpler template.
    #[serde(default = "default_structured_providers")]
    pub structured_providers: Vec<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_zhipuai_model")]
    pub zhipuai_model: String,
    #[serde(default = "default_deepseek_model")]
    pub deepseek_model: String,
    /// Divisor folding embedding-stage tokens into the generation total.
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            structured_providers: default_structured_providers(),
            openai_model: default_openai_model(),
            zhipuai_model: default_zhipuai_model(),
            deepseek_model: default_deepseek_model(),
            embedding_weight: default_embedding_weight(),
        }
    }
}

fn default_structured_providers() -> Vec<String> {
    vec!["openai".to_string(), "deepseek".to_string()]
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_zhipuai_model() -> String {
    "glm-4".to_string()
}

fn default_deepseek_model() -> String {
    "deepseek-chat".to_string()
}

fn default_embedding_weight() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSettings {
    #[serde(default = "default_dataset_mode")]
    pub mode: String,
    #[serde(default = "default_dataset_root")]
    pub root: String,
    #[serde(default = "default_dataset_name")]
    pub name: String,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            mode: default_dataset_mode(),
            root: default_dataset_root(),
            name: default_dataset_name(),
        }
    }
}

fn default_dataset_mode() -> String {
    "local".to_string()
}

fn default_dataset_root() -> String {
    "local_data".to_string()
}

fn default_dataset_name() -> String {
    "emoji-dataset".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreSettings {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_link_expiry")]
    pub link_expiry_secs: u64,
}

fn default_link_expiry() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceSettings {
    #[serde(default = "default_trace_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_trace_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_trace_project")]
    pub project: String,
}

fn default_trace_endpoint() -> String {
    "https://api.smith.langchain.com".to_string()
}

fn default_trace_public_url() -> String {
    "https://smith.langchain.com".to_string()
}

fn default_trace_project() -> String {
    "emoji-agent".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.vectorstore.database, "local");
        assert_eq!(settings.dataset.mode, "local");
        assert_eq!(settings.llm.embedding_weight, 10);
        assert!(settings.object_store.is_none());
        assert_eq!(
            settings.llm.structured_providers,
            vec!["openai".to_string(), "deepseek".to_string()]
        );
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let settings = Settings::from_toml(
            r#"
            [vectorstore]
            database = "remote"

            [vectorstore.remote]
            url = "https://vdb.example.com"

            [dataset]
            mode = "object_store"
            name = "emoji-v2"

            [llm]
            embedding_weight = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.vectorstore.database, "remote");
        let remote = settings.vectorstore.remote.unwrap();
        assert_eq!(remote.collection, "emoji");
        assert_eq!(settings.dataset.name, "emoji-v2");
        assert_eq!(settings.dataset.root, "local_data");
        assert_eq!(settings.llm.embedding_weight, 5);
        assert_eq!(settings.llm.openai_model, "gpt-3.5-turbo");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = Settings::from_toml("[vectorstore").unwrap_err();
        assert!(matches!(err, EmojiError::Config(_)));
    }
}
