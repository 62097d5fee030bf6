pub mod accounting;
pub mod asset;
pub mod embedding;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod pricing;
pub mod prompt;
pub mod retriever;
pub mod settings;
pub mod store;
pub mod trace;

pub use accounting::{TokenUsage, UsageAccumulator};
pub use asset::{AssetResolver, EmojiAsset};
pub use embedding::EmbeddingClient;
pub use error::{EmojiError, Result};
pub use parser::extract_selection;
pub use pipeline::{EmojiOutcome, EmojiPipeline, EmojiRequest, EmojiSelection, ModelRegistry};
pub use pricing::{PricingConfig, PricingEntry, PricingRate};
pub use prompt::{PromptSelector, PromptStyle};
pub use retriever::{Retriever, DEFAULT_TOP_K, RECALL_TOP_K};
pub use settings::Settings;
pub use store::{DeleteOutcome, EmojiFragment, VectorStoreBackend};
pub use trace::{RunTracer, TraceClient};
pub use emoji_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};
