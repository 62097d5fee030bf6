use reqwest::Client;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{EmojiError, Result};
use crate::settings::EmbeddingSettings;

/// Query/caption embedder shared by the vector store and the pipeline; keeps
/// a running total of embedding-stage tokens.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    total_tokens: Arc<AtomicU64>,
}

#[derive(Clone)]
enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

impl EmbeddingClient {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let backend = match settings.provider.to_lowercase().as_str() {
            "openai" => EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(&settings.model)?),
            "hash" => EmbeddingBackend::Hash(HashEmbedder::new(settings.dimensions)),
            other => {
                return Err(EmojiError::Config(format!(
                    "unknown embedding provider {other}"
                )))
            }
        };
        Ok(Self {
            backend,
            total_tokens: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(64)),
            total_tokens: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        let mut output = self.embed_batch(&inputs).await?;
        Ok(output.pop().unwrap_or_default())
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => {
                let estimate: u64 = inputs
                    .iter()
                    .map(|text| (text.chars().count() / 4) as u64)
                    .sum();
                self.total_tokens.fetch_add(estimate, Ordering::Relaxed);
                Ok(inputs.iter().map(|text| embedder.embed_text(text)).collect())
            }
            EmbeddingBackend::OpenAi(client) => {
                let (vectors, tokens) = client.embed_batch(inputs).await?;
                self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
                Ok(vectors)
            }
        }
    }

    /// Running total of embedding tokens spent since startup.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }
}

/// Deterministic feature-hash embedder for offline runs and tests.
#[derive(Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            seed: 1337,
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text.split_whitespace() {
            let bucket = self.bucket_for(token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.seed);
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            EmojiError::Config("OPENAI_API_KEY is required for openai embeddings".to_string())
        })?;
        Ok(Self {
            http: Client::new(),
            model: model.to_string(),
            api_key,
        })
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<(Vec<Vec<f32>>, u64)> {
        if inputs.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmojiError::Retrieval(format!("openai embeddings request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(EmojiError::Retrieval(format!(
                "openai embeddings request failed: {}",
                response.status()
            )));
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmojiError::Retrieval(format!("bad openai embeddings response: {e}")))?;
        let tokens = parsed.usage.map(|usage| usage.total_tokens).unwrap_or(0);
        let vectors = parsed.data.into_iter().map(|data| data.embedding).collect();
        Ok((vectors, tokens))
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
    #[serde(default)]
    usage: Option<OpenAiEmbeddingUsage>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_normalized() {
        let client = EmbeddingClient::hash();
        let a = client.embed("happy cat meme").await.unwrap();
        let b = client.embed("happy cat meme").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn embedding_accumulates_token_total() {
        let client = EmbeddingClient::hash();
        assert_eq!(client.total_tokens(), 0);
        client.embed("a prompt with enough characters").await.unwrap();
        let after_one = client.total_tokens();
        assert!(after_one > 0);
        client.embed("another prompt").await.unwrap();
        assert!(client.total_tokens() > after_one);
    }
}
