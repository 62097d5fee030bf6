use bytemuck::{cast_slice, pod_collect_to_vec};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::{EmojiError, Result};
use crate::settings::{RemoteVectorStoreSettings, VectorStoreSettings};

/// One corpus entry surfaced by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmojiFragment {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub id: String,
    pub deleted: bool,
}

/// Retrieval/storage capability, dispatched over the configured backend.
pub enum VectorStoreBackend {
    Local(LocalVectorStore),
    Remote(RemoteVectorStore),
}

impl std::fmt::Debug for VectorStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(_) => f.write_str("VectorStoreBackend::Local"),
            Self::Remote(_) => f.write_str("VectorStoreBackend::Remote"),
        }
    }
}

impl VectorStoreBackend {
    pub fn from_settings(
        settings: &VectorStoreSettings,
        embeddings: EmbeddingClient,
    ) -> Result<Self> {
        match settings.database.to_lowercase().as_str() {
            "local" => Ok(Self::Local(LocalVectorStore::open(
                &settings.path,
                embeddings,
            )?)),
            "remote" => {
                let remote = settings.remote.as_ref().ok_or_else(|| {
                    EmojiError::Config("[vectorstore.remote] is required for remote".to_string())
                })?;
                Ok(Self::Remote(RemoteVectorStore::new(remote)))
            }
            other => Err(EmojiError::UnsupportedBackend(other.to_string())),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        allowed_filenames: &[String],
    ) -> Result<Vec<EmojiFragment>> {
        match self {
            Self::Local(store) => store.search(query, k, allowed_filenames).await,
            Self::Remote(store) => store.search(query, k, allowed_filenames).await,
        }
    }

    pub async fn upsert(&self, filename: &str, content: &str) -> Result<String> {
        match self {
            Self::Local(store) => store.upsert(filename, content).await,
            Self::Remote(store) => store.upsert(filename, content).await,
        }
    }

    pub async fn delete(&self, ids: &[String], filenames: &[String]) -> Result<Vec<DeleteOutcome>> {
        match self {
            Self::Local(store) => store.delete(ids, filenames).await,
            Self::Remote(store) => store.delete(ids, filenames).await,
        }
    }
}

/// Vectors persisted in a sqlite file; similarity is scored in process.
pub struct LocalVectorStore {
    path: PathBuf,
    embeddings: EmbeddingClient,
}

impl LocalVectorStore {
    pub fn open<P: AsRef<Path>>(path: P, embeddings: EmbeddingClient) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EmojiError::Storage(format!("failed to create store dir: {e}")))?;
        }
        let store = Self { path, embeddings };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = connection(&self.path).map_err(storage_err)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS emojis (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_emojis_filename ON emojis(filename);
            "#,
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        allowed_filenames: &[String],
    ) -> Result<Vec<EmojiFragment>> {
        let query_embedding = self.embeddings.embed(query).await?;
        let path = self.path.clone();
        let allowed = allowed_filenames.to_vec();
        task::spawn_blocking(move || search_rows(&path, &query_embedding, k, &allowed))
            .await
            .map_err(|e| EmojiError::Retrieval(e.to_string()))?
    }

    pub async fn upsert(&self, filename: &str, content: &str) -> Result<String> {
        let embedding = self.embeddings.embed(content).await?;
        let path = self.path.clone();
        let filename = filename.to_string();
        let content = content.to_string();
        task::spawn_blocking(move || insert_row(&path, &filename, &content, &embedding))
            .await
            .map_err(|e| EmojiError::Storage(e.to_string()))?
    }

    pub async fn delete(&self, ids: &[String], filenames: &[String]) -> Result<Vec<DeleteOutcome>> {
        let path = self.path.clone();
        let ids = ids.to_vec();
        let filenames = filenames.to_vec();
        task::spawn_blocking(move || delete_rows(&path, &ids, &filenames))
            .await
            .map_err(|e| EmojiError::Storage(e.to_string()))?
    }
}

fn connection(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open(path)
}

fn storage_err(err: rusqlite::Error) -> EmojiError {
    EmojiError::Storage(err.to_string())
}

fn retrieval_err(err: rusqlite::Error) -> EmojiError {
    EmojiError::Retrieval(err.to_string())
}

fn search_rows(
    path: &Path,
    query_embedding: &[f32],
    k: usize,
    allowed_filenames: &[String],
) -> Result<Vec<EmojiFragment>> {
    let conn = connection(path).map_err(retrieval_err)?;
    let mut stmt = conn
        .prepare("SELECT filename, content, embedding FROM emojis")
        .map_err(retrieval_err)?;
    let mut rows = stmt.query([]).map_err(retrieval_err)?;
    let mut hits: Vec<(f32, EmojiFragment)> = Vec::new();
    while let Some(row) = rows.next().map_err(retrieval_err)? {
        let filename: String = row.get(0).map_err(retrieval_err)?;
        if !allowed_filenames.is_empty() && !allowed_filenames.contains(&filename) {
            continue;
        }
        let content: String = row.get(1).map_err(retrieval_err)?;
        let blob: Vec<u8> = row.get(2).map_err(retrieval_err)?;
        let embedding: Vec<f32> = pod_collect_to_vec(&blob);
        let score = cosine_similarity(query_embedding, &embedding);
        hits.push((score, EmojiFragment { filename, content }));
    }
    hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    Ok(hits.into_iter().map(|(_, fragment)| fragment).collect())
}

fn insert_row(path: &Path, filename: &str, content: &str, embedding: &[f32]) -> Result<String> {
    let conn = connection(path).map_err(storage_err)?;
    let id = Uuid::new_v4().to_string();
    let blob = cast_slice::<f32, u8>(embedding);
    conn.execute(
        "INSERT INTO emojis (id, filename, content, embedding) VALUES (?1, ?2, ?3, ?4)",
        params![id, filename, content, blob],
    )
    .map_err(storage_err)?;
    Ok(id)
}

/// Filenames narrow the explicit id list, never widen it: the ids are the
/// authorization boundary, so only rows present in both sets are removed.
fn delete_rows(path: &Path, ids: &[String], filenames: &[String]) -> Result<Vec<DeleteOutcome>> {
    let conn = connection(path).map_err(storage_err)?;
    let targets: Vec<String> = if filenames.is_empty() {
        ids.to_vec()
    } else {
        let mut stmt = conn
            .prepare("SELECT id FROM emojis WHERE filename = ?1")
            .map_err(storage_err)?;
        let mut by_filename = Vec::new();
        for filename in filenames {
            let mut rows = stmt.query([filename.as_str()]).map_err(storage_err)?;
            while let Some(row) = rows.next().map_err(storage_err)? {
                by_filename.push(row.get::<_, String>(0).map_err(storage_err)?);
            }
        }
        ids.iter()
            .filter(|id| by_filename.contains(id))
            .cloned()
            .collect()
    };
    let mut outcomes = Vec::with_capacity(targets.len());
    for id in &targets {
        let changed = conn
            .execute("DELETE FROM emojis WHERE id = ?1", [id.as_str()])
            .map_err(storage_err)?;
        outcomes.push(DeleteOutcome {
            id: id.clone(),
            deleted: changed > 0,
        });
    }
    Ok(outcomes)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}

/// Client for a managed vector database; embedding happens on the service
/// side of the wire.
pub struct RemoteVectorStore {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    collection: String,
}

impl RemoteVectorStore {
    pub fn new(settings: &RemoteVectorStoreSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            collection: settings.collection.clone(),
        }
    }

    fn request(&self, op: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/collections/{}/{op}", self.url, self.collection);
        let builder = self.http.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        allowed_filenames: &[String],
    ) -> Result<Vec<EmojiFragment>> {
        let body = serde_json::json!({
            "query": query,
            "top_k": k,
            "filenames": allowed_filenames,
        });
        let response: RemoteSearchResponse = send_json(self.request("search"), &body)
            .await
            .map_err(EmojiError::Retrieval)?;
        Ok(response.documents)
    }

    pub async fn upsert(&self, filename: &str, content: &str) -> Result<String> {
        let body = serde_json::json!({
            "filename": filename,
            "content": content,
        });
        let response: RemoteUpsertResponse = send_json(self.request("documents"), &body)
            .await
            .map_err(EmojiError::Storage)?;
        Ok(response.id)
    }

    pub async fn delete(&self, ids: &[String], filenames: &[String]) -> Result<Vec<DeleteOutcome>> {
        let body = serde_json::json!({
            "ids": ids,
            "filenames": filenames,
        });
        let response: RemoteDeleteResponse = send_json(self.request("delete"), &body)
            .await
            .map_err(EmojiError::Storage)?;
        Ok(response.outcomes)
    }
}

async fn send_json<T: serde::de::DeserializeOwned>(
    builder: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> std::result::Result<T, String> {
    let response = builder
        .json(body)
        .send()
        .await
        .map_err(|e| format!("vector store request failed: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(format!("vector store returned {status}: {text}"));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| format!("bad vector store response: {e}"))
}

#[derive(Deserialize)]
struct RemoteSearchResponse {
    documents: Vec<EmojiFragment>,
}

#[derive(Deserialize)]
struct RemoteUpsertResponse {
    id: String,
}

#[derive(Deserialize)]
struct RemoteDeleteResponse {
    outcomes: Vec<DeleteOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store(dir: &tempfile::TempDir) -> LocalVectorStore {
        LocalVectorStore::open(dir.path().join("emoji.sqlite"), EmbeddingClient::hash()).unwrap()
    }

    #[tokio::test]
    async fn search_caps_results_and_orders_by_score() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.upsert("a.jpg", "joyful dancing cat").await.unwrap();
        store.upsert("b.jpg", "sad crying puppy").await.unwrap();
        store.upsert("c.jpg", "grumpy sleeping bear").await.unwrap();
        let hits = store.search("joyful dancing cat", 2, &[]).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filename, "a.jpg");
    }

    #[tokio::test]
    async fn search_respects_filename_allow_list() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        store.upsert("a.jpg", "a joyful cat").await.unwrap();
        store.upsert("b.jpg", "a joyful dog").await.unwrap();
        let hits = store
            .search("joyful", 4, &["b.jpg".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "b.jpg");
    }

    #[tokio::test]
    async fn search_on_empty_store_returns_no_fragments() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let hits = store.search("anything", 4, &[]).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_intersects_ids_with_filename_matches() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let id_a = store.upsert("a.jpg", "cat").await.unwrap();
        let id_b = store.upsert("b.jpg", "dog").await.unwrap();
        store.upsert("c.jpg", "bird").await.unwrap();
        let outcomes = store
            .delete(
                &[id_a.clone(), id_b.clone()],
                &["b.jpg".to_string(), "c.jpg".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].id, id_b);
        assert!(outcomes[0].deleted);
        let remaining = store.search("cat", 4, &[]).await.unwrap();
        let filenames: Vec<&str> = remaining.iter().map(|f| f.filename.as_str()).collect();
        assert!(filenames.contains(&"a.jpg"));
        assert!(!filenames.contains(&"b.jpg"));
    }

    #[tokio::test]
    async fn delete_without_filenames_uses_ids_directly() {
        let dir = tempdir().unwrap();
        let store = test_store(&dir);
        let id = store.upsert("a.jpg", "cat").await.unwrap();
        let outcomes = store.delete(&[id], &[]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].deleted);
    }

    #[test]
    fn unrecognized_backend_fails_at_startup() {
        let settings = VectorStoreSettings {
            database: "chroma".to_string(),
            ..Default::default()
        };
        let err = VectorStoreBackend::from_settings(&settings, EmbeddingClient::hash()).unwrap_err();
        assert!(matches!(err, EmojiError::UnsupportedBackend(_)));
    }
}
