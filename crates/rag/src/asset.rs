use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task;
use tracing::error;

use crate::error::{EmojiError, Result};
use crate::settings::{DatasetSettings, ObjectStoreSettings};

/// Displayable representation of a selected emoji.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiAsset {
    pub base64: Option<String>,
    pub download_link: Option<String>,
}

/// Turns a selected filename into displayable bytes.
pub enum AssetResolver {
    Local(LocalAssetStore),
    ObjectStore(ObjectStoreClient),
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(_) => f.write_str("AssetResolver::Local"),
            Self::ObjectStore(_) => f.write_str("AssetResolver::ObjectStore"),
        }
    }
}

impl AssetResolver {
    pub fn from_settings(
        dataset: &DatasetSettings,
        object_store: Option<&ObjectStoreSettings>,
    ) -> Result<Self> {
        match dataset.mode.to_lowercase().as_str() {
            "local" => Ok(Self::Local(LocalAssetStore::new(dataset))),
            "object_store" => {
                let settings = object_store.ok_or_else(|| {
                    EmojiError::Config(
                        "[object_store] is required when dataset.mode = \"object_store\""
                            .to_string(),
                    )
                })?;
                Ok(Self::ObjectStore(ObjectStoreClient::new(settings)))
            }
            other => Err(EmojiError::Config(format!(
                "dataset mode {other} not supported"
            ))),
        }
    }

    pub async fn resolve(&self, filename: &str) -> Result<EmojiAsset> {
        match self {
            Self::Local(store) => store.resolve(filename).await,
            Self::ObjectStore(client) => Ok(client.resolve(filename).await),
        }
    }
}

pub struct LocalAssetStore {
    root: PathBuf,
    dataset: String,
}

impl LocalAssetStore {
    pub fn new(settings: &DatasetSettings) -> Self {
        Self {
            root: PathBuf::from(&settings.root),
            dataset: settings.name.clone(),
        }
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(&self.dataset).join("emo").join(filename)
    }

    pub async fn resolve(&self, filename: &str) -> Result<EmojiAsset> {
        let path = self.path_for(filename);
        let bytes = task::spawn_blocking(move || std::fs::read(&path))
            .await
            .map_err(|e| EmojiError::AssetResolution(e.to_string()))?
            .map_err(|e| EmojiError::AssetResolution(format!("failed to read {filename}: {e}")))?;
        Ok(EmojiAsset {
            base64: Some(BASE64.encode(bytes)),
            download_link: None,
        })
    }
}

/// Client for the object store holding the emoji images.
pub struct ObjectStoreClient {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    link_expiry_secs: u64,
}

impl ObjectStoreClient {
    pub fn new(settings: &ObjectStoreSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            bucket: settings.bucket.clone(),
            link_expiry_secs: settings.link_expiry_secs,
        }
    }

    /// The two reads are independent; either one failing yields a null field
    /// rather than a failed resolution.
    pub async fn resolve(&self, filename: &str) -> EmojiAsset {
        let base64 = match self.get_object(filename).await {
            Ok(bytes) => Some(BASE64.encode(bytes)),
            Err(err) => {
                error!(filename, error = %err, "object fetch failed");
                None
            }
        };
        let download_link = match self.presigned_url(filename).await {
            Ok(url) => Some(url),
            Err(err) => {
                error!(filename, error = %err, "download link signing failed");
                None
            }
        };
        EmojiAsset {
            base64,
            download_link,
        }
    }

    async fn get_object(&self, filename: &str) -> std::result::Result<Vec<u8>, String> {
        let url = format!("{}/{}/{filename}", self.endpoint, self.bucket);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("object request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("object store returned {status}"));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("object read failed: {e}"))?;
        Ok(bytes.to_vec())
    }

    async fn presigned_url(&self, filename: &str) -> std::result::Result<String, String> {
        let url = format!(
            "{}/presign/{}/{filename}?expires={}",
            self.endpoint, self.bucket, self.link_expiry_secs
        );
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("presign request failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("presign endpoint returned {status}"));
        }
        let parsed: PresignResponse = response
            .json()
            .await
            .map_err(|e| format!("bad presign response: {e}"))?;
        Ok(parsed.url)
    }
}

#[derive(Deserialize)]
struct PresignResponse {
    url: String,
}
