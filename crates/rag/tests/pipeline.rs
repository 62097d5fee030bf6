use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use emoji_llm::{LlmClient, LlmProvider};
use emoji_rag::{
    AssetResolver, EmbeddingClient, EmojiError, EmojiPipeline, EmojiRequest, ModelRegistry,
    Settings, VectorStoreBackend,
};

/// Builds a pipeline around a populated local store, a local asset
/// directory, and a stub chat client that answers with `model_output`.
async fn pipeline_fixture(dir: &TempDir, model_output: &str) -> EmojiPipeline {
    let mut settings = Settings::default();
    settings.vectorstore.path = dir
        .path()
        .join("vectorstore/emoji.sqlite")
        .to_string_lossy()
        .into_owned();
    settings.dataset.root = dir.path().to_string_lossy().into_owned();
    settings.dataset.name = "emoji-dataset".to_string();

    let emo_dir = dir.path().join("emoji-dataset").join("emo");
    std::fs::create_dir_all(&emo_dir).unwrap();
    std::fs::write(emo_dir.join("a.jpg"), b"fake-jpeg-a").unwrap();
    std::fs::write(emo_dir.join("b.jpg"), b"fake-jpeg-b").unwrap();

    let embeddings = EmbeddingClient::hash();
    let store = Arc::new(
        VectorStoreBackend::from_settings(&settings.vectorstore, embeddings.clone()).unwrap(),
    );
    store
        .upsert("a.jpg", "开心 跳舞 一只快乐的猫")
        .await
        .unwrap();
    store
        .upsert("b.jpg", "伤心 哭泣 一只难过的狗")
        .await
        .unwrap();

    let mut models = ModelRegistry::empty();
    models.insert(LlmClient::stub(LlmProvider::OpenAi, model_output));

    let assets = AssetResolver::from_settings(&settings.dataset, None).unwrap();
    EmojiPipeline::new(store, embeddings, models, assets, &settings)
}

fn request(prompt: &str) -> EmojiRequest {
    EmojiRequest {
        prompt: prompt.to_string(),
        req_id: "req-1".to_string(),
        llm: "openai".to_string(),
    }
}

#[tokio::test]
async fn selects_emoji_end_to_end() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, r#"{"filename": "a.jpg", "content": "joyful"}"#).await;
    let outcome = pipeline.get_emoji(&request("今天很开心～")).await.unwrap();
    assert_eq!(outcome.emojiinfo.filename, "a.jpg");
    assert_eq!(outcome.emojiinfo.content, "joyful");
    assert!(outcome.emojidetail.base64.as_deref().is_some_and(|b| !b.is_empty()));
    assert_eq!(outcome.tokeninfo.model, "openai");
    assert!(outcome.run_id.is_some());
}

#[tokio::test]
async fn trailing_comma_output_is_repaired() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, r#"{"filename": "a.jpg", "content": "joyful",}"#).await;
    let outcome = pipeline.get_emoji(&request("今天很开心～")).await.unwrap();
    assert_eq!(outcome.emojiinfo.filename, "a.jpg");
    assert_eq!(outcome.emojiinfo.content, "joyful");
}

#[tokio::test]
async fn braceless_output_fails_without_partial_result() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, "I could not pick an emoji today.").await;
    let err = pipeline.get_emoji(&request("今天很开心～")).await.unwrap_err();
    assert!(matches!(err, EmojiError::MalformedOutput(_)));
}

#[tokio::test]
async fn usage_total_folds_discounted_embedding_tokens() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, r#"{"filename": "b.jpg", "content": "难过"}"#).await;
    let outcome = pipeline.get_emoji(&request("心情不好")).await.unwrap();
    let usage = &outcome.tokeninfo;
    assert_eq!(
        usage.total_tokens,
        usage.prompt_tokens + usage.completion_tokens + usage.embedding_tokens / 10
    );
    assert!(usage.embedding_tokens > 0);
    assert_eq!(usage.successful_requests, 1);
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, r#"{"filename": "a.jpg", "content": "joyful"}"#).await;
    let mut req = request("开心");
    req.llm = "claude".to_string();
    let err = pipeline.get_emoji(&req).await.unwrap_err();
    assert!(matches!(err, EmojiError::UnknownProvider(_)));
}

#[tokio::test]
async fn filename_outside_candidates_is_accepted_as_is() {
    let dir = tempdir().unwrap();
    let pipeline = pipeline_fixture(&dir, r#"{"filename": "b.jpg", "content": "sad"}"#).await;
    // b.jpg may or may not be among the top candidates for this prompt; the
    // selection is accepted either way and the asset resolved from it.
    let outcome = pipeline.get_emoji(&request("随便")).await.unwrap();
    assert_eq!(outcome.emojiinfo.filename, "b.jpg");
    assert!(outcome.emojidetail.base64.is_some());
}
