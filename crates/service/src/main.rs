use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use emoji_rag::{
    AssetResolver, DeleteOutcome, EmbeddingClient, EmojiFragment, EmojiOutcome, EmojiPipeline,
    EmojiRequest, ModelRegistry, Retriever, Settings, TraceClient, VectorStoreBackend,
};

struct AppState {
    pipeline: EmojiPipeline,
    store: Arc<VectorStoreBackend>,
    retriever: Retriever,
    trace: Option<TraceClient>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let settings = Settings::load()?;

    let embeddings = EmbeddingClient::from_settings(&settings.embedding)?;
    let store = Arc::new(VectorStoreBackend::from_settings(
        &settings.vectorstore,
        embeddings.clone(),
    )?);
    let models = ModelRegistry::from_settings(&settings.llm);
    let assets = AssetResolver::from_settings(
        &settings.dataset,
        settings.object_store.as_ref(),
    )?;
    let trace = settings.trace.as_ref().map(TraceClient::from_settings);
    let state = Arc::new(AppState {
        pipeline: EmojiPipeline::new(
            store.clone(),
            embeddings,
            models,
            assets,
            &settings,
        ),
        retriever: Retriever::new(store.clone()),
        store,
        trace,
    });

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/v1/emoji", post(emoji_invoke))
        .route("/v1/feedback", post(send_feedback))
        .route("/v1/get_trace", post(get_trace))
        .route("/v1/vector_store/add_emoji", post(add_emoji))
        .route("/v1/vector_store/rag_emoji", post(rag_emoji))
        .route("/v1/vector_store/del_emoji", post(del_emoji))
        .with_state(state);
    if settings.server.cors_enabled {
        app = app.layer(CorsLayer::permissive());
    }

    let addr: SocketAddr = settings.server.bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

const SYSTEM_ERROR_CODE: i32 = 500;

/// Uniform response envelope; core errors surface here as a code and
/// message, never as an internal error type.
#[derive(Debug, Serialize)]
struct Restful<T> {
    code: i32,
    msg: String,
    data: Option<T>,
}

impl<T: Serialize> Restful<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: 200,
            msg: "success".to_string(),
            data: Some(data),
        })
    }

    fn error(msg: impl ToString) -> Json<Self> {
        Json(Self {
            code: SYSTEM_ERROR_CODE,
            msg: msg.to_string(),
            data: None,
        })
    }
}

async fn health() -> Json<Restful<&'static str>> {
    Restful::ok("ok")
}

async fn emoji_invoke(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmojiRequest>,
) -> Json<Restful<EmojiOutcome>> {
    match state.pipeline.get_emoji(&body).await {
        Ok(outcome) => Restful::ok(outcome),
        Err(err) => {
            error!(req_id = %body.req_id, error = %err, "emoji request failed");
            Restful::error(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddEmojiBody {
    content: String,
    filename: String,
}

async fn add_emoji(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddEmojiBody>,
) -> Json<Restful<String>> {
    match state.store.upsert(&body.filename, &body.content).await {
        Ok(id) => Restful::ok(id),
        Err(err) => {
            error!(filename = %body.filename, error = %err, "add emoji failed");
            Restful::error(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RagEmojiBody {
    prompt: String,
    #[serde(default)]
    filenames: Vec<String>,
}

async fn rag_emoji(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RagEmojiBody>,
) -> Json<Restful<Vec<EmojiFragment>>> {
    match state.retriever.recall(&body.prompt, &body.filenames).await {
        Ok(fragments) => Restful::ok(fragments),
        Err(err) => {
            error!(error = %err, "recall failed");
            Restful::error(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DelEmojiBody {
    vdb_ids: Vec<String>,
    #[serde(default)]
    filenames: Vec<String>,
}

async fn del_emoji(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DelEmojiBody>,
) -> Json<Restful<Vec<DeleteOutcome>>> {
    match state.store.delete(&body.vdb_ids, &body.filenames).await {
        Ok(outcomes) => Restful::ok(outcomes),
        Err(err) => {
            error!(error = %err, "delete failed");
            Restful::error(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendFeedbackBody {
    run_id: Uuid,
    #[serde(default = "default_feedback_key")]
    key: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    feedback_id: Option<Uuid>,
    #[serde(default)]
    comment: Option<String>,
}

fn default_feedback_key() -> String {
    "user_score".to_string()
}

async fn send_feedback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendFeedbackBody>,
) -> Json<Restful<&'static str>> {
    let Some(trace) = &state.trace else {
        return Restful::error("trace service is not configured");
    };
    match trace
        .create_feedback(
            body.run_id,
            &body.key,
            body.score,
            body.comment.clone(),
            body.feedback_id,
        )
        .await
    {
        Ok(()) => Restful::ok("posted feedback successfully"),
        Err(err) => {
            error!(run_id = %body.run_id, error = %err, "feedback failed");
            Restful::error(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetTraceBody {
    run_id: Uuid,
}

async fn get_trace(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GetTraceBody>,
) -> Json<Restful<String>> {
    let Some(trace) = &state.trace else {
        return Restful::error("trace service is not configured");
    };
    Restful::ok(trace.trace_url(body.run_id))
}
