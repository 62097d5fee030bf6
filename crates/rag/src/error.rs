use thiserror::Error;

/// Failure taxonomy for the selection pipeline. Request-time failures are
/// surfaced once and never retried.
#[derive(Error, Debug)]
pub enum EmojiError {
    #[error("unsupported vector store backend: {0}")]
    UnsupportedBackend(String),
    #[error("retrieval failed: {0}")]
    Retrieval(String),
    #[error("storage failed: {0}")]
    Storage(String),
    #[error("model call failed: {0}")]
    Llm(String),
    #[error("model output is not a valid selection: {0}")]
    MalformedOutput(String),
    #[error("asset resolution failed: {0}")]
    AssetResolution(String),
    #[error("unknown model provider: {0}")]
    UnknownProvider(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("trace service error: {0}")]
    Trace(String),
}

pub type Result<T> = std::result::Result<T, EmojiError>;
