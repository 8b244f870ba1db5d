//! Error kinds for each stage of the scout pipeline.
//!
//! Every component converts its own external-call failures into one of these
//! enums. The session layer reports them to the user and aborts only the
//! current action, so none of them are fatal to the process.

use thiserror::Error;

/// Failures talking to the LLM or embedding service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("missing API key (pass --api-key or set LLM_API_KEY)")]
    MissingApiKey,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Page fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rendering engine unavailable: {0}")]
    Unavailable(String),

    #[error("rendered fetch failed: {0}")]
    Render(String),
}

/// Reasons the selector inference pipeline gave up.
///
/// These are expected outcomes, not faults: a page with no recognisable
/// article containers is an `EmptyResult`.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("stage {stage}: model returned malformed output: {reason}")]
    MalformedResponse { stage: u8, reason: String },

    #[error("stage {stage}: {reason}")]
    EmptyResult { stage: u8, reason: String },

    #[error("stage {stage}: {source}")]
    Provider {
        stage: u8,
        #[source]
        source: ProviderError,
    },
}

/// Failures running an extraction routine.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("routine has no `{0}` entry point")]
    MissingEntrypoint(String),

    #[error("routine failed: {0}")]
    Runtime(String),
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("embedding provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("expected {expected} embeddings, provider returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension changed from {expected} to {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("answer provider failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Anything that can halt one interactive action.
///
/// Reported to the user as a message; session state from earlier actions
/// stays as it was.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("`{0}` is not a valid http(s) URL")]
    InvalidUrl(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error("could not update scraper registry: {0}")]
    Registry(#[from] std::io::Error),

    #[error("{0}")]
    NotReady(&'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
