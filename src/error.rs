/// Error kinds for the pipeline.
///
/// Mirrors the taxonomy the operator needs to reason about: configuration
/// mistakes are fatal before anything runs, HTTP errors split into
/// transient (retry) and permanent (abort the current series), storage
/// errors abort the current transaction, and integrity warnings are data,
/// never a control-flow signal.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transient http error (status={status:?}): {detail}")]
    TransientHttp {
        status: Option<u16>,
        detail: String,
        retry_after: Option<std::time::Duration>,
    },

    #[error("permanent http error (status={status}): {body}")]
    PermanentHttp { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Config(format!("malformed json: {e}"))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Config(format!("io error: {e}"))
    }
}
