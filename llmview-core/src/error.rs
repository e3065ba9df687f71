use thiserror::Error;

/// Core error type for llmview.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum LlmViewError {
    /// Aggregation was asked to fold zero events.
    #[error("no events to aggregate")]
    EmptyInput,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("flow not found: {flow_id}")]
    FlowNotFound { flow_id: String },

    #[error("inspection host unavailable: {host}")]
    HostUnavailable { host: String },

    #[error("inspection host error: {code} {message}")]
    HostError { code: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = std::result::Result<T, LlmViewError>;
