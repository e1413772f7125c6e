use thiserror::Error;

use crate::llm::backend::SendOutcome;

/// Terminal reason for a generation job.
///
/// Every abort path records exactly one of these. `Cancelled` is carried
/// here so callers get a single result type, but it is not a failure and
/// must not be reported as one (see [`GenerationError::is_cancellation`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("project build failed, tests were not generated")]
    BuildFailure,

    #[error("the prompt is too long for the model, reduce the context and retry")]
    PromptTooLong,

    #[error("the LLM backend rejected the token, check the configured credential")]
    AuthFailure,

    #[error("the LLM backend reported a server problem (HTTP {status})")]
    ServerError { status: u16 },

    #[error("request to the LLM backend failed: {0}")]
    Transport(String),

    #[error("the model response contained no test cases")]
    EmptyResult,

    #[error("generation cancelled")]
    Cancelled,

    #[error("a generation job is already running for {0}")]
    JobInProgress(String),

    #[error("failed to save generated tests: {0}")]
    Persistence(String),

    /// A new round was requested on a job that already aborted. Carries the
    /// original reason; start a new job instead.
    #[error("job already aborted: {0}")]
    AlreadyAborted(Box<GenerationError>),
}

impl GenerationError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }

    /// Failures the user can reasonably retry by hand.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::ServerError { .. } | GenerationError::Transport(_)
        )
    }
}

impl From<SendOutcome> for GenerationError {
    /// `SendOutcome::Ok` has no error counterpart; converting it is a caller
    /// bug and surfaces as a transport error rather than a panic.
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::PromptTooLong => GenerationError::PromptTooLong,
            SendOutcome::AuthFailure => GenerationError::AuthFailure,
            SendOutcome::ServerError { status } => GenerationError::ServerError { status },
            SendOutcome::Cancelled => GenerationError::Cancelled,
            SendOutcome::TransportError(reason) => GenerationError::Transport(reason),
            SendOutcome::Ok => GenerationError::Transport("dispatch succeeded".into()),
        }
    }
}

/// Settings load/save failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API token cannot be empty")]
    EmptyToken,

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}
