use crate::llm::conversation::Conversation;
use crate::monitor::CancelToken;
use crate::testgen::assembler::TestsAssembler;

/// Result of exactly one request/streamed-response exchange.
///
/// Never retried inside the dispatcher; retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    /// HTTP 400. Treated as an oversized context.
    PromptTooLong,
    /// HTTP 401.
    AuthFailure,
    /// HTTP 5xx.
    ServerError { status: u16 },
    Cancelled,
    /// Connection failure, unexpected status, malformed or truncated stream.
    TransportError(String),
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SendOutcome::Ok)
    }
}

/// Something that can run one chat exchange for the pipeline.
pub trait ChatBackend: Send + Sync {
    /// Sends the whole conversation and feeds the streamed reply into
    /// `assembler`. Checks `cancel` before every read from the stream.
    fn send(
        &self,
        conversation: &Conversation,
        assembler: &mut dyn TestsAssembler,
        cancel: &CancelToken,
    ) -> SendOutcome;

    fn model(&self) -> &str;
}
