// src/llm/client.rs

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmSettings;
use crate::llm::backend::{ChatBackend, SendOutcome};
use crate::llm::conversation::{ChatMessage, Conversation};
use crate::monitor::CancelToken;
use crate::testgen::assembler::TestsAssembler;

const EVENT_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const FINISH_STOP: &str = "stop";
/// Event-stream fields that carry no completion data.
const SSE_FIELDS: [&str; 3] = ["event", "id", "retry"];

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded line of the event stream.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Blank line or SSE comment.
    Skip,
    /// `[DONE]` sentinel.
    Done,
    Delta {
        content: String,
        finish_reason: Option<String>,
    },
}

/// Streaming chat-completion client.
#[derive(Clone)]
pub struct LlmClient {
    settings: LlmSettings,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, String> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

impl ChatBackend for LlmClient {
    fn send(
        &self,
        conversation: &Conversation,
        assembler: &mut dyn TestsAssembler,
        cancel: &CancelToken,
    ) -> SendOutcome {
        if cancel.is_cancelled() {
            return SendOutcome::Cancelled;
        }

        let body = ChatRequest {
            model: &self.settings.model,
            messages: conversation.snapshot(),
            stream: true,
        };

        info!(
            model = %self.settings.model,
            turns = conversation.len(),
            "sending chat completion request"
        );

        let resp = match self
            .http
            .post(self.settings.endpoint())
            .bearer_auth(&self.settings.token)
            .json(&body)
            .send()
        {
            Ok(r) => r,
            Err(e) => {
                warn!("request failed: {e}");
                return SendOutcome::TransportError(e.to_string());
            }
        };

        if let Some(outcome) = classify_status(resp.status().as_u16()) {
            warn!(status = resp.status().as_u16(), "backend rejected request");
            return outcome;
        }

        let outcome = read_stream(BufReader::new(resp), assembler, cancel);

        debug!(outcome = ?outcome, "raw response:\n{}", assembler.content());
        outcome
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

/// Maps a non-success HTTP status to its outcome. `None` for 2xx.
pub fn classify_status(status: u16) -> Option<SendOutcome> {
    match status {
        200..=299 => None,
        400 => Some(SendOutcome::PromptTooLong),
        401 => Some(SendOutcome::AuthFailure),
        500..=599 => Some(SendOutcome::ServerError { status }),
        other => Some(SendOutcome::TransportError(format!(
            "unexpected HTTP status {other}"
        ))),
    }
}

/// Feeds an event stream into `assembler` until the backend signals
/// completion.
///
/// Cancellation is checked before each line is read, so nothing after the
/// cancelling point is consumed. A malformed record fails the whole stream.
pub fn read_stream<R: BufRead>(
    reader: R,
    assembler: &mut dyn TestsAssembler,
    cancel: &CancelToken,
) -> SendOutcome {
    let mut lines = reader.lines();

    loop {
        if cancel.is_cancelled() {
            info!("stream cancelled");
            return SendOutcome::Cancelled;
        }

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => return SendOutcome::TransportError(e.to_string()),
            None => {
                return SendOutcome::TransportError(
                    "stream ended before completion".into(),
                )
            }
        };

        match parse_stream_line(&line) {
            Ok(StreamEvent::Skip) => continue,
            Ok(StreamEvent::Done) => {
                return SendOutcome::TransportError(
                    "stream ended without a stop signal".into(),
                )
            }
            Ok(StreamEvent::Delta {
                content,
                finish_reason,
            }) => {
                assembler.consume(&content);

                match finish_reason.as_deref() {
                    None => {}
                    Some(FINISH_STOP) => return SendOutcome::Ok,
                    Some(other) => {
                        return SendOutcome::TransportError(format!(
                            "stream finished with reason `{other}`"
                        ))
                    }
                }
            }
            Err(e) => return SendOutcome::TransportError(e),
        }
    }
}

pub fn parse_stream_line(line: &str) -> Result<StreamEvent, String> {
    let line = line.trim_end_matches('\r');

    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(StreamEvent::Skip);
    }

    let Some(payload) = line.strip_prefix(EVENT_PREFIX).map(str::trim_start) else {
        let field = line.split_once(':').map_or(line, |(name, _)| name);
        if SSE_FIELDS.contains(&field) {
            return Ok(StreamEvent::Skip);
        }
        return Err(format!("unexpected stream line: {line}"));
    };

    if payload == DONE_SENTINEL {
        return Ok(StreamEvent::Done);
    }

    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| format!("malformed stream record: {e}"))?;

    let choice = chunk
        .choices
        .into_iter()
        .next()
        .ok_or("stream record has no choices")?;

    Ok(StreamEvent::Delta {
        content: choice.delta.and_then(|d| d.content).unwrap_or_default(),
        finish_reason: choice.finish_reason,
    })
}
