//! orchestrator.rs
//!
//! Generation job state machine: build check, prompt, dispatch, assemble,
//! persist.

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use crate::builder::ProjectBuilder;
use crate::config::PipelineConfig;
use crate::context::PromptContext;
use crate::error::GenerationError;
use crate::llm::backend::{ChatBackend, SendOutcome};
use crate::llm::conversation::{ChatMessage, Conversation};
use crate::llm::prompt::{build_prompt, prompt_hash};
use crate::logger::LogLevel;
use crate::monitor::{CancelToken, ErrorMonitor};
use crate::persistence::{JobMetadata, ResultStore};
use crate::testgen::assembler::assembler_for;
use crate::testgen::test_suite::TestSuite;
use crate::workspace::{JobKey, Workspace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    BuildVerifying,
    PromptBuilding,
    Dispatching,
    Assembling,
    Persisting,
    Done,
    Aborted(GenerationError),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Aborted(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::BuildVerifying => f.write_str("verifying build"),
            PipelineState::PromptBuilding => f.write_str("building prompt"),
            PipelineState::Dispatching => f.write_str("waiting for the model"),
            PipelineState::Assembling => f.write_str("assembling tests"),
            PipelineState::Persisting => f.write_str("saving results"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Progress reported from the worker to the host.
#[derive(Debug)]
pub enum PipelineEvent {
    Log(LogLevel, String),
    State(PipelineState),
    Finished { result_name: String, tests: usize },
    Failed(GenerationError),
    Cancelled,
}

/// External collaborators of a job.
#[derive(Clone)]
pub struct Collaborators {
    pub builder: Arc<dyn ProjectBuilder>,
    pub backend: Arc<dyn ChatBackend>,
    pub store: Arc<dyn ResultStore>,
}

/// One generation job.
///
/// Owns the conversation and the error monitor; neither is shared with any
/// other job.
pub struct Pipeline {
    config: PipelineConfig,
    key: JobKey,
    context: PromptContext,
    workspace: Arc<Workspace>,
    collaborators: Collaborators,
    conversation: Conversation,
    monitor: ErrorMonitor,
    state: PipelineState,
    feedback: Option<String>,
    prompt_hash: String,
    events: Option<Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        key: JobKey,
        context: PromptContext,
        workspace: Arc<Workspace>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            key,
            context,
            workspace,
            collaborators,
            conversation: Conversation::new(),
            monitor: ErrorMonitor::new(),
            state: PipelineState::Idle,
            feedback: None,
            prompt_hash: String::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Handle for related work that must stop when this job fails.
    pub fn monitor(&self) -> ErrorMonitor {
        self.monitor.clone()
    }

    /// Runs the job to a terminal state. Calling it again after `Done`
    /// starts a new round on the same conversation. An aborted job stays
    /// aborted: further rounds fail with `AlreadyAborted` and change nothing.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<TestSuite, GenerationError> {
        self.ensure_not_aborted()?;

        if self.state != PipelineState::BuildVerifying {
            if let Err(e) = self.start(cancel) {
                return self.finish(Err(e));
            }
        }

        let result = self.run_stages(cancel);
        self.workspace.complete(&self.key);
        self.finish(result)
    }

    /// Starts another round on the same conversation, sending `feedback`
    /// (e.g. a compiler error) instead of the initial prompt.
    pub fn refine(
        &mut self,
        feedback: impl Into<String>,
        cancel: &CancelToken,
    ) -> Result<TestSuite, GenerationError> {
        self.ensure_not_aborted()?;
        self.feedback = Some(feedback.into());
        self.run(cancel)
    }

    fn ensure_not_aborted(&self) -> Result<(), GenerationError> {
        let PipelineState::Aborted(reason) = &self.state else {
            return Ok(());
        };

        let err = GenerationError::AlreadyAborted(Box::new(reason.clone()));
        self.log(LogLevel::Warn, err.to_string());
        Err(err)
    }

    /// Idle -> BuildVerifying. Registers the job before any network
    /// activity.
    fn start(&mut self, cancel: &CancelToken) -> Result<(), GenerationError> {
        self.check_stopped(cancel)?;
        self.workspace
            .register(&self.key, cancel, self.config.job_policy)?;

        self.log(
            LogLevel::Info,
            format!("Generating tests for {}", self.key.class_fqn),
        );
        self.enter(PipelineState::BuildVerifying);
        Ok(())
    }

    fn run_stages(&mut self, cancel: &CancelToken) -> Result<TestSuite, GenerationError> {
        /* ================= BUILD ================= */

        let built = self.collaborators.builder.run_build(cancel);
        self.check_stopped(cancel)?;
        if !built {
            return Err(self.fail(GenerationError::BuildFailure));
        }

        /* ================= PROMPT ================= */

        self.advance(PipelineState::PromptBuilding, cancel)?;

        let message = match self.feedback.take() {
            Some(feedback) => feedback,
            None => {
                let prompt = build_prompt(&self.context);
                self.prompt_hash = prompt_hash(&prompt);
                prompt
            }
        };
        self.conversation.append(ChatMessage::user(message));

        /* ================= DISPATCH ================= */

        self.advance(PipelineState::Dispatching, cancel)?;
        self.log(LogLevel::Info, "Prompt prepared. Calling LLM…");

        let started = Instant::now();
        let mut assembler = assembler_for(self.context.cut.language, &self.context.cut.fqn);
        let outcome = self
            .collaborators
            .backend
            .send(&self.conversation, assembler.as_mut(), cancel);

        if outcome != SendOutcome::Ok {
            self.check_stopped(cancel)?;
            return Err(self.fail(outcome.into()));
        }

        self.conversation
            .append(ChatMessage::assistant(assembler.content()));
        self.log(
            LogLevel::Success,
            format!(
                "LLM response received in {:.2}s",
                started.elapsed().as_secs_f32()
            ),
        );

        /* ================= ASSEMBLE ================= */

        self.advance(PipelineState::Assembling, cancel)?;

        let package_hint = self.context.cut.package_name().to_string();
        let Some(suite) = assembler.assemble_test_suite(&package_hint) else {
            return Err(self.fail(GenerationError::EmptyResult));
        };

        self.log(
            LogLevel::Info,
            format!("Assembled {} test case(s)", suite.len()),
        );

        /* ================= PERSIST ================= */

        self.advance(PipelineState::Persisting, cancel)?;

        if !self.workspace.is_current(&self.key) {
            return Err(GenerationError::Cancelled);
        }

        let metadata = JobMetadata {
            model: self.collaborators.backend.model().to_string(),
            language: self.context.cut.language,
            prompt_hash: self.prompt_hash.clone(),
            generated_at: Utc::now(),
            turns: self.conversation.len(),
        };

        if let Err(e) = self
            .collaborators
            .store
            .save(&self.key, &suite, &metadata)
        {
            return Err(self.fail(GenerationError::Persistence(e)));
        }

        self.advance(PipelineState::Done, cancel)?;
        Ok(suite)
    }

    /// Cancellation and the error monitor override whatever the stage did.
    fn check_stopped(&self, cancel: &CancelToken) -> Result<(), GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        if self.monitor.has_error_occurred() {
            return Err(self
                .monitor
                .reason()
                .unwrap_or_else(|| GenerationError::Transport("job stopped after an error".into())));
        }

        Ok(())
    }

    fn advance(&mut self, next: PipelineState, cancel: &CancelToken) -> Result<(), GenerationError> {
        self.check_stopped(cancel)?;
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, job = %self.key.result_name, "pipeline transition");
        self.state = next.clone();
        self.emit(PipelineEvent::State(next));
    }

    /// Records a fatal error so related work for this job stops too.
    fn fail(&self, error: GenerationError) -> GenerationError {
        if !error.is_cancellation() {
            self.monitor.report(error.clone());
        }
        error
    }

    fn finish(
        &mut self,
        result: Result<TestSuite, GenerationError>,
    ) -> Result<TestSuite, GenerationError> {
        match &result {
            Ok(suite) => {
                self.log(
                    LogLevel::Success,
                    format!("Saved {} test(s) as {}", suite.len(), self.key.result_name),
                );
                self.emit(PipelineEvent::Finished {
                    result_name: self.key.result_name.clone(),
                    tests: suite.len(),
                });
            }
            Err(e) if e.is_cancellation() => {
                self.enter(PipelineState::Aborted(e.clone()));
                self.log(LogLevel::Warn, "Generation cancelled.");
                self.emit(PipelineEvent::Cancelled);
            }
            Err(e) => {
                warn!(job = %self.key.result_name, "generation aborted: {e}");
                self.enter(PipelineState::Aborted(e.clone()));
                self.log(LogLevel::Error, e.to_string());
                self.emit(PipelineEvent::Failed(e.clone()));
            }
        }
        result
    }

    fn log(&self, level: LogLevel, msg: impl Into<String>) {
        self.emit(PipelineEvent::Log(level, msg.into()));
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// A job running on a background thread.
pub struct JobHandle {
    key: JobKey,
    cancel: CancelToken,
    worker: JoinHandle<Result<TestSuite, GenerationError>>,
}

impl JobHandle {
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Asks the worker to stop at its next checkpoint.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn join(self) -> Result<TestSuite, GenerationError> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(GenerationError::Transport("generation worker panicked".into())))
    }
}

/// Registers the job on the calling thread, then runs it on a worker
/// thread. A rejected registration is returned immediately.
pub fn run_test_generation(
    mut pipeline: Pipeline,
    tx: Sender<PipelineEvent>,
) -> Result<JobHandle, GenerationError> {
    let cancel = CancelToken::new();
    pipeline.events = Some(tx);

    if let Err(e) = pipeline.start(&cancel) {
        let _ = pipeline.finish(Err(e.clone()));
        return Err(e);
    }

    let key = pipeline.key.clone();
    let worker_cancel = cancel.clone();
    let worker = thread::spawn(move || pipeline.run(&worker_cancel));

    Ok(JobHandle {
        key,
        cancel,
        worker,
    })
}
