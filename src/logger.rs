use std::collections::VecDeque;
use std::time::Instant;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const MAX_LOGS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
    pub at: Instant,
}

/// User-facing progress log of one job (ring buffer).
#[derive(Debug, Default)]
pub struct JobLog {
    lines: VecDeque<LogLine>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, level: LogLevel, msg: impl Into<String>) {
        if self.lines.len() >= MAX_LOGS {
            self.lines.pop_front();
        }

        self.lines.push_back(LogLine {
            level,
            text: msg.into(),
            at: Instant::now(),
        });
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Installs the stderr tracing subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
