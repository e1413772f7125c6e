use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::monitor::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Verifies that the project still compiles before any tokens are spent.
pub trait ProjectBuilder: Send + Sync {
    fn run_build(&self, cancel: &CancelToken) -> bool;
}

/// Runs a shell build command in the project root.
///
/// Without a command the build is considered successful.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    root: PathBuf,
    command: Option<String>,
}

impl CommandBuilder {
    pub fn new(root: impl Into<PathBuf>, command: Option<String>) -> Self {
        Self {
            root: root.into(),
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }
}

impl ProjectBuilder for CommandBuilder {
    fn run_build(&self, cancel: &CancelToken) -> bool {
        let Some(command) = &self.command else {
            return true;
        };

        info!(%command, root = %self.root.display(), "building project");
        let started = Instant::now();

        let mut child = match Command::new("sh")
            .arg("-lc")
            .arg(command)
            .current_dir(&self.root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to start build: {e}");
                return false;
            }
        };

        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                info!("build cancelled");
                return false;
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(
                        success = status.success(),
                        "build finished in {:.2}s",
                        started.elapsed().as_secs_f32()
                    );
                    return status.success();
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!("failed to wait for build: {e}");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_command_means_success() {
        let builder = CommandBuilder::new(".", Some("  ".into()));
        assert!(builder.run_build(&CancelToken::new()));
    }

    #[test]
    fn exit_status_decides() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CommandBuilder::new(dir.path(), Some("true".into())).run_build(&CancelToken::new()));
        assert!(!CommandBuilder::new(dir.path(), Some("exit 3".into())).run_build(&CancelToken::new()));
    }

    #[test]
    fn cancelled_build_fails() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let builder = CommandBuilder::new(".", Some("sleep 5".into()));
        assert!(!builder.run_build(&cancel));
    }
}
