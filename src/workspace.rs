//! Job identity and the registry of in-flight generation jobs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::JobPolicy;
use crate::error::GenerationError;
use crate::monitor::CancelToken;

/// Identity of one generation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobKey {
    pub file_url: String,
    pub class_fqn: String,
    /// Source modification time, seconds since the epoch.
    pub mod_ts: i64,
    pub result_name: String,
    pub classpath: String,
}

impl JobKey {
    pub fn new(
        file_url: impl Into<String>,
        class_fqn: impl Into<String>,
        mod_ts: i64,
        classpath: impl Into<String>,
    ) -> Self {
        Self {
            file_url: file_url.into(),
            class_fqn: class_fqn.into(),
            mod_ts,
            result_name: format!("test_gen_result_{}", Uuid::new_v4()),
            classpath: classpath.into(),
        }
    }

    /// What the job generates for. Two keys with the same target must never
    /// run side by side.
    pub fn target(&self) -> JobTarget {
        JobTarget {
            file_url: self.file_url.clone(),
            class_fqn: self.class_fqn.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobTarget {
    pub file_url: String,
    pub class_fqn: String,
}

#[derive(Debug)]
struct PendingJob {
    result_name: String,
    cancel: CancelToken,
}

/// Registry of running jobs, shared by the host and all workers.
#[derive(Debug, Default)]
pub struct Workspace {
    pending: Mutex<HashMap<JobTarget, PendingJob>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` as the running job for its target.
    ///
    /// With [`JobPolicy::Reject`] a second job for a busy target fails with
    /// `JobInProgress`. With [`JobPolicy::Replace`] the running job is
    /// cancelled and loses its right to persist.
    pub fn register(
        &self,
        key: &JobKey,
        cancel: &CancelToken,
        policy: JobPolicy,
    ) -> Result<(), GenerationError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let target = key.target();

        if let Some(running) = pending.get(&target) {
            match policy {
                JobPolicy::Reject => {
                    warn!(class = %key.class_fqn, "generation already in progress");
                    return Err(GenerationError::JobInProgress(key.class_fqn.clone()));
                }
                JobPolicy::Replace => {
                    info!(
                        replaced = %running.result_name,
                        "cancelling in-flight job for {}",
                        key.class_fqn
                    );
                    running.cancel.cancel();
                }
            }
        }

        pending.insert(
            target,
            PendingJob {
                result_name: key.result_name.clone(),
                cancel: cancel.clone(),
            },
        );
        Ok(())
    }

    /// True while `key` is still the registered job for its target.
    pub fn is_current(&self, key: &JobKey) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.target())
            .is_some_and(|job| job.result_name == key.result_name)
    }

    /// Unregisters `key`; a no-op when another job has replaced it.
    pub fn complete(&self, key: &JobKey) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let target = key.target();
        if pending
            .get(&target)
            .is_some_and(|job| job.result_name == key.result_name)
        {
            pending.remove(&target);
        }
    }

    /// Result names of all jobs in progress.
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|job| job.result_name.clone())
            .collect();
        names.sort();
        names
    }
}
