use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::testgen::language::Language;
use crate::testgen::test_suite::TestSuite;
use crate::workspace::JobKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobMetadata {
    pub model: String,
    pub language: Language,
    pub prompt_hash: String,
    pub generated_at: DateTime<Utc>,
    /// Messages in the conversation when the suite was assembled.
    pub turns: usize,
}

/// Receives finished suites. Called at most once per job.
pub trait ResultStore: Send + Sync {
    fn save(&self, key: &JobKey, suite: &TestSuite, metadata: &JobMetadata) -> Result<(), String>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedResult {
    pub key: JobKey,
    pub metadata: JobMetadata,
    pub suite: TestSuite,
}

/// Writes one pretty-printed JSON file per job into a result directory.
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    dir: PathBuf,
}

impl JsonResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn result_path(&self, key: &JobKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.result_name))
    }

    pub fn load(path: &Path) -> Result<PersistedResult, String> {
        let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    }
}

impl ResultStore for JsonResultStore {
    fn save(&self, key: &JobKey, suite: &TestSuite, metadata: &JobMetadata) -> Result<(), String> {
        fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;

        let payload = PersistedResult {
            key: key.clone(),
            metadata: metadata.clone(),
            suite: suite.clone(),
        };

        let text = serde_json::to_string_pretty(&payload).map_err(|e| e.to_string())?;
        fs::write(self.result_path(key), text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testgen::test_suite::TestCase;

    #[test]
    fn saved_result_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonResultStore::new(dir.path().join("results"));
        let key = JobKey::new("file:///A.java", "a.A", 0, "lib/junit.jar");
        let suite = TestSuite {
            package_name: "a".into(),
            imports: ["org.junit.Test".to_string()].into_iter().collect(),
            test_cases: vec![TestCase {
                id: 0,
                name: "addTest".into(),
                code: "@Test void addTest() {}".into(),
                covered_lines: Default::default(),
            }],
        };
        let metadata = JobMetadata {
            model: "gpt-4o".into(),
            language: Language::Java,
            prompt_hash: "abc".into(),
            generated_at: Utc::now(),
            turns: 2,
        };

        store.save(&key, &suite, &metadata).unwrap();

        let loaded = JsonResultStore::load(&store.result_path(&key)).unwrap();
        assert_eq!(loaded.key, key);
        assert_eq!(loaded.suite, suite);
        assert_eq!(loaded.metadata, metadata);
    }
}
