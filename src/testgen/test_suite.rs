use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::testgen::language::Language;

/// One generated test, as cut out of the model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    pub id: usize,
    pub name: String,
    pub code: String,
    /// Filled by an execution/coverage step outside the pipeline.
    #[serde(default)]
    pub covered_lines: BTreeSet<u32>,
}

/// Structured result of one successful dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TestSuite {
    pub package_name: String,
    /// Imported paths, e.g. `org.junit.Test` or `static org.junit.Assert.*`.
    pub imports: BTreeSet<String>,
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    pub fn test_names(&self) -> Vec<&str> {
        self.test_cases.iter().map(|t| t.name.as_str()).collect()
    }

    /// Imports rendered back into source lines for `language`.
    pub fn import_lines(&self, language: Language) -> Vec<String> {
        self.imports
            .iter()
            .map(|path| match language {
                Language::Java => format!("import {path};"),
                Language::Kotlin => format!("import {path}"),
            })
            .collect()
    }
}
