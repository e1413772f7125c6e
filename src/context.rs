//! Code context handed to the prompt builder.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::testgen::language::Language;

static JAVA_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:public|protected)\s+[\w<>\[\],.?\s]*?\w+\s*\([^)]*\)").unwrap()
});

/// The class under test.
#[derive(Debug, Clone)]
pub struct ClassContext {
    pub fqn: String,
    pub source: String,
    pub language: Language,
}

impl ClassContext {
    pub fn new(fqn: impl Into<String>, source: impl Into<String>, language: Language) -> Self {
        Self {
            fqn: fqn.into(),
            source: source.into(),
            language,
        }
    }

    /// Simple name, e.g. `Calculator` for `com.acme.Calculator`.
    pub fn display_name(&self) -> &str {
        self.fqn.rsplit('.').next().unwrap_or(&self.fqn)
    }

    pub fn package_name(&self) -> &str {
        self.fqn.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }
}

/// Public API of a type the class under test depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSignature {
    pub fqn: String,
    pub signatures: Vec<String>,
}

impl TypeSignature {
    pub fn from_source(fqn: impl Into<String>, source: &str, language: Language) -> Self {
        Self {
            fqn: fqn.into(),
            signatures: extract_signatures(source, language),
        }
    }
}

/// Everything the prompt is built from.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub cut: ClassContext,
    pub related: Vec<TypeSignature>,
    /// Supertype FQN -> known subtypes.
    pub polymorphism: BTreeMap<String, Vec<String>>,
}

impl PromptContext {
    pub fn new(cut: ClassContext) -> Self {
        Self {
            cut,
            related: Vec::new(),
            polymorphism: BTreeMap::new(),
        }
    }

    pub fn add_subclass(&mut self, supertype: impl Into<String>, subtype: impl Into<String>) {
        self.polymorphism
            .entry(supertype.into())
            .or_default()
            .push(subtype.into());
    }
}

/// Public method and constructor signatures declared in `source`.
pub fn extract_signatures(source: &str, language: Language) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter_map(|line| match language {
            Language::Java => java_signature(line),
            Language::Kotlin => kotlin_signature(line),
        })
        .collect()
}

fn java_signature(line: &str) -> Option<String> {
    if line.contains(" class ") || line.contains(" interface ") || line.contains(" new ") {
        return None;
    }
    JAVA_SIGNATURE
        .find(line)
        .map(|m| m.as_str().trim().to_string())
}

fn kotlin_signature(line: &str) -> Option<String> {
    if ["private ", "internal ", "protected "]
        .iter()
        .any(|m| line.starts_with(m))
    {
        return None;
    }

    let declares = line.starts_with("fun ")
        || line.contains(" fun ")
        || line.starts_with("class ")
        || line.contains(" class ");
    if !declares || !line.contains('(') {
        return None;
    }

    let end = line.find(['{', '=']).unwrap_or(line.len());
    Some(line[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_from_fqn() {
        let cut = ClassContext::new("com.acme.Calculator", "", Language::Java);
        assert_eq!(cut.display_name(), "Calculator");
        assert_eq!(cut.package_name(), "com.acme");

        let bare = ClassContext::new("Calculator", "", Language::Java);
        assert_eq!(bare.package_name(), "");
    }

    #[test]
    fn java_public_methods_and_constructors() {
        let src = "public class Account {\n\
                   private int balance;\n\
                   public Account(int initial) {\n\
                   }\n\
                   public void deposit(int amount) {\n\
                   }\n\
                   protected static List<String> history(Account a, int n) { return null; }\n\
                   private void audit() {}\n\
                   }";
        assert_eq!(
            extract_signatures(src, Language::Java),
            vec![
                "public Account(int initial)",
                "public void deposit(int amount)",
                "protected static List<String> history(Account a, int n)",
            ]
        );
    }

    #[test]
    fn kotlin_functions_skip_private() {
        let src = "data class Point(val x: Int, val y: Int) {\n\
                   fun distance(other: Point): Double = 0.0\n\
                   private fun secret() {}\n\
                   override fun toString(): String {\n\
                   }\n}";
        assert_eq!(
            extract_signatures(src, Language::Kotlin),
            vec![
                "data class Point(val x: Int, val y: Int)",
                "fun distance(other: Point): Double",
                "override fun toString(): String",
            ]
        );
    }
}
