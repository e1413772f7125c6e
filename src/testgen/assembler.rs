//! Streamed model output -> structured test suite.
//!
//! Assemblers only accumulate text while the stream is running. Parsing
//! happens once, in `assemble_test_suite`, over the whole buffer, so the
//! result does not depend on how the backend chunked its output.

use std::sync::LazyLock;

use regex::Regex;

use crate::testgen::imports::{extract_imports, extract_package, strip_code_fence};
use crate::testgen::language::Language;
use crate::testgen::test_suite::{TestCase, TestSuite};

const TEST_ANNOTATION: &str = "@Test";

static TEST_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@Test\b").unwrap());
static JAVA_TEST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bvoid\s+(\w+)\s*\(").unwrap());
static KOTLIN_TEST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfun\s+(?:`([^`]+)`|(\w+))\s*\(").unwrap());

pub trait TestsAssembler: Send {
    /// Appends one streamed fragment. Empty fragments are valid.
    fn consume(&mut self, fragment: &str);

    /// Raw text received so far.
    fn content(&self) -> &str;

    /// Parses the accumulated text. `None` means the response held no test
    /// cases at all.
    fn assemble_test_suite(&self, package_hint: &str) -> Option<TestSuite>;
}

/// Picks the assembler for the job's target language.
pub fn assembler_for(language: Language, class_fqn: &str) -> Box<dyn TestsAssembler> {
    match language {
        Language::Java => Box::new(JUnitTestsAssembler::new(class_fqn)),
        Language::Kotlin => Box::new(KotlinTestsAssembler::new(class_fqn)),
    }
}

/* ============================================================
   Java / JUnit
   ============================================================ */

#[derive(Debug, Default)]
pub struct JUnitTestsAssembler {
    class_fqn: String,
    raw: String,
}

impl JUnitTestsAssembler {
    pub fn new(class_fqn: impl Into<String>) -> Self {
        Self {
            class_fqn: class_fqn.into(),
            raw: String::new(),
        }
    }
}

impl TestsAssembler for JUnitTestsAssembler {
    fn consume(&mut self, fragment: &str) {
        self.raw.push_str(fragment);
    }

    fn content(&self) -> &str {
        &self.raw
    }

    fn assemble_test_suite(&self, package_hint: &str) -> Option<TestSuite> {
        parse_test_suite(&self.raw, &self.class_fqn, package_hint, java_test_name)
    }
}

fn java_test_name(code: &str) -> Option<String> {
    JAVA_TEST_NAME
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/* ============================================================
   Kotlin
   ============================================================ */

#[derive(Debug, Default)]
pub struct KotlinTestsAssembler {
    class_fqn: String,
    raw: String,
}

impl KotlinTestsAssembler {
    pub fn new(class_fqn: impl Into<String>) -> Self {
        Self {
            class_fqn: class_fqn.into(),
            raw: String::new(),
        }
    }
}

impl TestsAssembler for KotlinTestsAssembler {
    fn consume(&mut self, fragment: &str) {
        self.raw.push_str(fragment);
    }

    fn content(&self) -> &str {
        &self.raw
    }

    fn assemble_test_suite(&self, package_hint: &str) -> Option<TestSuite> {
        parse_test_suite(&self.raw, &self.class_fqn, package_hint, kotlin_test_name)
    }
}

fn kotlin_test_name(code: &str) -> Option<String> {
    KOTLIN_TEST_NAME
        .captures(code)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
}

/* ============================================================
   Shared parsing
   ============================================================ */

fn parse_test_suite(
    raw: &str,
    class_fqn: &str,
    package_hint: &str,
    test_name: fn(&str) -> Option<String>,
) -> Option<TestSuite> {
    let code = strip_code_fence(raw);

    let markers: Vec<_> = TEST_MARKER.find_iter(code).collect();
    if markers.is_empty() {
        return None;
    }

    let mut test_cases = Vec::new();

    for (idx, marker) in markers.iter().enumerate() {
        let segment_end = markers
            .get(idx + 1)
            .map(|next| next.start())
            .unwrap_or(code.len());
        let segment = &code[marker.end()..segment_end];

        let body = match method_body_end(segment) {
            Some(end) => &segment[..end],
            None => segment.trim_end(),
        };

        let test_code = format!("{TEST_ANNOTATION}{body}");

        // prose that merely mentions the annotation has no method to name
        let Some(name) = test_name(&test_code) else {
            continue;
        };

        test_cases.push(TestCase {
            id: test_cases.len(),
            name,
            code: test_code,
            covered_lines: Default::default(),
        });
    }

    if test_cases.is_empty() {
        return None;
    }

    let package_name = extract_package(code).unwrap_or_else(|| package_hint.to_string());

    Some(TestSuite {
        package_name,
        imports: extract_imports(code, class_fqn),
        test_cases,
    })
}

/// Byte offset just past the brace closing the first `{ ... }` block in
/// `segment`. String and char literals, backticked identifiers and comments
/// are skipped.
fn method_body_end(segment: &str) -> Option<usize> {
    let bytes = segment.as_bytes();
    let mut depth = 0usize;
    let mut opened = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = segment[i..].find('\n').map_or(bytes.len(), |n| i + n);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = segment[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |n| i + 2 + n + 2);
                continue;
            }
            b'"' if segment[i..].starts_with("\"\"\"") => {
                i = segment[i + 3..]
                    .find("\"\"\"")
                    .map_or(bytes.len(), |n| i + 3 + n + 3);
                continue;
            }
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            // Kotlin names like `returns user's name` may hold quotes and braces
            b'`' => {
                let rest = &segment[i + 1..];
                if let Some(n) = rest.find(['`', '\n']) {
                    if rest.as_bytes()[n] == b'`' {
                        i += 1 + n + 1;
                        continue;
                    }
                }
            }
            b'\'' => {
                if let Some(len) = char_literal_len(&segment[i..]) {
                    i += len;
                    continue;
                }
            }
            b'{' => {
                depth += 1;
                opened = true;
            }
            b'}' if opened => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Length in bytes of the char literal at the start of `s` (`'x'`, `'\n'`,
/// `'\u0041'`). `None` when the quote is an apostrophe in prose.
fn char_literal_len(s: &str) -> Option<usize> {
    let c = s[1..].chars().next()?;
    match c {
        '\n' | '\'' => None,
        '\\' => {
            let (close, ch) = s[2..]
                .char_indices()
                .skip(1)
                .take(6)
                .find(|&(_, ch)| ch == '\'' || ch == '\n')?;
            (ch == '\'').then_some(2 + close + 1)
        }
        _ => {
            let end = 1 + c.len_utf8();
            s[end..].starts_with('\'').then_some(end + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn java(text: &str) -> JUnitTestsAssembler {
        let mut a = JUnitTestsAssembler::new("a.Subject");
        a.consume(text);
        a
    }

    #[test]
    fn two_tests_with_imports() {
        let a = java("import a.B;\nimport a.C;\n@Test void t1(){...}\n@Test void t2(){...}");
        let suite = a.assemble_test_suite("a").unwrap();

        assert_eq!(
            suite.imports.iter().cloned().collect::<Vec<_>>(),
            vec!["a.B".to_string(), "a.C".to_string()]
        );
        assert_eq!(suite.len(), 2);
        assert_eq!(suite.test_cases[0].id, 0);
        assert_eq!(suite.test_cases[0].name, "t1");
        assert_eq!(suite.test_cases[0].code, "@Test void t1(){...}");
        assert_eq!(suite.test_cases[1].id, 1);
        assert_eq!(suite.test_cases[1].name, "t2");
        assert_eq!(suite.package_name, "a");
    }

    #[test]
    fn no_test_markers_means_no_suite() {
        let a = java("Sorry, I cannot help with that.");
        assert!(a.assemble_test_suite("a").is_none());
    }

    #[test]
    fn marker_without_method_means_no_suite() {
        let a = java("Annotate each method with @Test and run it.");
        assert!(a.assemble_test_suite("a").is_none());
    }

    #[test]
    fn enclosing_class_brace_is_not_part_of_last_test() {
        let text = "```java\n\
            package com.acme;\n\
            import org.junit.Test;\n\
            import static org.junit.Assert.*;\n\
            public class CalcTest {\n\
                @Test\n\
                public void addsNumbers() {\n\
                    if (true) { assertEquals(2, 1 + 1); }\n\
                }\n\
                @Test(expected = IllegalStateException.class)\n\
                public void rejectsState() {\n\
                    String s = \"}\"; // }\n\
                    throw new IllegalStateException(s);\n\
                }\n\
            }\n\
            ```";
        let suite = java(text).assemble_test_suite("ignored").unwrap();

        assert_eq!(suite.package_name, "com.acme");
        assert_eq!(suite.test_names(), vec!["addsNumbers", "rejectsState"]);

        assert_eq!(
            suite.test_cases[1].code,
            "@Test(expected = IllegalStateException.class)\n\
             public void rejectsState() {\n\
             String s = \"}\"; // }\n\
             throw new IllegalStateException(s);\n\
             }"
        );
    }

    #[test]
    fn unterminated_body_is_kept() {
        let suite = java("@Test void partial() { assertTrue(").assemble_test_suite("p").unwrap();
        assert_eq!(suite.test_cases[0].code, "@Test void partial() { assertTrue(");
    }

    #[test]
    fn ids_stay_dense_when_a_body_is_skipped() {
        let text = "@Test void a() {}\n@Test\n@Test void b() {}";
        let suite = java(text).assemble_test_suite("p").unwrap();
        assert_eq!(suite.test_names(), vec!["a", "b"]);
        assert_eq!(
            suite.test_cases.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn kotlin_backticked_names() {
        let mut a = KotlinTestsAssembler::new("a.Subject");
        a.consume("import a.Subject\nimport kotlin.test.assertTrue\n");
        a.consume("class SubjectTest {\n  @Test\n  fun `handles empty input`() {\n    assertTrue(true)\n  }\n");
        a.consume("  @Test fun plain() = run { }\n}\n");

        let suite = a.assemble_test_suite("a").unwrap();
        assert_eq!(suite.test_names(), vec!["handles empty input", "plain"]);
        assert_eq!(suite.imports.len(), 1);
    }

    #[test]
    fn chunking_does_not_change_the_result() {
        let text = "Sure!\n```java\nimport a.B;\nimport a.Subject;\n\
                    public class T {\n  @Test\n  public void x() { int[] a = {1, 2}; }\n\
                    /* @Test */\n  @Test public void y() { char c = '{'; }\n}\n```\n";
        let whole = java(text).assemble_test_suite("a");
        assert!(whole.is_some());

        let chars: Vec<char> = text.chars().collect();
        for size in 1..=9 {
            let mut a = JUnitTestsAssembler::new("a.Subject");
            for chunk in chars.chunks(size) {
                a.consume(&chunk.iter().collect::<String>());
            }
            assert_eq!(a.assemble_test_suite("a"), whole, "chunk size {size}");
        }
    }

    #[test]
    fn assembling_twice_is_identical() {
        let a = java("@Test void a() {}\n@Test void b() {}");
        assert_eq!(a.assemble_test_suite("p"), a.assemble_test_suite("p"));
        assert_eq!(a.content(), "@Test void a() {}\n@Test void b() {}");
    }

    #[test]
    fn apostrophe_in_backticked_name_keeps_the_whole_body() {
        let mut a = KotlinTestsAssembler::new("a.Subject");
        a.consume(
            "@Test fun `returns user's name`() {\n    if (x) { y() }\n    assertEquals(1, z())\n}\n\
             @Test fun plain() { assertTrue(true) }\n",
        );

        let suite = a.assemble_test_suite("a").unwrap();
        assert_eq!(suite.test_names(), vec!["returns user's name", "plain"]);
        assert_eq!(
            suite.test_cases[0].code,
            "@Test fun `returns user's name`() {\n    if (x) { y() }\n    assertEquals(1, z())\n}"
        );
    }

    #[test]
    fn apostrophe_in_last_test_does_not_swallow_the_class_brace() {
        let mut a = KotlinTestsAssembler::new("a.Subject");
        a.consume("class SubjectTest {\n    @Test fun `it's ok`() { assertTrue(true) }\n}\n");

        let suite = a.assemble_test_suite("a").unwrap();
        assert_eq!(suite.test_names(), vec!["it's ok"]);
        assert_eq!(
            suite.test_cases[0].code,
            "@Test fun `it's ok`() { assertTrue(true) }"
        );
    }

    #[test]
    fn char_literals_with_braces_and_escapes_are_skipped() {
        let a = java("@Test void c() { char q = '\\''; char b = '}'; char u = '\\u007B'; }\n}\n");
        let suite = a.assemble_test_suite("p").unwrap();
        assert_eq!(
            suite.test_cases[0].code,
            "@Test void c() { char q = '\\''; char b = '}'; char u = '\\u007B'; }"
        );
    }

    #[test]
    fn factory_selects_language() {
        let mut a = assembler_for(Language::Kotlin, "a.S");
        a.consume("@Test fun k() {}");
        assert_eq!(a.assemble_test_suite("a").unwrap().test_names(), vec!["k"]);
    }
}
