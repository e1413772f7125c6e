use sha2::{Digest, Sha256};

use crate::context::PromptContext;
use crate::testgen::language::Language;

const PROMPT_ABI_VERSION: &str = "v1-unit-testgen";

/// Builds the initial user message for a generation job.
pub fn build_prompt(ctx: &PromptContext) -> String {
    let cut = &ctx.cut;
    let language = cut.language;
    let mut out = String::new();

    /* ---------- TASK ---------- */
    out.push_str(&format!(
        "Generate unit tests in {} for {} to achieve 100% line coverage for this class.\n",
        language.display_name(),
        cut.display_name()
    ));
    out.push_str("Dont use @Before and @After test methods.\n");
    out.push_str("Make tests as atomic as possible.\n");
    out.push_str(&format!(
        "All tests should be for {}.\n",
        language.test_framework()
    ));
    out.push_str(mocking_rule(language));
    out.push_str(
        "Name all methods according to the template - [MethodUnderTest][Scenario]Test, \
         and use only English letters.\n",
    );
    out.push_str("Annotate every test method with @Test.\n");

    /* ---------- CLASS UNDER TEST ---------- */
    out.push_str("The source code of class under test is as follows:\n");
    out.push_str(&format!("```{}\n", language.fence_tag()));
    out.push_str(cut.source.trim_end());
    out.push_str("\n```\n");

    /* ---------- RELATED TYPES ---------- */
    let related: Vec<_> = ctx
        .related
        .iter()
        .filter(|t| t.fqn != cut.fqn && !t.signatures.is_empty())
        .collect();

    if !related.is_empty() {
        out.push_str(
            "Here are the method signatures of classes used by the class under test. \
             Only use these signatures for creating objects, not your own ideas.\n",
        );
        for ty in related {
            out.push_str(&format!("=== methods in {}:\n", ty.fqn));
            for sig in &ty.signatures {
                out.push_str(&format!(" - {sig}\n"));
            }
        }
    }

    /* ---------- POLYMORPHISM ---------- */
    if ctx.polymorphism.values().any(|subs| !subs.is_empty()) {
        out.push_str("Polymorphic relationships between the classes involved:\n");
        for (supertype, subtypes) in &ctx.polymorphism {
            for sub in subtypes {
                out.push_str(&format!("{sub} is a sub-class of {supertype}.\n"));
            }
        }
    }

    out
}

fn mocking_rule(language: Language) -> &'static str {
    match language {
        Language::Java => {
            "In case of mocking, use Mockito 5. But, do not use mocking for all tests.\n"
        }
        Language::Kotlin => {
            "In case of mocking, use MockK. But, do not use mocking for all tests.\n"
        }
    }
}

/// Stable fingerprint of a prompt, recorded with saved results.
pub fn prompt_hash(prompt: &str) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.as_bytes());
    hex::encode(h.finalize())
}
