//! Line-level extraction from raw model output: code fences, imports and
//! the package declaration.

use std::collections::BTreeSet;

/// Markers of a legacy framework whose imports must not leak into
/// generated suites.
const EXCLUDED_IMPORT_MARKERS: [&str; 2] = ["evosuite", "RunWith"];

/// Returns the body of the first fenced code block, or the whole text when
/// the model answered without a fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };

    // the fence line may carry a language tag
    let after_open = &raw[open + 3..];
    let body_start = match after_open.find('\n') {
        Some(nl) => nl + 1,
        None => return "",
    };
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

/// Imported paths from `code`, excluding self-imports of `class_fqn` and
/// legacy framework lines.
pub fn extract_imports(code: &str, class_fqn: &str) -> BTreeSet<String> {
    code.lines()
        .map(str::trim)
        .filter(|line| line.starts_with("import "))
        .filter(|line| !EXCLUDED_IMPORT_MARKERS.iter().any(|m| line.contains(m)))
        .filter(|line| class_fqn.is_empty() || !line.contains(class_fqn))
        .map(|line| {
            line["import ".len()..]
                .trim()
                .trim_end_matches(';')
                .trim()
                .to_string()
        })
        .filter(|path| !path.is_empty())
        .collect()
}

pub fn extract_package(code: &str) -> Option<String> {
    code.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("package "))
        .map(|rest| rest.trim().trim_end_matches(';').trim().to_string())
        .filter(|pkg| !pkg.is_empty())
}
