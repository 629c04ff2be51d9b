//! Extraction of file paths from a plan's "Files to Change" section.
//!
//! The heuristic only accepts bullets that look like paths; prose bullets are
//! ignored. An empty result means callers should keep the unfiltered context.

use std::sync::LazyLock;

use regex::Regex;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{2,3}\s*(.+)$").expect("valid heading regex"));

static FILES_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^#{2,3}\s*Files\s+to\s+Change\s*$").expect("valid section regex")
});

static SECTION_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{2,4}(\s|$)").expect("valid section end regex"));

const PROSE_PREFIXES: [&str; 8] = [
    "need to", "should", "will", "can", "may", "might", "could", "would",
];

/// List the level-2/3 headings of a plan. Used for diagnostics when no files
/// section is found.
pub fn plan_headings(plan: &str) -> Vec<String> {
    HEADING_RE
        .captures_iter(plan)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Extract file paths listed under the plan's "Files to Change" heading.
pub fn extract_files_from_plan(plan: &str) -> Vec<String> {
    let Some(header) = FILES_SECTION_RE.find(plan) else {
        return Vec::new();
    };
    let rest = &plan[header.end()..];
    let section = match SECTION_END_RE.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    };

    section
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('*'))
                .map(str::trim)
        })
        .filter_map(candidate_path)
        .collect()
}

fn candidate_path(bullet: &str) -> Option<String> {
    let content = bullet.trim_matches('`');
    let mut file = content;
    if let Some(idx) = content.find(" - ")
        && idx > 0
    {
        file = content[..idx].trim();
    }
    if let Some(idx) = content.find(':')
        && idx > 0
    {
        let after = content[idx + 1..].trim();
        if after.len() > 5 && !after.contains('/') && !after.contains('.') {
            file = content[..idx].trim();
        }
    }
    let file = file.trim_matches('`');
    is_valid_file_path(file).then(|| file.to_string())
}

fn is_valid_file_path(s: &str) -> bool {
    if s.is_empty() || s.contains(' ') {
        return false;
    }
    if !s.contains('.') && !s.contains('/') {
        return false;
    }
    let lower = s.to_lowercase();
    !PROSE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}
