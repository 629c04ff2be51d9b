//! Slug sanitisation for run identifiers.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 40;

/// Slug used when nothing survives sanitisation.
pub const DEFAULT_SLUG: &str = "run";

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Lower-case, collapse non-alphanumeric runs to `-`, trim, and cap the length.
pub fn sanitize_slug(input: &str) -> String {
    let lower = input.to_lowercase();
    let replaced = NON_ALNUM_RE.replace_all(&lower, "-");
    let mut slug = replaced.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        // Only ASCII survives the regex, so byte truncation is char-safe.
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    if slug.is_empty() {
        return DEFAULT_SLUG.to_string();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_titles() {
        let cases = [
            ("Fix Auth Bug", "fix-auth-bug"),
            ("Add User's Profile (v2)", "add-user-s-profile-v2"),
            ("  spaces  ", "spaces"),
            ("", "run"),
            ("!!!", "run"),
            ("123-abc", "123-abc"),
            ("Ünïcode Title", "n-code-title"),
        ];
        for (input, want) in cases {
            assert_eq!(sanitize_slug(input), want, "input {input:?}");
        }
    }

    #[test]
    fn caps_length_without_trailing_hyphen() {
        assert_eq!(sanitize_slug(&"a".repeat(50)), "a".repeat(40));

        let input = format!("{} tail", "b".repeat(39));
        let slug = sanitize_slug(&input);
        assert_eq!(slug, "b".repeat(39));
        assert!(!slug.ends_with('-'));
    }
}
