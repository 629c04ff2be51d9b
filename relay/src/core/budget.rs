//! Token budgeting for API-bound step inputs.
//!
//! Token counts are approximated at four characters per token so no tokenizer
//! is needed. Files are filled in name order until the budget runs out; the
//! file that crosses the limit is cut and marked, and every later file is
//! dropped so earlier files keep their content verbatim.

use tracing::debug;

use crate::core::types::InputFiles;

/// Characters assumed per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Marker appended to the file that was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "\n\n[... truncated due to token limit ...]";

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Bound `files` plus `system_prompt` to roughly `max_tokens` tokens.
///
/// `max_tokens <= 0` disables budgeting and returns the input unchanged.
pub fn truncate_to_token_budget(
    files: &InputFiles,
    system_prompt: &str,
    max_tokens: i64,
) -> InputFiles {
    if max_tokens <= 0 {
        return files.clone();
    }
    let max_tokens = usize::try_from(max_tokens).unwrap_or(usize::MAX);
    let reserved = estimate_tokens(system_prompt);
    if reserved > max_tokens {
        debug!(reserved, max_tokens, "system prompt alone exceeds token budget");
        return InputFiles::new();
    }

    let mut remaining = max_tokens - reserved;
    let mut result = InputFiles::new();
    // BTreeMap iteration is name-ordered, independent of insertion order.
    for (name, content) in files {
        let tokens = estimate_tokens(content);
        if tokens <= remaining {
            result.insert(name.clone(), content.clone());
            remaining -= tokens;
            continue;
        }

        let keep_chars = remaining * CHARS_PER_TOKEN;
        if keep_chars > 0 {
            let mut cut = take_chars(content, keep_chars).to_string();
            cut.push_str(TRUNCATION_MARKER);
            result.insert(name.clone(), cut);
        }
        debug!(
            file = %name,
            tokens,
            kept_chars = keep_chars,
            "token budget exhausted; dropping remaining inputs"
        );
        break;
    }
    result
}

fn take_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
