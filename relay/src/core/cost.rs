//! Cost accounting for chat-completion calls.

/// Token usage reported by a completion response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Per-token pricing in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

const fn per_million(input: f64, output: f64) -> ModelPricing {
    ModelPricing {
        input_per_token: input / 1_000_000.0,
        output_per_token: output / 1_000_000.0,
    }
}

const DEFAULT_PRICING: [(&str, ModelPricing); 5] = [
    ("anthropic/claude-opus-4-6", per_million(15.0, 75.0)),
    ("anthropic/claude-sonnet-4-6", per_million(3.0, 15.0)),
    ("deepseek/deepseek-r1", per_million(0.50, 2.00)),
    ("z-ai/glm-5", per_million(0.30, 2.55)),
    ("openai/gpt-5.2-codex", per_million(1.75, 14.0)),
];

/// Fallback pricing for a known model.
pub fn pricing_for(model: &str) -> Option<ModelPricing> {
    DEFAULT_PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
}

/// Parse a provider-reported cost header. Absent or malformed values yield `None`.
pub fn cost_from_header(value: Option<&str>) -> Option<f64> {
    let parsed: f64 = value?.trim().parse().ok()?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

/// Price `usage` with the fallback table. `None` for models not in the table.
pub fn cost_from_usage(model: &str, usage: Usage) -> Option<f64> {
    let pricing = pricing_for(model)?;
    Some(
        usage.prompt_tokens as f64 * pricing.input_per_token
            + usage.completion_tokens as f64 * pricing.output_per_token,
    )
}
