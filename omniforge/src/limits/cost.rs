//! LLM cost tables and estimation.
//!
//! Pre-call estimates feed the budget gate; post-call figures feed chain
//! metrics and the rate limiter's cost windows. Rates are USD per one
//! million tokens. Unknown models fall back to conservative (expensive)
//! defaults rather than erroring, so budget gates stay safe for models the
//! table has never heard of.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::llm::{ChatMessage, Usage};

/// Pricing and output limits for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelCost {
    /// USD per 1M input tokens.
    pub input_per_m: f64,
    /// USD per 1M output tokens.
    pub output_per_m: f64,
    /// Maximum completion tokens the model can emit.
    pub max_output_tokens: u32,
}

/// Conservative fallback for models missing from the table.
pub const UNKNOWN_MODEL_COST: ModelCost = ModelCost {
    input_per_m: 15.0,
    output_per_m: 75.0,
    max_output_tokens: 4_096,
};

static MODEL_COSTS: Lazy<HashMap<&'static str, ModelCost>> = Lazy::new(|| {
    fn cost(input: f64, output: f64, max_out: u32) -> ModelCost {
        ModelCost {
            input_per_m: input,
            output_per_m: output,
            max_output_tokens: max_out,
        }
    }

    HashMap::from([
        ("claude-opus-4", cost(15.0, 75.0, 64_000)),
        ("claude-sonnet-4", cost(3.0, 15.0, 8_192)),
        ("claude-haiku-4", cost(0.8, 4.0, 8_192)),
        ("claude-3-opus", cost(15.0, 75.0, 4_096)),
        ("claude-3-sonnet", cost(3.0, 15.0, 4_096)),
        ("claude-3-haiku", cost(0.25, 1.25, 4_096)),
        ("gpt-4", cost(30.0, 60.0, 8_192)),
        ("gpt-4-turbo", cost(10.0, 30.0, 4_096)),
        ("gpt-4o", cost(5.0, 15.0, 16_384)),
        ("gpt-4o-mini", cost(0.15, 0.6, 16_384)),
        ("gpt-3.5-turbo", cost(0.5, 1.5, 4_096)),
        ("llama-3.1-8b-instant", cost(0.05, 0.08, 131_072)),
        ("llama-3.3-70b-versatile", cost(0.59, 0.79, 32_768)),
        ("gpt-oss-120b", cost(0.15, 0.6, 65_536)),
        ("gpt-oss-20b", cost(0.075, 0.3, 65_536)),
        ("qwen3-32b", cost(0.10, 0.15, 40_960)),
    ])
});

/// Strip a provider prefix ("azure/gpt-4" -> "gpt-4").
#[must_use]
pub fn normalize_model_name(model: &str) -> &str {
    model.split_once('/').map_or(model, |(_, name)| name)
}

/// Look up a model's pricing, falling back to [`UNKNOWN_MODEL_COST`].
#[must_use]
pub fn model_cost(model: &str) -> ModelCost {
    MODEL_COSTS
        .get(normalize_model_name(model))
        .copied()
        .unwrap_or(UNKNOWN_MODEL_COST)
}

/// Maximum completion tokens for a model.
#[must_use]
pub fn max_output_tokens(model: &str) -> u32 {
    model_cost(model).max_output_tokens
}

/// Rough token estimate: one token per four characters, at least one.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.len() / 4) as u64).max(1)
}

/// Cost of a call given actual token counts.
#[must_use]
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let rates = model_cost(model);
    (input_tokens as f64 / 1_000_000.0) * rates.input_per_m
        + (output_tokens as f64 / 1_000_000.0) * rates.output_per_m
}

/// Default `max_tokens` assumption for pre-call estimates.
const DEFAULT_ESTIMATE_MAX_TOKENS: u32 = 1_000;

/// Conservative pre-call estimate for a chat request.
///
/// Input tokens are estimated from every message; output tokens are
/// assumed to be half the `max_tokens` cap (default 1000).
#[must_use]
pub fn estimate_request_cost(
    model: &str,
    messages: &[ChatMessage],
    max_tokens: Option<u32>,
) -> f64 {
    let input_tokens: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
    let output_tokens = u64::from(max_tokens.unwrap_or(DEFAULT_ESTIMATE_MAX_TOKENS) / 2).max(1);
    estimate_cost(model, input_tokens, output_tokens)
}

/// Estimated total tokens for a chat request (input plus the assumed
/// output), consumed against the rate limiter's token windows during
/// pre-flight gating.
#[must_use]
pub fn estimate_request_tokens(messages: &[ChatMessage], max_tokens: Option<u32>) -> u64 {
    let input: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
    input + u64::from(max_tokens.unwrap_or(DEFAULT_ESTIMATE_MAX_TOKENS) / 2).max(1)
}

/// Actual cost from reported usage.
#[must_use]
pub fn cost_from_usage(model: &str, usage: Usage) -> f64 {
    estimate_cost(
        model,
        u64::from(usage.input_tokens),
        u64::from(usage.output_tokens),
    )
}
