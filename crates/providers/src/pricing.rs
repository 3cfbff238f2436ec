//! Cost accounting for Anthropic model calls.
//!
//! Anthropic publishes per-million-token rates by model family, and dated
//! releases inherit their family's rate. The card below is a snapshot of
//! the published rates. Reasoning tokens bill as ordinary output tokens,
//! so cost needs only the input and output counts.

use serde::{Deserialize, Serialize};

/// USD per million tokens, input and output priced separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_usd: f64,
    pub output_usd: f64,
}

impl ModelPricing {
    pub const fn per_mtok(input_usd: f64, output_usd: f64) -> Self {
        Self {
            input_usd,
            output_usd,
        }
    }

    /// Cost in USD for one call's token counts.
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) * self.input_usd + f64::from(output_tokens) * self.output_usd)
            / 1e6
    }
}

/// Published rates by model-family prefix. Lookup takes the longest prefix
/// that matches, so `claude-opus-4-1-20250805` resolves to `claude-opus-4-1`
/// rather than `claude-opus-4`.
const RATE_CARD: &[(&str, ModelPricing)] = &[
    ("claude-opus-4-1", ModelPricing::per_mtok(15.0, 75.0)),
    ("claude-opus-4", ModelPricing::per_mtok(15.0, 75.0)),
    ("claude-sonnet-4", ModelPricing::per_mtok(3.0, 15.0)),
    ("claude-3-7-sonnet", ModelPricing::per_mtok(3.0, 15.0)),
    ("claude-3-5-sonnet", ModelPricing::per_mtok(3.0, 15.0)),
    ("claude-3-5-haiku", ModelPricing::per_mtok(0.8, 4.0)),
    ("claude-3-haiku", ModelPricing::per_mtok(0.25, 1.25)),
];

/// Rate applied when no family matches. Keeps cost estimates non-zero for
/// renamed or brand-new models; mid-tier is the least wrong guess.
const FALLBACK_RATE: ModelPricing = ModelPricing::per_mtok(3.0, 15.0);

/// Read-only lookup from model identifier to its family rate.
#[derive(Debug, Clone)]
pub struct PricingTable {
    card: &'static [(&'static str, ModelPricing)],
}

impl PricingTable {
    pub fn with_defaults() -> Self {
        Self { card: RATE_CARD }
    }

    /// The rate for a model: longest matching family prefix, fallback rate
    /// when nothing matches.
    pub fn rate_for(&self, model: &str) -> ModelPricing {
        let model = model.to_ascii_lowercase();
        self.card
            .iter()
            .filter(|(family, _)| model.starts_with(family))
            .max_by_key(|(family, _)| family.len())
            .map(|(_, rate)| *rate)
            .unwrap_or(FALLBACK_RATE)
    }

    /// Cost in USD for one call against `model`.
    pub fn compute_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.rate_for(model).cost(input_tokens, output_tokens)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sonnet_call_costs_out_as_published() {
        let table = PricingTable::with_defaults();
        // 1k input at $3/M plus 500 output at $15/M
        let cost = table.compute_cost("claude-sonnet-4", 1000, 500);
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn dated_release_inherits_the_family_rate() {
        let table = PricingTable::with_defaults();
        let family = table.compute_cost("claude-opus-4", 1_000_000, 0);
        let dated = table.compute_cost("claude-opus-4-20250514", 1_000_000, 0);
        assert!((family - dated).abs() < 1e-10);
        assert!((dated - 15.0).abs() < 1e-10);
    }

    #[test]
    fn lookup_ignores_case() {
        let table = PricingTable::with_defaults();
        let cost = table.compute_cost("Claude-Sonnet-4-20250514", 1_000_000, 0);
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn unknown_model_estimates_at_the_fallback_rate() {
        let table = PricingTable::with_defaults();
        let cost = table.compute_cost("experimental-model-x", 1_000_000, 0);
        assert!((cost - 3.0).abs() < 1e-10);
    }

    #[test]
    fn haiku_runs_cheaper_than_sonnet() {
        let table = PricingTable::with_defaults();
        let haiku = table.compute_cost("claude-3-5-haiku", 10_000, 10_000);
        let sonnet = table.compute_cost("claude-sonnet-4", 10_000, 10_000);
        assert!(haiku < sonnet);
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.compute_cost("claude-sonnet-4", 0, 0), 0.0);
    }
}
