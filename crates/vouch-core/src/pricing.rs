//! Static model pricing and cost estimation.
//!
//! Prices are USD per one million tokens. Unknown models are priced with the
//! configured default entry; that fallback is logged at `warn` every time so a
//! mispriced test is visible in the run output.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters per token used by [`estimate_tokens`]. A heuristic, not a tokenizer.
pub const CHARS_PER_TOKEN: usize = 4;

/// An alternative must cost at most this fraction of the current model's mean price.
const CHEAPER_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingEntry {
    pub model: String,
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub provider: String,
}

impl PricingEntry {
    pub fn new(model: &str, input: f64, output: f64, provider: &str) -> Self {
        Self {
            model: model.to_string(),
            input_per_million: input,
            output_per_million: output,
            provider: provider.to_string(),
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1e6) * self.input_per_million
            + (output_tokens as f64 / 1e6) * self.output_per_million
    }

    pub fn mean_price(&self) -> f64 {
        (self.input_per_million + self.output_per_million) / 2.0
    }
}

/// Result of resolving a model id against the table.
#[derive(Debug, Clone, Copy)]
pub struct PriceQuote<'a> {
    pub entry: &'a PricingEntry,
    /// False when the default entry stood in for an unknown model.
    pub exact: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CostPrediction {
    pub model: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CostSuggestion {
    pub model: String,
    pub provider: String,
    pub estimated_cost_usd: f64,
    pub savings_usd: f64,
    pub savings_pct: f64,
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: BTreeMap<String, PricingEntry>,
    default_model: String,
}

impl PricingTable {
    pub fn new(entries: Vec<PricingEntry>, default_model: &str) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for e in entries {
            if e.input_per_million < 0.0 || e.output_per_million < 0.0 {
                return Err(ConfigError(format!(
                    "negative price for model '{}'",
                    e.model
                )));
            }
            map.insert(e.model.clone(), e);
        }
        if !map.contains_key(default_model) {
            return Err(ConfigError(format!(
                "default pricing model '{}' is not in the pricing table",
                default_model
            )));
        }
        Ok(Self {
            entries: map,
            default_model: default_model.to_string(),
        })
    }

    /// Built-in table merged with `overrides` (overrides win on model id).
    pub fn with_overrides(
        overrides: &[PricingEntry],
        default_model: &str,
    ) -> Result<Self, ConfigError> {
        let mut entries = default_entries();
        entries.extend(overrides.iter().cloned());
        Self::new(entries, default_model)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn entries(&self) -> impl Iterator<Item = &PricingEntry> {
        self.entries.values()
    }

    pub fn resolve(&self, model: &str) -> PriceQuote<'_> {
        if let Some(entry) = self.entries.get(model) {
            return PriceQuote { entry, exact: true };
        }
        // `new` guarantees the default entry exists.
        let entry = &self.entries[&self.default_model];
        tracing::warn!(
            event = "vouch.pricing.fallback",
            requested_model = %model,
            priced_as = %entry.model,
            "unknown model '{}', pricing as '{}'",
            model,
            entry.model
        );
        PriceQuote { entry, exact: false }
    }

    pub fn lookup(&self, model: &str) -> &PricingEntry {
        self.resolve(model).entry
    }

    pub fn predict_cost(
        &self,
        model: &str,
        input_text: &str,
        estimated_output_tokens: u64,
    ) -> CostPrediction {
        let input_tokens = estimate_tokens(input_text);
        let entry = self.lookup(model);
        CostPrediction {
            model: model.to_string(),
            estimated_input_tokens: input_tokens,
            estimated_output_tokens,
            estimated_cost_usd: entry.cost(input_tokens, estimated_output_tokens),
        }
    }

    /// Closest model whose mean price is at most half the current model's.
    ///
    /// "Closest" is the most expensive qualifying model, so the suggestion does not
    /// jump straight to the lowest tier.
    pub fn suggest_cheaper_model(
        &self,
        current_model: &str,
        current_cost_usd: f64,
    ) -> Option<CostSuggestion> {
        let current = self.lookup(current_model);
        let current_mean = current.mean_price();
        if current_mean <= 0.0 {
            return None;
        }

        let mut best: Option<&PricingEntry> = None;
        for e in self.entries.values() {
            if e.model == current.model || e.model == current_model {
                continue;
            }
            if e.mean_price() > current_mean * CHEAPER_RATIO {
                continue;
            }
            match best {
                Some(b) if b.mean_price() >= e.mean_price() => {}
                _ => best = Some(e),
            }
        }

        best.map(|alt| {
            let ratio = alt.mean_price() / current_mean;
            let estimated = current_cost_usd * ratio;
            let savings = current_cost_usd - estimated;
            CostSuggestion {
                model: alt.model.clone(),
                provider: alt.provider.clone(),
                estimated_cost_usd: estimated,
                savings_usd: savings,
                savings_pct: (1.0 - ratio) * 100.0,
            }
        })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        for e in default_entries() {
            entries.insert(e.model.clone(), e);
        }
        Self {
            entries,
            default_model: DEFAULT_PRICING_MODEL.to_string(),
        }
    }
}

pub const DEFAULT_PRICING_MODEL: &str = "gpt-4o-mini";

/// Rough token count for `text` at [`CHARS_PER_TOKEN`].
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN) as u64
}

fn default_entries() -> Vec<PricingEntry> {
    vec![
        // OpenAI
        PricingEntry::new("gpt-4o", 2.50, 10.00, "openai"),
        PricingEntry::new("gpt-4o-mini", 0.15, 0.60, "openai"),
        PricingEntry::new("gpt-4-turbo", 10.00, 30.00, "openai"),
        PricingEntry::new("gpt-4", 30.00, 60.00, "openai"),
        PricingEntry::new("gpt-3.5-turbo", 0.50, 1.50, "openai"),
        PricingEntry::new("o1", 15.00, 60.00, "openai"),
        PricingEntry::new("o1-mini", 3.00, 12.00, "openai"),
        // Anthropic
        PricingEntry::new("claude-3-opus", 15.00, 75.00, "anthropic"),
        PricingEntry::new("claude-3-5-sonnet", 3.00, 15.00, "anthropic"),
        PricingEntry::new("claude-3-5-haiku", 0.80, 4.00, "anthropic"),
        PricingEntry::new("claude-3-haiku", 0.25, 1.25, "anthropic"),
        // Google
        PricingEntry::new("gemini-1.5-pro", 1.25, 5.00, "google"),
        PricingEntry::new("gemini-1.5-flash", 0.075, 0.30, "google"),
    ]
}
