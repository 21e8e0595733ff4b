//! Usage and cost ledger
//!
//! Every backend call and every metered search is recorded against the
//! session that caused it. Workers keep their own ledger and the supervisor
//! merges it at aggregation, so no ledger is ever shared between tasks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::TokenUsage;

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

/// Price used for models missing from the table
const DEFAULT_MODEL_PRICE: ModelPrice = ModelPrice {
    input: 0.001,
    output: 0.002,
};

/// Flat price per metered web search
const DEFAULT_SEARCH_PRICE: f64 = 0.005;

/// Model pricing table.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    models: HashMap<String, ModelPrice>,
    search: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        let models = [
            ("gpt-4o-mini", 0.00015, 0.0006),
            ("gpt-4o", 0.0025, 0.010),
            ("gpt-4.1", 0.03, 0.06),
            ("gpt-4.1-mini", 0.0015, 0.006),
            ("claude-sonnet-4-20250514", 0.003, 0.015),
            ("claude-haiku-4", 0.0008, 0.004),
        ]
        .into_iter()
        .map(|(name, input, output)| (name.to_string(), ModelPrice { input, output }))
        .collect();

        Self {
            models,
            search: DEFAULT_SEARCH_PRICE,
        }
    }
}

impl PricingTable {
    pub fn with_model(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.models.insert(model.into(), price);
        self
    }

    pub fn with_search_price(mut self, price: f64) -> Self {
        self.search = price;
        self
    }

    /// Price for a model; `provider:model` names are looked up by model.
    pub fn model_price(&self, model: &str) -> ModelPrice {
        let bare = model.rsplit(':').next().unwrap_or(model);
        self.models
            .get(model)
            .or_else(|| self.models.get(bare))
            .copied()
            .unwrap_or(DEFAULT_MODEL_PRICE)
    }

    pub fn cost(&self, model: &str, usage: &TokenUsage) -> f64 {
        let price = self.model_price(model);
        (usage.input_tokens as f64 / 1000.0) * price.input
            + (usage.output_tokens as f64 / 1000.0) * price.output
    }
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// e.g. "clarify", "plan", "research", "compress", "web_search"
    pub operation: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated usage for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub llm_calls: usize,
    pub searches: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// Append-only list of cost entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostLedger {
    #[serde(skip)]
    pricing: PricingTable,
    entries: Vec<CostEntry>,
}

const SEARCH_MODEL: &str = "search";

impl CostLedger {
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            pricing,
            entries: Vec::new(),
        }
    }

    /// Empty ledger sharing this ledger's pricing.
    pub fn fork(&self) -> Self {
        Self::new(self.pricing.clone())
    }

    pub fn record_llm(&mut self, operation: &str, model: &str, usage: &TokenUsage) -> f64 {
        let cost_usd = self.pricing.cost(model, usage);
        self.entries.push(CostEntry {
            operation: operation.to_string(),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            timestamp: Utc::now(),
        });
        cost_usd
    }

    pub fn record_search(&mut self, tool_name: &str) {
        self.entries.push(CostEntry {
            operation: tool_name.to_string(),
            model: SEARCH_MODEL.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: self.pricing.search,
            timestamp: Utc::now(),
        });
    }

    /// Append another ledger's entries.
    pub fn merge(&mut self, other: CostLedger) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[CostEntry] {
        &self.entries
    }

    /// Tokens consumed across all recorded backend calls.
    pub fn total_tokens(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.input_tokens + e.output_tokens)
            .sum()
    }

    pub fn summary(&self) -> CostSummary {
        self.entries.iter().fold(CostSummary::default(), |mut acc, entry| {
            if entry.model == SEARCH_MODEL {
                acc.searches += 1;
            } else {
                acc.llm_calls += 1;
            }
            acc.input_tokens += entry.input_tokens;
            acc.output_tokens += entry.output_tokens;
            acc.total_tokens += entry.input_tokens + entry.output_tokens;
            acc.total_cost_usd += entry.cost_usd;
            acc
        })
    }
}
