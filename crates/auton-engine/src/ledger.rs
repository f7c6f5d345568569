//! Cost accounting on top of the memory store.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;

use auton_memory::{CostRecord, MemoryStore};

/// Per-model pricing in currency units per 1000 tokens. Models absent from
/// the table fall back to `default_rate`.
#[derive(Debug, Clone)]
pub struct RateTable {
    per_1k_tokens: HashMap<String, f64>,
    default_rate: f64,
}

impl RateTable {
    pub fn new(per_1k_tokens: HashMap<String, f64>, default_rate: f64) -> Self {
        Self {
            per_1k_tokens,
            default_rate,
        }
    }

    pub fn rate_for(&self, model: &str) -> f64 {
        *self.per_1k_tokens.get(model).unwrap_or(&self.default_rate)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            per_1k_tokens: builtin_rates(),
            default_rate: 0.01,
        }
    }
}

/// Built-in pricing, per 1000 tokens. Configured rates overlay these.
pub fn builtin_rates() -> HashMap<String, f64> {
    let mut per_1k_tokens = HashMap::new();
    per_1k_tokens.insert("openai:gpt-4".to_string(), 0.03);
    per_1k_tokens.insert("openai:gpt-3.5-turbo".to_string(), 0.002);
    // Local models are free.
    per_1k_tokens.insert("ollama:llama3".to_string(), 0.0);
    per_1k_tokens
}

/// Thin accounting layer: estimates cost where needed and appends the record.
/// Applies no spend policy; that judgment belongs to callers.
#[derive(Debug, Clone)]
pub struct CostLedger {
    rates: RateTable,
}

impl CostLedger {
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }

    pub fn estimate(&self, model: &str, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.rates.rate_for(model)
    }

    /// Record one invocation's usage. `precomputed` skips estimation when the
    /// backend already reported an exact cost.
    pub fn record(
        &self,
        store: &MemoryStore,
        model: &str,
        tokens: u64,
        precomputed: Option<f64>,
        task_id: Option<&str>,
    ) -> Result<()> {
        let estimated_cost = precomputed.unwrap_or_else(|| self.estimate(model, tokens));
        store.append_cost(&CostRecord {
            model: model.to_string(),
            tokens_used: tokens,
            estimated_cost,
            task_id: task_id.map(str::to_string),
            timestamp: Utc::now(),
        })
    }
}

impl Default for CostLedger {
    fn default() -> Self {
        Self::new(RateTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path().join("store"));
        (dir, store)
    }

    #[test]
    fn test_estimate_uses_known_rate() {
        let ledger = CostLedger::default();
        // (2000 / 1000) * 0.03
        assert!((ledger.estimate("openai:gpt-4", 2000) - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_unknown_model_falls_back_to_default() {
        let ledger = CostLedger::default();
        // (1500 / 1000) * 0.01
        assert!((ledger.estimate("x:y", 1500) - 0.015).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_free_model() {
        let ledger = CostLedger::default();
        assert_eq!(ledger.estimate("ollama:llama3", 50_000), 0.0);
    }

    #[test]
    fn test_record_appends_to_store() {
        let (_dir, store) = make_store();
        let ledger = CostLedger::default();

        ledger
            .record(&store, "x:y", 1500, None, Some("task_1"))
            .unwrap();
        ledger.record(&store, "x:y", 500, None, None).unwrap();

        let summary = store.cost_summary().unwrap();
        let usage = &summary["x:y"];
        assert_eq!(usage.total_tokens, 2000);
        assert!((usage.total_cost - 0.02).abs() < 1e-12);
        assert_eq!(usage.call_count, 2);
    }

    #[test]
    fn test_record_precomputed_cost_passes_through() {
        let (_dir, store) = make_store();
        let ledger = CostLedger::default();

        ledger
            .record(&store, "openai:gpt-4", 100, Some(1.25), None)
            .unwrap();

        let summary = store.cost_summary().unwrap();
        assert!((summary["openai:gpt-4"].total_cost - 1.25).abs() < 1e-12);
    }
}
