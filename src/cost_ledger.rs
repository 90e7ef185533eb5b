//! The cost ledger.
//!
//! Holds a static price table and rolling daily totals behind a single
//! `Arc<Mutex<..>>`; critical sections are O(1).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RagError;

/// USD price per 1M tokens, input and output.
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub input_usd_per_1m: f64,
    pub output_usd_per_1m: f64,
}

/// A single completed LLM call, as recorded after dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub ts: DateTime<Utc>,
}

/// Aggregate stats over a reporting window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostStats {
    pub total_usd: f64,
    pub per_provider_usd: HashMap<String, f64>,
    pub call_count: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    today: Option<NaiveDate>,
    today_total_usd: f64,
    records: Vec<CostRecord>,
}

/// Process-scoped cost ledger: price table plus rolling daily totals.
pub struct CostLedger {
    prices: HashMap<String, ModelPrice>,
    daily_budget_usd: f64,
    safety_margin_usd: f64,
    state: Arc<Mutex<LedgerState>>,
    snapshot_path: Option<std::path::PathBuf>,
}

impl CostLedger {
    /// Construct a ledger with the given price table and budget.
    #[must_use]
    pub fn new(
        prices: HashMap<String, ModelPrice>,
        daily_budget_usd: f64,
        safety_margin_usd: f64,
    ) -> Self {
        Self {
            prices,
            daily_budget_usd,
            safety_margin_usd,
            state: Arc::new(Mutex::new(LedgerState::default())),
            snapshot_path: None,
        }
    }

    /// Attach a snapshot file; on restart, load today's partial totals from it.
    pub async fn with_snapshot(
        mut self,
        path: impl Into<std::path::PathBuf>,
    ) -> Result<Self, RagError> {
        let path = path.into();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: LedgerSnapshot = serde_json::from_str(&raw)?;
            let today = Utc::now().date_naive();
            if snapshot.date == today {
                let mut state = self.state.lock().await;
                state.today = Some(today);
                state.today_total_usd = snapshot.total_usd;
            }
        }
        self.snapshot_path = Some(path);
        Ok(self)
    }

    /// Estimate the USD cost of a call before dispatching it.
    pub fn estimate(&self, model: &str, in_tokens: u64, out_tokens: u64) -> Result<f64, RagError> {
        let price = self
            .prices
            .get(model)
            .ok_or_else(|| RagError::Storage(format!("no price entry for model {model}")))?;
        Ok(in_tokens as f64 / 1_000_000.0 * price.input_usd_per_1m
            + out_tokens as f64 / 1_000_000.0 * price.output_usd_per_1m)
    }

    /// Returns `true` if today's spend, the safety margin, and the estimated
    /// cost of the call about to be dispatched together stay under the daily
    /// budget. Resets the rolling total first if the UTC date rolled over
    /// since the last call. `pending_cost_usd` should come from
    /// [`Self::estimate`] for the call under consideration; pass `0.0` to
    /// check only recorded spend.
    pub async fn within_budget(&self, now: DateTime<Utc>, pending_cost_usd: f64) -> bool {
        let mut state = self.state.lock().await;
        self.roll_day_if_needed(&mut state, now);
        state.today_total_usd + self.safety_margin_usd + pending_cost_usd < self.daily_budget_usd
    }

    /// Record a completed call, updating rolling totals. Rolls the day over
    /// first if the UTC calendar date has advanced since the last record.
    pub async fn record(&self, record: CostRecord) {
        let mut state = self.state.lock().await;
        self.roll_day_if_needed(&mut state, record.ts);
        state.today_total_usd += record.cost_usd;
        state.records.push(record);
    }

    /// Flush today's rolling total to the configured snapshot file.
    pub async fn flush_snapshot(&self) -> Result<(), RagError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let state = self.state.lock().await;
        let snapshot = LedgerSnapshot {
            date: state.today.unwrap_or_else(|| Utc::now().date_naive()),
            total_usd: state.today_total_usd,
        };
        let raw = serde_json::to_string(&snapshot)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }

    /// Aggregate stats across all records held in memory this process.
    pub async fn stats(&self) -> CostStats {
        let state = self.state.lock().await;
        let mut per_provider_usd = HashMap::new();
        let mut total_usd = 0.0;
        for record in &state.records {
            total_usd += record.cost_usd;
            *per_provider_usd.entry(record.provider.clone()).or_insert(0.0) += record.cost_usd;
        }
        CostStats {
            total_usd,
            per_provider_usd,
            call_count: state.records.len() as u64,
        }
    }

    fn roll_day_if_needed(&self, state: &mut LedgerState, now: DateTime<Utc>) {
        let today = now.date_naive();
        if state.today != Some(today) {
            state.today = Some(today);
            state.today_total_usd = 0.0;
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerSnapshot {
    date: NaiveDate,
    total_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> HashMap<String, ModelPrice> {
        let mut m = HashMap::new();
        m.insert(
            "gpt-test".to_string(),
            ModelPrice {
                input_usd_per_1m: 1.0,
                output_usd_per_1m: 2.0,
            },
        );
        m
    }

    #[test]
    fn estimate_computes_blended_cost() {
        let ledger = CostLedger::new(prices(), 10.0, 0.0);
        let cost = ledger.estimate("gpt-test", 1_000_000, 500_000).unwrap();
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn within_budget_reflects_recorded_spend() {
        let ledger = CostLedger::new(prices(), 0.01, 0.0);
        assert!(ledger.within_budget(Utc::now(), 0.0).await);
        ledger
            .record(CostRecord {
                provider: "primary".into(),
                model: "gpt-test".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.009,
                ts: Utc::now(),
            })
            .await;
        assert!(ledger.within_budget(Utc::now(), 0.0).await);
        ledger
            .record(CostRecord {
                provider: "primary".into(),
                model: "gpt-test".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.003,
                ts: Utc::now(),
            })
            .await;
        assert!(!ledger.within_budget(Utc::now(), 0.0).await);
    }

    #[tokio::test]
    async fn within_budget_accounts_for_pending_cost() {
        let ledger = CostLedger::new(prices(), 0.01, 0.0);
        ledger
            .record(CostRecord {
                provider: "primary".into(),
                model: "gpt-test".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.009,
                ts: Utc::now(),
            })
            .await;
        assert!(ledger.within_budget(Utc::now(), 0.0005).await);
        assert!(!ledger.within_budget(Utc::now(), 0.003).await);
    }

    #[tokio::test]
    async fn stats_aggregate_per_provider() {
        let ledger = CostLedger::new(prices(), 10.0, 0.0);
        ledger
            .record(CostRecord {
                provider: "a".into(),
                model: "gpt-test".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 1.0,
                ts: Utc::now(),
            })
            .await;
        ledger
            .record(CostRecord {
                provider: "b".into(),
                model: "gpt-test".into(),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 2.0,
                ts: Utc::now(),
            })
            .await;
        let stats = ledger.stats().await;
        assert_eq!(stats.call_count, 2);
        assert!((stats.total_usd - 3.0).abs() < 1e-9);
        assert!((stats.per_provider_usd["b"] - 2.0).abs() < 1e-9);
    }
}
