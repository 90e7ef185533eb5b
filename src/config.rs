//! Crate-wide configuration: every recognized option in one validated
//! struct, loadable from TOML or assembled programmatically.
//!
//! Layers compiled defaults under a config file under programmatic
//! builder overrides, with no environment-variable layer — this crate's
//! options don't need one.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Provider identifier as it appears in `providers_order`.
pub type ProviderId = String;

/// Every recognized configuration option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Ordered provider ids tried by the LLM gateway: primary, fallback, emergency, ...
    pub providers_order: Vec<ProviderId>,
    /// Hard daily spend cutoff in USD.
    pub daily_budget_usd: f64,
    /// Safety margin added to today's spend before comparing against the budget.
    pub budget_safety_margin_usd: f64,
    /// Lexical fusion weight (renormalized with `dense_weight` internally).
    pub bm25_weight: f64,
    /// Dense fusion weight (renormalized with `bm25_weight` internally).
    pub dense_weight: f64,
    /// MMR relevance-vs-diversity knob, in `[0, 1]`.
    pub mmr_lambda: f64,
    /// Search cache capacity (entries).
    pub cache_size: usize,
    /// Search cache TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// `signalness` admission threshold for the quality gate.
    pub quality_gate_threshold: f64,
    /// Whether the quality gate can halt the pipeline (`false` = score-only mode).
    pub quality_gate_enabled: bool,
    /// Minimum composite confidence required before the RAG answerer calls the LLM.
    pub confidence_threshold: f64,
    /// Target chunk size in estimated tokens.
    pub chunker_target_tokens: usize,
    /// Hard per-chunk token cap.
    pub chunker_max_tokens: usize,
    /// Prompt-window truncation length (chars) for enrichment input.
    pub enrichment_prompt_window_chars: usize,
    /// Maximum concurrent in-flight ingestions before `Busy` is returned.
    pub max_in_flight_ingestions: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            providers_order: Vec::new(),
            daily_budget_usd: 5.0,
            budget_safety_margin_usd: 0.0,
            bm25_weight: 0.3,
            dense_weight: 0.7,
            mmr_lambda: 0.7,
            cache_size: 500,
            cache_ttl_seconds: 300,
            quality_gate_threshold: 0.3,
            quality_gate_enabled: false,
            confidence_threshold: 0.6,
            chunker_target_tokens: 400,
            chunker_max_tokens: 800,
            enrichment_prompt_window_chars: 8_000,
            max_in_flight_ingestions: 32,
        }
    }
}

impl RagConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits (`#[serde(default)]` on every field).
    pub async fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Start a builder seeded with defaults.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Validate cross-field invariants. Called automatically by
    /// [`from_toml_file`](Self::from_toml_file) and
    /// [`RagConfigBuilder::build`].
    pub fn validate(&self) -> Result<(), RagError> {
        if self.providers_order.is_empty() {
            return Err(RagError::Config(
                "providers_order must name at least one provider".into(),
            ));
        }
        if self.bm25_weight < 0.0 || self.dense_weight < 0.0 {
            return Err(RagError::Config("fusion weights must be non-negative".into()));
        }
        if self.bm25_weight + self.dense_weight <= 0.0 {
            return Err(RagError::Config(
                "fusion weights must not both be zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(RagError::Config("mmr_lambda must be in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RagError::Config(
                "confidence_threshold must be in [0, 1]".into(),
            ));
        }
        if self.chunker_target_tokens == 0 || self.chunker_target_tokens > self.chunker_max_tokens
        {
            return Err(RagError::Config(
                "chunker_target_tokens must be > 0 and <= chunker_max_tokens".into(),
            ));
        }
        if self.cache_size == 0 {
            return Err(RagError::Config("cache_size must be > 0".into()));
        }
        Ok(())
    }

    /// Returns `(w_bm25, w_dense)` renormalized to sum to 1.
    #[must_use]
    pub fn normalized_fusion_weights(&self) -> (f64, f64) {
        let total = self.bm25_weight + self.dense_weight;
        (self.bm25_weight / total, self.dense_weight / total)
    }
}

/// Fluent builder for [`RagConfig`].
#[derive(Debug, Default)]
pub struct RagConfigBuilder {
    base: RagConfig,
}

impl RagConfigBuilder {
    /// Set the provider fallback order.
    #[must_use]
    pub fn providers_order(mut self, providers: Vec<ProviderId>) -> Self {
        self.base.providers_order = providers;
        self
    }

    /// Set the daily budget cutoff.
    #[must_use]
    pub fn daily_budget_usd(mut self, budget: f64) -> Self {
        self.base.daily_budget_usd = budget;
        self
    }

    /// Set fusion weights (renormalized internally; need not sum to 1).
    #[must_use]
    pub fn fusion_weights(mut self, bm25: f64, dense: f64) -> Self {
        self.base.bm25_weight = bm25;
        self.base.dense_weight = dense;
        self
    }

    /// Set the MMR lambda knob.
    #[must_use]
    pub fn mmr_lambda(mut self, lambda: f64) -> Self {
        self.base.mmr_lambda = lambda;
        self
    }

    /// Set cache capacity and TTL.
    #[must_use]
    pub fn cache(mut self, size: usize, ttl_seconds: u64) -> Self {
        self.base.cache_size = size;
        self.base.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Enable the quality gate with the given threshold.
    #[must_use]
    pub fn quality_gate(mut self, enabled: bool, threshold: f64) -> Self {
        self.base.quality_gate_enabled = enabled;
        self.base.quality_gate_threshold = threshold;
        self
    }

    /// Set the RAG confidence-refusal threshold.
    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.base.confidence_threshold = threshold;
        self
    }

    /// Set chunker token targets.
    #[must_use]
    pub fn chunker_tokens(mut self, target: usize, max: usize) -> Self {
        self.base.chunker_target_tokens = target;
        self.base.chunker_max_tokens = max;
        self
    }

    /// Build and validate the final config.
    pub fn build(self) -> Result<RagConfig, RagError> {
        self.base.validate()?;
        Ok(self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_invalid_without_providers() {
        let err = RagConfig::default().validate().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn builder_produces_valid_config() {
        let config = RagConfig::builder()
            .providers_order(vec!["primary".into(), "fallback".into()])
            .build()
            .unwrap();
        assert_eq!(config.providers_order.len(), 2);
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let config = RagConfig::builder()
            .providers_order(vec!["primary".into()])
            .fusion_weights(0.6, 1.4)
            .build()
            .unwrap();
        let (w_bm25, w_dense) = config.normalized_fusion_weights();
        assert!((w_bm25 + w_dense - 1.0).abs() < 1e-9);
        assert!((w_bm25 - 0.3).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_mmr_lambda() {
        let err = RagConfig::builder()
            .providers_order(vec!["primary".into()])
            .mmr_lambda(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
