//! The long-lived evaluation engine: owns providers, caches and stores, and
//! hands out per-test sessions.

pub mod session;
pub mod suite;

use crate::baseline::regression::{self, RegressionOptions, RegressionOutcome, VersionComparison};
use crate::baseline::BaselineStore;
use crate::config::{Credentials, EmbeddingProviderKind, EngineConfig, JudgeProviderKind};
use crate::cost::CostLedger;
use crate::embeddings::cache::EmbeddingCache;
use crate::embeddings::SimilarityScorer;
use crate::errors::{EvalError, Result};
use crate::judge::{QualityScore, QualityScorer};
use crate::model::MetricName;
use crate::pricing::PricingTable;
use crate::providers::embedder::fake::HashingEmbedder;
use crate::providers::embedder::openai::OpenAIEmbedder;
use crate::providers::embedder::Embedder;
use crate::providers::llm::openai::OpenAIClient;
use crate::providers::llm::LlmClient;
use crate::snapshot::{SnapshotCheck, SnapshotStore};
use crate::stats::chi2::{GammaStrategy, SeriesGamma};
use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub use session::{TestContext, TestOutcome, TestSession};
pub use suite::{Suite, SuiteReport};

pub struct Engine {
    config: EngineConfig,
    pricing: Arc<PricingTable>,
    similarity: Arc<SimilarityScorer>,
    quality: QualityScorer,
    baselines: BaselineStore,
    snapshots: SnapshotStore,
    gamma: Arc<dyn GammaStrategy>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("tool_dir", &self.config.tool_dir)
            .field("embedding_model", &self.similarity.default_model())
            .field("judge", &self.quality.has_judge())
            .field("gamma", &self.gamma.name())
            .finish()
    }
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Builds providers from `config.embedding` / `config.judge`. A configured
    /// OpenAI provider without an API key is a configuration error.
    pub fn from_config(config: EngineConfig, creds: &Credentials) -> Result<Self> {
        let embedder: Option<Arc<dyn Embedder>> = match config.embedding.provider {
            EmbeddingProviderKind::OpenAI => {
                let key = creds.embedding_api_key.clone().ok_or_else(|| {
                    EvalError::config(
                        "embedding.provider is 'openai' but no API key is set \
                         (VOUCH_EMBEDDING_API_KEY or OPENAI_API_KEY)",
                    )
                })?;
                Some(Arc::new(OpenAIEmbedder::with_base_url(
                    config.embedding.base_url.clone(),
                    key,
                )))
            }
            EmbeddingProviderKind::Fake => Some(Arc::new(HashingEmbedder::default())),
            EmbeddingProviderKind::None => None,
        };

        let judge: Option<Arc<dyn LlmClient>> = match config.judge.provider {
            JudgeProviderKind::OpenAI => {
                let key = creds.judge_api_key.clone().ok_or_else(|| {
                    EvalError::config(
                        "judge.provider is 'openai' but no API key is set \
                         (VOUCH_JUDGE_API_KEY or OPENAI_API_KEY)",
                    )
                })?;
                Some(Arc::new(OpenAIClient::new(
                    config.judge.base_url.clone(),
                    config.judge.model.clone(),
                    key,
                    config.judge.temperature,
                    config.judge.max_tokens,
                )))
            }
            JudgeProviderKind::None => None,
        };

        let mut builder = EngineBuilder::new(config);
        builder.embedder = embedder;
        builder.judge = judge;
        builder.build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pricing(&self) -> &Arc<PricingTable> {
        &self.pricing
    }

    pub fn similarity(&self) -> &SimilarityScorer {
        &self.similarity
    }

    pub fn quality(&self) -> &QualityScorer {
        &self.quality
    }

    pub fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn gamma(&self) -> &dyn GammaStrategy {
        self.gamma.as_ref()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.session.timeout_seconds)
    }

    /// A fresh ledger priced with this engine's table.
    pub fn new_ledger(&self, test_id: &str) -> CostLedger {
        CostLedger::new(test_id, self.pricing.clone())
    }

    pub fn session(self: &Arc<Self>, test_id: &str) -> TestSession {
        TestSession::new(self.clone(), test_id)
    }

    pub fn suite(self: &Arc<Self>, name: &str) -> Suite {
        Suite::new(self.clone(), name)
    }

    pub async fn evaluate_quality(
        &self,
        text: &str,
        reference: &str,
        metrics: &[MetricName],
    ) -> Result<QualityScore> {
        self.quality.evaluate_quality(text, reference, metrics).await
    }

    pub async fn check_regression(
        &self,
        actual: &str,
        baseline_id: &str,
        opts: &RegressionOptions,
    ) -> Result<RegressionOutcome> {
        regression::check_regression(&self.baselines, &self.quality, actual, baseline_id, opts).await
    }

    pub async fn assert_passes_regression(
        &self,
        actual: &str,
        baseline_id: &str,
        opts: &RegressionOptions,
    ) -> Result<RegressionOutcome> {
        regression::assert_passes_regression(&self.baselines, &self.quality, actual, baseline_id, opts)
            .await
    }

    pub async fn compare_versions(
        &self,
        first: &str,
        second: &str,
        reference: &str,
    ) -> Result<VersionComparison> {
        regression::compare_versions(&self.quality, first, second, reference).await
    }

    pub async fn check_snapshot(
        &self,
        actual: &str,
        snapshot_id: &str,
        threshold: f64,
    ) -> Result<SnapshotCheck> {
        self.snapshots
            .check(&self.similarity, actual, snapshot_id, threshold)
            .await
    }
}

/// Assembles an [`Engine`] from explicit parts. Nothing here reads the
/// environment; use [`Engine::from_config`] for that.
pub struct EngineBuilder {
    config: EngineConfig,
    embedder: Option<Arc<dyn Embedder>>,
    judge: Option<Arc<dyn LlmClient>>,
    pricing: Option<PricingTable>,
    gamma: Option<Arc<dyn GammaStrategy>>,
    cache_store: Option<Store>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            embedder: None,
            judge: None,
            pricing: None,
            gamma: None,
            cache_store: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_judge(mut self, judge: Arc<dyn LlmClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn with_gamma(mut self, gamma: Arc<dyn GammaStrategy>) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Persistent embedding cache layer; overrides `embedding.cache_path`.
    pub fn with_cache_store(mut self, store: Store) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let cfg = self.config;
        cfg.validate()?;

        let pricing = match self.pricing {
            Some(p) => p,
            None => PricingTable::with_overrides(&cfg.pricing.models, &cfg.pricing.default_model)?,
        };

        let store = match (self.cache_store, &cfg.embedding.cache_path) {
            (Some(s), _) => Some(s),
            (None, Some(path)) if cfg.embedding.cache => Some(Store::open(path)?),
            _ => None,
        };
        let mut cache = EmbeddingCache::new(cfg.embedding.cache_entries);
        if let Some(store) = store {
            store.init_schema()?;
            cache = cache.with_store(store);
        }

        let similarity = Arc::new(SimilarityScorer::new(
            self.embedder,
            cache,
            &cfg.embedding.model,
            cfg.embedding.cache,
        ));
        let quality = QualityScorer::new(self.judge, similarity.clone());

        tracing::debug!(
            event = "vouch.engine.ready",
            tool_dir = %cfg.tool_dir.display(),
            embedding_model = %cfg.embedding.model,
            judge = quality.has_judge(),
            disk_cache = similarity.cache().has_disk(),
        );

        Ok(Engine {
            baselines: BaselineStore::new(cfg.baseline_dir()),
            snapshots: SnapshotStore::new(cfg.snapshot_dir()),
            pricing: Arc::new(pricing),
            similarity,
            quality,
            gamma: self.gamma.unwrap_or_else(|| Arc::new(SeriesGamma)),
            config: cfg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn openai_without_key_is_config_error() {
        let err = Engine::from_config(EngineConfig::default(), &Credentials::default()).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn fake_provider_needs_no_credentials() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut cfg = EngineConfig::default();
        cfg.tool_dir = dir.path().to_path_buf();
        cfg.embedding.provider = EmbeddingProviderKind::Fake;
        cfg.embedding.cache_path = Some(dir.path().join("cache.db"));

        let engine = Engine::from_config(cfg, &Credentials::default())?;
        assert!(engine.similarity().cache().has_disk());
        assert!(!engine.quality().has_judge());
        assert_eq!(engine.baselines().dir(), dir.path().join("baselines"));
        assert_eq!(engine.gamma().name(), "series");
        Ok(())
    }

    #[test]
    fn unknown_default_pricing_model_fails_build() {
        let mut cfg = EngineConfig::default();
        cfg.pricing.default_model = "no-such-model".into();
        let err = Engine::builder(cfg).build().unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
