//! Semantic similarity over cached embeddings.

pub mod cache;
pub mod util;

use crate::errors::{EvalError, Result};
use crate::model::clamp_unit;
use crate::providers::embedder::Embedder;
use cache::{Embedding, EmbeddingCache};
use std::sync::Arc;

pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.8;

/// Values this close below a threshold still meet it.
pub const THRESHOLD_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SemanticOptions {
    pub similarity: f64,
    pub model: Option<String>,
    pub use_cache: bool,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            similarity: DEFAULT_SEMANTIC_THRESHOLD,
            model: None,
            use_cache: true,
        }
    }
}

impl SemanticOptions {
    pub fn threshold(similarity: f64) -> Self {
        Self {
            similarity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticCheck {
    pub similarity: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl SemanticCheck {
    pub fn into_error(self, actual: &str, expected: &str) -> EvalError {
        EvalError::SemanticMismatch {
            similarity: self.similarity,
            threshold: self.threshold,
            actual: actual.to_string(),
            expected: expected.to_string(),
        }
    }
}

pub struct SimilarityScorer {
    embedder: Option<Arc<dyn Embedder>>,
    cache: EmbeddingCache,
    default_model: String,
    cache_enabled: bool,
}

impl SimilarityScorer {
    pub fn new(
        embedder: Option<Arc<dyn Embedder>>,
        cache: EmbeddingCache,
        default_model: &str,
        cache_enabled: bool,
    ) -> Self {
        Self {
            embedder,
            cache,
            default_model: default_model.to_string(),
            cache_enabled,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub async fn get_embedding(
        &self,
        text: &str,
        model: Option<&str>,
        use_cache: bool,
    ) -> Result<Embedding> {
        let model = model.unwrap_or(&self.default_model);
        let use_cache = use_cache && self.cache_enabled;

        if use_cache {
            if let Some(v) = self.cache.get(model, text)? {
                tracing::trace!(event = "vouch.embedding.cache_hit", model = %model);
                return Ok(v);
            }
        }

        let embedder = self.embedder.as_ref().ok_or_else(|| {
            EvalError::config("no embedding provider configured (set embedding.provider)")
        })?;

        let vector = embedder
            .embed(text, model)
            .await
            .map_err(|e| EvalError::provider(embedder.provider_name(), e))?;
        tracing::debug!(
            event = "vouch.embedding.fetched",
            provider = embedder.provider_name(),
            model = %model,
            dims = vector.len(),
        );

        let vector: Embedding = Arc::new(vector);
        if use_cache {
            self.cache.put(model, text, vector.clone())?;
        }
        Ok(vector)
    }

    /// Cosine similarity of the two texts' embeddings, clamped into `[0, 1]`.
    pub async fn semantic_similarity(
        &self,
        a: &str,
        b: &str,
        model: Option<&str>,
        use_cache: bool,
    ) -> Result<f64> {
        let va = self.get_embedding(a, model, use_cache).await?;
        let vb = self.get_embedding(b, model, use_cache).await?;
        let raw = util::cosine_similarity(&va, &vb)?;
        Ok(clamp_unit(raw))
    }

    pub async fn check_semantic_match(
        &self,
        actual: &str,
        expected: &str,
        opts: &SemanticOptions,
    ) -> Result<SemanticCheck> {
        let similarity = self
            .semantic_similarity(actual, expected, opts.model.as_deref(), opts.use_cache)
            .await?;
        Ok(SemanticCheck {
            similarity,
            threshold: opts.similarity,
            passed: meets_threshold(similarity, opts.similarity),
        })
    }

    pub async fn assert_semantic_match(
        &self,
        actual: &str,
        expected: &str,
        opts: &SemanticOptions,
    ) -> Result<()> {
        let check = self.check_semantic_match(actual, expected, opts).await?;
        if check.passed {
            return Ok(());
        }
        Err(check.into_error(actual, expected))
    }
}

pub fn meets_threshold(value: f64, threshold: f64) -> bool {
    value + THRESHOLD_EPSILON >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::embedder::fake::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        inner: HashingEmbedder,
    }

    #[async_trait]
    impl Embedder for Counting {
        async fn embed(&self, text: &str, model: &str) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text, model).await
        }
        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    struct Broken;

    #[async_trait]
    impl Embedder for Broken {
        async fn embed(&self, _text: &str, _model: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
        fn provider_name(&self) -> &'static str {
            "broken"
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
            inner: HashingEmbedder::default(),
        })
    }

    #[tokio::test]
    async fn cached_embedding_hits_provider_once() -> anyhow::Result<()> {
        let e = counting();
        let s = SimilarityScorer::new(Some(e.clone()), EmbeddingCache::new(8), "m", true);
        let a = s.get_embedding("same text", None, true).await?;
        let b = s.get_embedding("same text", None, true).await?;
        assert_eq!(a, b);
        assert_eq!(e.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_cache_still_correct() -> anyhow::Result<()> {
        let e = counting();
        let s = SimilarityScorer::new(Some(e.clone()), EmbeddingCache::new(8), "m", false);
        let sim = s.semantic_similarity("a b c", "a b c", None, true).await?;
        assert!((sim - 1.0).abs() < 1e-9);
        assert_eq!(e.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn provider_failure_is_not_a_score() {
        let s = SimilarityScorer::new(Some(Arc::new(Broken)), EmbeddingCache::new(8), "m", true);
        let err = s
            .assert_semantic_match("a", "b", &SemanticOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ProviderError");
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn mismatch_reports_both_texts() {
        let s = SimilarityScorer::new(
            Some(Arc::new(HashingEmbedder::default())),
            EmbeddingCache::new(8),
            "m",
            true,
        );
        let err = s
            .assert_semantic_match(
                "invoice overdue payment",
                "sunny beach holiday",
                &SemanticOptions::default(),
            )
            .await
            .unwrap_err();
        match err {
            EvalError::SemanticMismatch {
                similarity,
                threshold,
                actual,
                expected,
            } => {
                assert!(similarity < threshold);
                assert_eq!(actual, "invoice overdue payment");
                assert_eq!(expected, "sunny beach holiday");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
