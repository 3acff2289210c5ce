use super::Embedder;
use crate::embeddings::util::sha256_hex;
use async_trait::async_trait;

/// Returns the same vector for every input.
pub struct FakeEmbedder {
    pub vector: Vec<f32>,
}

impl FakeEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str, _model: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vector.clone())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Deterministic bag-of-words embedder for offline runs.
///
/// Each lowercased alphanumeric token is hashed into one of `dims` buckets, so
/// texts sharing vocabulary land close together and identical texts are identical.
pub struct HashingEmbedder {
    pub dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = sha256_hex(&token.to_lowercase());
            let bucket = u64::from_str_radix(&digest[..16], 16).unwrap_or(0) as usize % self.dims;
            v[bucket] += 1.0;
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str, _model: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }
}
