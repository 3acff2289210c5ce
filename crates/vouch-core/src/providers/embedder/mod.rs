use async_trait::async_trait;

/// Turns text into a fixed-length vector for a given embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, model: &str) -> anyhow::Result<Vec<f32>>;
    fn provider_name(&self) -> &'static str;
}

pub mod fake;
pub mod openai;
