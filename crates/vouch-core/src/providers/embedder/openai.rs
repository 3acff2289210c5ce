use super::Embedder;
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIEmbedder {
    pub base_url: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str, model: &str) -> anyhow::Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": model,
            "input": text,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("embeddings API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let arr = json
            .pointer("/data/0/embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("embeddings API response missing data[0].embedding"))?;

        let vec = arr
            .iter()
            .map(|x| {
                x.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow::anyhow!("embedding contains non-numeric value"))
            })
            .collect::<anyhow::Result<Vec<f32>>>()?;

        if vec.is_empty() {
            anyhow::bail!("embeddings API returned an empty vector");
        }
        Ok(vec)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
