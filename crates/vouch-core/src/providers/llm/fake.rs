use super::LlmClient;
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted client: replies are served in order, the last one repeats.
pub struct FakeClient {
    model: String,
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl FakeClient {
    pub fn new(model: &str, reply: &str) -> Self {
        Self::scripted(model, vec![Ok(reply.to_string())])
    }

    /// A client whose every call fails with `message`.
    pub fn failing(model: &str, message: &str) -> Self {
        Self::scripted(model, vec![Err(message.to_string())])
    }

    pub fn scripted(model: &str, replies: Vec<Result<String, String>>) -> Self {
        Self {
            model: model.to_string(),
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        _prompt: &str,
        _context: Option<&[String]>,
    ) -> anyhow::Result<LlmResponse> {
        let next = {
            let mut q = self.replies.lock().unwrap_or_else(|e| e.into_inner());
            if q.len() > 1 {
                q.pop_front()
            } else {
                q.front().cloned()
            }
        };
        match next {
            Some(Ok(text)) => Ok(LlmResponse {
                text,
                provider: "fake".to_string(),
                model: self.model.clone(),
                input_tokens: None,
                output_tokens: None,
                meta: serde_json::json!({}),
            }),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => anyhow::bail!("fake client has no scripted replies"),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
