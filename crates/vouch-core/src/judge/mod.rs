//! Per-metric quality scoring: an LLM judge when configured, otherwise (or when
//! the judge call fails) embedding similarity stands in for every metric.

use crate::embeddings::SimilarityScorer;
use crate::errors::Result;
use crate::model::{clamp_unit, MetricName, QualityMetrics, ScoringSource};
use crate::providers::llm::LlmClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TEMPLATE_VERSION: &str = "quality-v1";

/// Scores tagged with the path that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "metrics", rename_all = "snake_case")]
pub enum QualityScore {
    Judged(QualityMetrics),
    /// Degraded mode: one similarity number copied into every requested metric.
    FallbackEstimated(QualityMetrics),
}

impl QualityScore {
    pub fn metrics(&self) -> &QualityMetrics {
        match self {
            QualityScore::Judged(m) | QualityScore::FallbackEstimated(m) => m,
        }
    }

    pub fn into_metrics(self) -> QualityMetrics {
        match self {
            QualityScore::Judged(m) | QualityScore::FallbackEstimated(m) => m,
        }
    }

    pub fn source(&self) -> ScoringSource {
        match self {
            QualityScore::Judged(_) => ScoringSource::Judged,
            QualityScore::FallbackEstimated(_) => ScoringSource::FallbackEstimated,
        }
    }

    pub fn total(&self) -> f64 {
        self.metrics().values().sum()
    }
}

#[derive(Clone)]
pub struct QualityScorer {
    judge: Option<Arc<dyn LlmClient>>,
    similarity: Arc<SimilarityScorer>,
}

impl QualityScorer {
    pub fn new(judge: Option<Arc<dyn LlmClient>>, similarity: Arc<SimilarityScorer>) -> Self {
        Self { judge, similarity }
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub async fn evaluate_quality(
        &self,
        text: &str,
        reference: &str,
        metrics: &[MetricName],
    ) -> Result<QualityScore> {
        if metrics.is_empty() {
            return Ok(QualityScore::Judged(QualityMetrics::new()));
        }

        let reason = match &self.judge {
            Some(client) => match self.ask_judge(client.as_ref(), text, reference, metrics).await {
                Ok(scores) => return Ok(QualityScore::Judged(scores)),
                Err(e) => format!("judge call failed: {:#}", e),
            },
            None => "no judge configured".to_string(),
        };

        let sim = self
            .similarity
            .semantic_similarity(text, reference, None, true)
            .await?;
        tracing::warn!(
            event = "vouch.quality.fallback",
            reason = %reason,
            similarity = sim,
            metrics = ?metrics,
            "quality scores estimated from embedding similarity ({})",
            reason
        );
        Ok(QualityScore::FallbackEstimated(
            metrics.iter().map(|m| (*m, sim)).collect(),
        ))
    }

    async fn ask_judge(
        &self,
        client: &dyn LlmClient,
        text: &str,
        reference: &str,
        metrics: &[MetricName],
    ) -> anyhow::Result<QualityMetrics> {
        let prompt = build_prompt(text, reference, metrics);
        let resp = client.complete(&prompt, None).await?;
        let scores = parse_judge_scores(&resp.text, metrics)?;
        tracing::debug!(
            event = "vouch.quality.judged",
            provider = client.provider_name(),
            model = client.model(),
            template = TEMPLATE_VERSION,
            scored = scores.len(),
            requested = metrics.len(),
        );
        Ok(scores)
    }
}

fn describe(metric: MetricName) -> &'static str {
    match metric {
        MetricName::Coherence => "logical flow and internal consistency of the candidate",
        MetricName::Coverage => "how much of the reference's content the candidate covers",
        MetricName::Conciseness => "absence of padding, repetition and irrelevant detail",
        MetricName::Accuracy => "factual agreement with the reference",
        MetricName::Relevance => "how directly the candidate addresses the reference's subject",
    }
}

pub fn build_prompt(text: &str, reference: &str, metrics: &[MetricName]) -> String {
    let rubric: Vec<String> = metrics
        .iter()
        .map(|m| format!("- {}: {}", m, describe(*m)))
        .collect();
    let keys: Vec<String> = metrics.iter().map(|m| format!("\"{}\": <0.0-1.0>", m)).collect();
    format!(
        "You are grading a candidate text against a reference text.\n\
         Score each metric from 0.0 (worst) to 1.0 (best):\n{}\n\n\
         Reference:\n<<<\n{}\n>>>\n\nCandidate:\n<<<\n{}\n>>>\n\n\
         Reply with a single JSON object and nothing else: {{{}}}",
        rubric.join("\n"),
        reference,
        text,
        keys.join(", ")
    )
}

/// Pulls the requested metrics out of a judge reply.
///
/// The reply must contain a JSON object (optionally under `"scores"`). Each
/// requested metric with a numeric value is clamped into `[0, 1]`; omitted or
/// non-numeric metrics are left out.
pub fn parse_judge_scores(reply: &str, metrics: &[MetricName]) -> anyhow::Result<QualityMetrics> {
    let start = reply
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("judge reply contains no JSON object"))?;
    let end = reply
        .rfind('}')
        .filter(|e| *e > start)
        .ok_or_else(|| anyhow::anyhow!("judge reply contains no JSON object"))?;
    let value: serde_json::Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| anyhow::anyhow!("judge reply is not valid JSON: {}", e))?;

    let obj = value
        .get("scores")
        .and_then(|s| s.as_object())
        .or_else(|| value.as_object())
        .ok_or_else(|| anyhow::anyhow!("judge reply is not a JSON object"))?;

    let mut out = QualityMetrics::new();
    for m in metrics {
        if let Some(v) = obj.get(m.as_str()).and_then(|v| v.as_f64()) {
            out.insert(*m, clamp_unit(v));
        }
    }
    Ok(out)
}
