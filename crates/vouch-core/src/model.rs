use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The quality dimensions a judge can score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    Coherence,
    Coverage,
    Conciseness,
    Accuracy,
    Relevance,
}

impl MetricName {
    pub const ALL: [MetricName; 5] = [
        MetricName::Coherence,
        MetricName::Coverage,
        MetricName::Conciseness,
        MetricName::Accuracy,
        MetricName::Relevance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Coherence => "coherence",
            MetricName::Coverage => "coverage",
            MetricName::Conciseness => "conciseness",
            MetricName::Accuracy => "accuracy",
            MetricName::Relevance => "relevance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coherence" => Some(MetricName::Coherence),
            "coverage" => Some(MetricName::Coverage),
            "conciseness" => Some(MetricName::Conciseness),
            "accuracy" => Some(MetricName::Accuracy),
            "relevance" => Some(MetricName::Relevance),
            _ => None,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial map of metric scores, each in `[0, 1]`. Absent metrics were not produced.
pub type QualityMetrics = BTreeMap<MetricName, f64>;

/// Which scoring path produced a set of metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringSource {
    #[default]
    Judged,
    FallbackEstimated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Input,
    Output,
    #[default]
    Total,
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenScope::Input => "input",
            TokenScope::Output => "output",
            TokenScope::Total => "total",
        })
    }
}

/// Point-in-time copy of a ledger's totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageSnapshot {
    pub total_cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub provider: String,
}

impl UsageSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn tokens(&self, scope: TokenScope) -> u64 {
        match scope {
            TokenScope::Input => self.input_tokens,
            TokenScope::Output => self.output_tokens,
            TokenScope::Total => self.total_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Skipped
        )
    }
}

/// Clamp a score into `[0, 1]`; NaN collapses to 0.
pub fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_round_trip_through_serde() {
        let m: QualityMetrics = [(MetricName::Coherence, 0.9), (MetricName::Relevance, 0.7)]
            .into_iter()
            .collect();
        let s = serde_json::to_string(&m).unwrap();
        assert_eq!(s, r#"{"coherence":0.9,"relevance":0.7}"#);
        assert_eq!(MetricName::parse(" Accuracy "), Some(MetricName::Accuracy));
        assert_eq!(MetricName::parse("fluency"), None);
    }

    #[test]
    fn clamp_unit_handles_out_of_range() {
        assert_eq!(clamp_unit(1.3), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }

    #[test]
    fn unknown_status_strings_are_rejected() {
        let s: TestStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(s, TestStatus::Skipped);
        assert!(serde_json::from_str::<TestStatus>("\"flaky\"").is_err());
    }
}
