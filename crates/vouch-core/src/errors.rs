use crate::model::{MetricName, TokenScope, UsageSnapshot};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Failure to load or validate configuration.
#[derive(Debug, Clone, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// One metric that fell below its acceptable bound during a regression check.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricViolation {
    pub metric: MetricName,
    /// `None` when the scorer produced no value for the metric.
    pub actual: Option<f64>,
    pub baseline: Option<f64>,
    pub min_acceptable: f64,
}

/// One row of an expected-vs-observed table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DistributionRow {
    pub value: String,
    pub expected: f64,
    pub observed: u64,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("dimension mismatch: vectors have lengths {left} and {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error(
        "cost exceeded: ${actual_usd:.6} > ${max_usd:.6} ({} in / {} out tokens on {}/{})",
        .usage.input_tokens, .usage.output_tokens, .usage.provider, .usage.model
    )]
    CostExceeded {
        actual_usd: f64,
        max_usd: f64,
        usage: UsageSnapshot,
    },

    #[error("token budget exceeded: {actual} {scope} tokens > {max}")]
    TokenBudgetExceeded {
        scope: TokenScope,
        actual: u64,
        max: u64,
        usage: UsageSnapshot,
    },

    #[error("semantic mismatch: similarity {similarity:.4} < threshold {threshold:.4}")]
    SemanticMismatch {
        similarity: f64,
        threshold: f64,
        actual: String,
        expected: String,
    },

    #[error("snapshot '{snapshot_id}' mismatch: similarity {similarity:.4} < threshold {threshold:.4}")]
    SnapshotMismatch {
        snapshot_id: String,
        similarity: f64,
        threshold: f64,
        actual: String,
        snapshot: String,
    },

    #[error("regression against baseline '{baseline_id}' (v{version}): {} metric(s) below bound", .violations.len())]
    RegressionFailed {
        baseline_id: String,
        version: u32,
        violations: Vec<MetricViolation>,
        actual_excerpt: String,
        baseline_excerpt: String,
    },

    #[error("statistical mismatch: {match_rate:.2} of samples matched, threshold {threshold:.2}")]
    StatisticalMismatch {
        match_rate: f64,
        threshold: f64,
        expected: serde_json::Value,
        distribution: Vec<(String, u64)>,
    },

    #[error("variance exceeded: std dev {std_dev:.4} > {max_std_dev:.4} (mean {mean:.4}, min {min:.4}, max {max:.4})")]
    VarianceExceeded {
        std_dev: f64,
        max_std_dev: f64,
        mean: f64,
        min: f64,
        max: f64,
    },

    #[error("consistency failed: mean similarity {mean:.4}, min {min:.4}, threshold {threshold:.4}")]
    ConsistencyFailed {
        mean: f64,
        min: f64,
        threshold: f64,
        similarities: Vec<f64>,
    },

    #[error("distribution mismatch: chi-squared {statistic:.4}, p-value {p_value:.4} < {significance}")]
    DistributionMismatch {
        statistic: f64,
        p_value: f64,
        significance: f64,
        table: Vec<DistributionRow>,
    },

    #[error("schema mismatch: {}", .errors.join("; "))]
    SchemaMismatch { errors: Vec<String> },

    #[error("test '{test_id}' timed out after {timeout_ms}ms")]
    Timeout { test_id: String, timeout_ms: u64 },

    #[error("{matcher}: {message}")]
    Assertion {
        matcher: &'static str,
        message: String,
        details: serde_json::Value,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl EvalError {
    pub fn provider(provider: &str, err: anyhow::Error) -> Self {
        EvalError::Provider {
            provider: provider.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub fn assertion(matcher: &'static str, message: impl Into<String>) -> Self {
        EvalError::Assertion {
            matcher,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        EvalError::Config(ConfigError(message.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::Provider { .. } => "ProviderError",
            EvalError::DimensionMismatch { .. } => "DimensionMismatch",
            EvalError::CostExceeded { .. } => "CostExceeded",
            EvalError::TokenBudgetExceeded { .. } => "TokenBudgetExceeded",
            EvalError::SemanticMismatch { .. } => "SemanticMismatch",
            EvalError::SnapshotMismatch { .. } => "SnapshotMismatch",
            EvalError::RegressionFailed { .. } => "RegressionFailed",
            EvalError::StatisticalMismatch { .. } => "StatisticalMismatch",
            EvalError::VarianceExceeded { .. } => "VarianceExceeded",
            EvalError::ConsistencyFailed { .. } => "ConsistencyFailed",
            EvalError::DistributionMismatch { .. } => "DistributionMismatch",
            EvalError::SchemaMismatch { .. } => "SchemaMismatch",
            EvalError::Timeout { .. } => "Timeout",
            EvalError::Assertion { .. } => "AssertionError",
            EvalError::Config(_) => "ConfigError",
            EvalError::Storage(_) => "StorageError",
            EvalError::Io(_) => "IoError",
        }
    }

    /// True for verdicts (the output was judged and found wanting), false for
    /// infrastructure failures that say nothing about output quality.
    pub fn is_assertion_failure(&self) -> bool {
        !matches!(
            self,
            EvalError::Provider { .. }
                | EvalError::DimensionMismatch { .. }
                | EvalError::Config(_)
                | EvalError::Storage(_)
                | EvalError::Io(_)
        )
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            EvalError::Provider { provider, message } => {
                json!({ "provider": provider, "message": message })
            }
            EvalError::DimensionMismatch { left, right } => json!({ "left": left, "right": right }),
            EvalError::CostExceeded {
                actual_usd,
                max_usd,
                usage,
            } => json!({ "actual_usd": actual_usd, "max_usd": max_usd, "usage": usage }),
            EvalError::TokenBudgetExceeded {
                scope,
                actual,
                max,
                usage,
            } => json!({ "scope": scope, "actual": actual, "max": max, "usage": usage }),
            EvalError::SemanticMismatch {
                similarity,
                threshold,
                actual,
                expected,
            } => json!({
                "similarity": similarity,
                "threshold": threshold,
                "actual": actual,
                "expected": expected
            }),
            EvalError::SnapshotMismatch {
                snapshot_id,
                similarity,
                threshold,
                actual,
                snapshot,
            } => json!({
                "snapshot_id": snapshot_id,
                "similarity": similarity,
                "threshold": threshold,
                "actual": actual,
                "snapshot": snapshot
            }),
            EvalError::RegressionFailed {
                baseline_id,
                version,
                violations,
                actual_excerpt,
                baseline_excerpt,
            } => json!({
                "baseline_id": baseline_id,
                "version": version,
                "violations": violations,
                "actual": actual_excerpt,
                "baseline": baseline_excerpt
            }),
            EvalError::StatisticalMismatch {
                match_rate,
                threshold,
                expected,
                distribution,
            } => json!({
                "match_rate": match_rate,
                "threshold": threshold,
                "expected": expected,
                "distribution": distribution
            }),
            EvalError::VarianceExceeded {
                std_dev,
                max_std_dev,
                mean,
                min,
                max,
            } => json!({
                "std_dev": std_dev,
                "max_std_dev": max_std_dev,
                "mean": mean,
                "min": min,
                "max": max
            }),
            EvalError::ConsistencyFailed {
                mean,
                min,
                threshold,
                similarities,
            } => json!({
                "mean": mean,
                "min": min,
                "threshold": threshold,
                "similarities": similarities
            }),
            EvalError::DistributionMismatch {
                statistic,
                p_value,
                significance,
                table,
            } => json!({
                "statistic": statistic,
                "p_value": p_value,
                "significance": significance,
                "table": table
            }),
            EvalError::SchemaMismatch { errors } => json!({ "errors": errors }),
            EvalError::Timeout {
                test_id,
                timeout_ms,
            } => json!({ "test_id": test_id, "timeout_ms": timeout_ms }),
            EvalError::Assertion {
                matcher,
                message,
                details,
            } => json!({ "matcher": matcher, "message": message, "details": details }),
            EvalError::Config(e) => json!({ "message": e.0 }),
            EvalError::Storage(msg) => json!({ "message": msg }),
            EvalError::Io(e) => json!({ "message": e.to_string() }),
        }
    }
}

impl From<rusqlite::Error> for EvalError {
    fn from(e: rusqlite::Error) -> Self {
        EvalError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(e: serde_json::Error) -> Self {
        EvalError::Storage(format!("serialization failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_not_verdicts() {
        let err = EvalError::provider("openai", anyhow::anyhow!("401 unauthorized"));
        assert_eq!(err.kind(), "ProviderError");
        assert!(!err.is_assertion_failure());
        assert!(err.to_string().contains("401 unauthorized"));
    }

    #[test]
    fn details_carry_structured_payload() {
        let err = EvalError::SemanticMismatch {
            similarity: 0.42,
            threshold: 0.8,
            actual: "a".into(),
            expected: "b".into(),
        };
        assert!(err.is_assertion_failure());
        let d = err.details();
        assert_eq!(d["threshold"], 0.8);
        assert_eq!(d["expected"], "b");
    }
}
