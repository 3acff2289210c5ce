//! Quality regression against a stored baseline, and pairwise version comparison.

use super::{Baseline, BaselineStore};
use crate::embeddings::meets_threshold;
use crate::errors::{EvalError, MetricViolation, Result};
use crate::judge::{QualityScore, QualityScorer};
use crate::model::MetricName;
use serde::Serialize;

pub const DEFAULT_REGRESSION_THRESHOLD: f64 = 0.85;
/// How far a metric may fall below its baseline before the drop counts.
pub const MAX_BASELINE_DROP: f64 = 0.1;
/// Totals closer than this are a tie.
pub const COMPARE_MARGIN: f64 = 0.05;
const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct RegressionOptions {
    pub metrics: Vec<MetricName>,
    pub threshold: f64,
    pub update_baseline: bool,
}

impl Default for RegressionOptions {
    fn default() -> Self {
        Self {
            metrics: vec![MetricName::Coherence, MetricName::Relevance],
            threshold: DEFAULT_REGRESSION_THRESHOLD,
            update_baseline: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricBound {
    pub metric: MetricName,
    pub actual: Option<f64>,
    pub baseline: Option<f64>,
    pub min_acceptable: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegressionOutcome {
    /// First run for this id: the current output became version 1.
    Bootstrapped(Baseline),
    Compared {
        baseline: Baseline,
        score: QualityScore,
        bounds: Vec<MetricBound>,
        /// New version number when the baseline was replaced.
        updated_to: Option<u32>,
    },
}

impl RegressionOutcome {
    pub fn passed(&self) -> bool {
        match self {
            RegressionOutcome::Bootstrapped(_) => true,
            RegressionOutcome::Compared { bounds, .. } => bounds.iter().all(|b| b.passed),
        }
    }

    pub fn violations(&self) -> Vec<MetricViolation> {
        match self {
            RegressionOutcome::Bootstrapped(_) => vec![],
            RegressionOutcome::Compared { bounds, .. } => bounds
                .iter()
                .filter(|b| !b.passed)
                .map(|b| MetricViolation {
                    metric: b.metric,
                    actual: b.actual,
                    baseline: b.baseline,
                    min_acceptable: b.min_acceptable,
                })
                .collect(),
        }
    }
}

/// Lowest acceptable score for one metric.
pub fn min_acceptable(threshold: f64, baseline: Option<f64>) -> f64 {
    match baseline {
        Some(b) => threshold.max(b - MAX_BASELINE_DROP),
        None => threshold,
    }
}

pub fn evaluate_bounds(
    baseline: &Baseline,
    score: &QualityScore,
    metrics: &[MetricName],
    threshold: f64,
) -> Vec<MetricBound> {
    metrics
        .iter()
        .map(|m| {
            let actual = score.metrics().get(m).copied();
            let base = baseline.get_score(*m);
            let min = min_acceptable(threshold, base);
            MetricBound {
                metric: *m,
                actual,
                baseline: base,
                min_acceptable: min,
                passed: actual.map_or(false, |a| meets_threshold(a, min)),
            }
        })
        .collect()
}

pub async fn check_regression(
    store: &BaselineStore,
    scorer: &QualityScorer,
    actual: &str,
    baseline_id: &str,
    opts: &RegressionOptions,
) -> Result<RegressionOutcome> {
    let Some(baseline) = store.load(baseline_id)? else {
        let score = scorer.evaluate_quality(actual, actual, &opts.metrics).await?;
        let source = score.source();
        let (baseline, created) = store.create_if_absent(Baseline::new(
            baseline_id,
            actual,
            score.into_metrics(),
            source,
        ))?;
        if created {
            tracing::info!(
                event = "vouch.baseline.bootstrap",
                baseline_id = %baseline_id,
                scoring = ?source,
                "created baseline '{}' from current output",
                baseline_id
            );
            return Ok(RegressionOutcome::Bootstrapped(baseline));
        }
        // Another writer created it between our load and create; compare against theirs.
        return compare(store, scorer, actual, baseline, opts).await;
    };
    compare(store, scorer, actual, baseline, opts).await
}

async fn compare(
    store: &BaselineStore,
    scorer: &QualityScorer,
    actual: &str,
    baseline: Baseline,
    opts: &RegressionOptions,
) -> Result<RegressionOutcome> {
    let score = scorer
        .evaluate_quality(actual, &baseline.text, &opts.metrics)
        .await?;
    let bounds = evaluate_bounds(&baseline, &score, &opts.metrics, opts.threshold);
    let passed = bounds.iter().all(|b| b.passed);

    let mut updated_to = None;
    if passed && opts.update_baseline {
        if let Some(b) =
            store.update_if_improved(&baseline.id, actual, score.metrics(), score.source())?
        {
            tracing::info!(
                event = "vouch.baseline.updated",
                baseline_id = %b.id,
                version = b.version,
            );
            updated_to = Some(b.version);
        }
    }

    Ok(RegressionOutcome::Compared {
        baseline,
        score,
        bounds,
        updated_to,
    })
}

pub async fn assert_passes_regression(
    store: &BaselineStore,
    scorer: &QualityScorer,
    actual: &str,
    baseline_id: &str,
    opts: &RegressionOptions,
) -> Result<RegressionOutcome> {
    let outcome = check_regression(store, scorer, actual, baseline_id, opts).await?;
    match regression_error(&outcome, actual) {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

/// The `RegressionFailed` error for a failed outcome, `None` when it passed.
pub fn regression_error(outcome: &RegressionOutcome, actual: &str) -> Option<EvalError> {
    match outcome {
        RegressionOutcome::Compared { baseline, .. } if !outcome.passed() => {
            Some(EvalError::RegressionFailed {
                baseline_id: baseline.id.clone(),
                version: baseline.version,
                violations: outcome.violations(),
                actual_excerpt: excerpt(actual),
                baseline_excerpt: excerpt(&baseline.text),
            })
        }
        _ => None,
    }
}

fn excerpt(s: &str) -> String {
    match s.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    First,
    Second,
    Tie,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VersionComparison {
    pub winner: Winner,
    pub first: QualityScore,
    pub second: QualityScore,
}

impl VersionComparison {
    pub fn margin(&self) -> f64 {
        self.first.total() - self.second.total()
    }
}

/// Scores both candidates on every metric and picks the higher total.
pub async fn compare_versions(
    scorer: &QualityScorer,
    first: &str,
    second: &str,
    reference: &str,
) -> Result<VersionComparison> {
    let a = scorer.evaluate_quality(first, reference, &MetricName::ALL).await?;
    let b = scorer.evaluate_quality(second, reference, &MetricName::ALL).await?;
    let diff = a.total() - b.total();
    let winner = if diff > COMPARE_MARGIN {
        Winner::First
    } else if diff < -COMPARE_MARGIN {
        Winner::Second
    } else {
        Winner::Tie
    };
    Ok(VersionComparison {
        winner,
        first: a,
        second: b,
    })
}
