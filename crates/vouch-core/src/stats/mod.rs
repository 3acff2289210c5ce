//! Repeated-run helpers and statistical assertions over their results.

pub mod chi2;

use crate::embeddings::{meets_threshold, SimilarityScorer, THRESHOLD_EPSILON};
use crate::errors::{EvalError, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

pub use chi2::{
    assert_distribution, check_distribution, chi_squared_test, chi_squared_test_with, ChiSquared,
    ContinuedFractionGamma, DistributionCheck, GammaStrategy, SeriesGamma,
};

pub const DEFAULT_MOSTLY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.8;
/// A single comparison may fall this far below the consistency threshold.
pub const CONSISTENCY_OUTLIER_SLACK: f64 = 0.1;

/// Runs `f(0)..f(n-1)` one after another, stopping at the first error.
pub async fn run_times<T, E, F, Fut>(n: usize, mut f: F) -> std::result::Result<Vec<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        out.push(f(i).await?);
    }
    Ok(out)
}

/// Runs `f(0)..f(n-1)` with at most `max_concurrency` in flight.
///
/// Results arrive in completion order, not index order; tag them inside `f` if
/// the index matters. The first error aborts the remaining invocations and is
/// returned. Panics inside `f` are resumed on the caller.
pub async fn run_times_parallel<T, E, F, Fut>(
    n: usize,
    max_concurrency: usize,
    f: F,
) -> std::result::Result<Vec<T>, E>
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let limit = max_concurrency.max(1);
    let f = Arc::new(f);
    let mut set = JoinSet::new();
    let mut out = Vec::with_capacity(n);
    let mut next = 0;

    while next < n || !set.is_empty() {
        while next < n && set.len() < limit {
            let f = f.clone();
            let i = next;
            set.spawn(async move { f(i).await });
            next += 1;
        }
        match set.join_next().await {
            Some(Ok(Ok(v))) => out.push(v),
            Some(Ok(Err(e))) => {
                set.abort_all();
                tracing::debug!(
                    event = "vouch.stats.batch_aborted",
                    completed = out.len(),
                    requested = n,
                );
                return Err(e);
            }
            Some(Err(join)) if join.is_panic() => {
                set.abort_all();
                std::panic::resume_unwind(join.into_panic());
            }
            // cancellation only happens after abort_all, and we return right after that
            Some(Err(_)) | None => {}
        }
    }
    Ok(out)
}

/// JSON text with object keys sorted, so structurally equal values compare equal.
fn canonical<T: Serialize>(v: &T) -> Result<String> {
    Ok(serde_json::to_string(&sorted_keys(serde_json::to_value(v)?))?)
}

fn sorted_keys(v: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted_keys).collect()),
        other => other,
    }
}

/// Occurrence counts keyed by canonical JSON, in first-seen order.
pub fn value_counts<T: Serialize>(items: &[T]) -> Result<Vec<(String, u64)>> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    for item in items {
        let key = canonical(item)?;
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, c)) => *c += 1,
            None => counts.push((key, 1)),
        }
    }
    Ok(counts)
}

/// Most frequent value by structural equality. On ties, the value that first
/// reached the winning count is returned.
pub fn mode<T: Serialize + Clone>(items: &[T]) -> Result<Option<T>> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut best: Option<(usize, u64)> = None;
    for (idx, item) in items.iter().enumerate() {
        let key = canonical(item)?;
        let count = match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, c)) => {
                *c += 1;
                *c
            }
            None => {
                counts.push((key, 1));
                1
            }
        };
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((idx, count));
        }
    }
    Ok(best.map(|(idx, _)| items[idx].clone()))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for fewer than two samples.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn match_percentage<T: Serialize>(items: &[T], expected: &T) -> Result<f64> {
    if items.is_empty() {
        return Ok(0.0);
    }
    let want = canonical(expected)?;
    let mut hits = 0usize;
    for item in items {
        if canonical(item)? == want {
            hits += 1;
        }
    }
    Ok(hits as f64 / items.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

impl Summary {
    /// All zeros for an empty sample.
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            n: sorted.len(),
            mean: mean(&sorted),
            std_dev: standard_deviation(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p10: percentile(&sorted, 0.10),
            p50: percentile(&sorted, 0.50),
            p90: percentile(&sorted, 0.90),
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as f64;
    let idx = ((q * (n - 1.0)).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[derive(Debug, Clone, PartialEq)]
pub struct MostlyCheck {
    pub match_rate: f64,
    pub threshold: f64,
    pub passed: bool,
    pub distribution: Vec<(String, u64)>,
}

pub fn check_mostly_be<T: Serialize>(results: &[T], expected: &T, threshold: f64) -> Result<MostlyCheck> {
    let match_rate = match_percentage(results, expected)?;
    Ok(MostlyCheck {
        match_rate,
        threshold,
        passed: meets_threshold(match_rate, threshold),
        distribution: value_counts(results)?,
    })
}

impl MostlyCheck {
    pub fn into_error(self, expected: serde_json::Value) -> EvalError {
        EvalError::StatisticalMismatch {
            match_rate: self.match_rate,
            threshold: self.threshold,
            expected,
            distribution: self.distribution,
        }
    }
}

pub fn assert_mostly_be<T: Serialize>(results: &[T], expected: &T, threshold: f64) -> Result<MostlyCheck> {
    let check = check_mostly_be(results, expected, threshold)?;
    if check.passed {
        return Ok(check);
    }
    Err(check.into_error(serde_json::to_value(expected)?))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarianceCheck {
    pub summary: Summary,
    pub max_std_dev: f64,
    pub passed: bool,
}

impl VarianceCheck {
    pub fn into_error(self) -> EvalError {
        EvalError::VarianceExceeded {
            std_dev: self.summary.std_dev,
            max_std_dev: self.max_std_dev,
            mean: self.summary.mean,
            min: self.summary.min,
            max: self.summary.max,
        }
    }
}

pub fn check_low_variance(results: &[f64], max_std_dev: f64) -> VarianceCheck {
    let summary = Summary::of(results);
    VarianceCheck {
        passed: summary.std_dev <= max_std_dev + THRESHOLD_EPSILON,
        summary,
        max_std_dev,
    }
}

pub fn assert_low_variance(results: &[f64], max_std_dev: f64) -> Result<Summary> {
    let check = check_low_variance(results, max_std_dev);
    if check.passed {
        return Ok(check.summary);
    }
    Err(check.into_error())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyCheck {
    /// Similarity of each result after the first to the first.
    pub similarities: Vec<f64>,
    pub mean: f64,
    pub min: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// Compares every result to the first one. Fewer than two results pass trivially.
pub async fn check_consistent<S: AsRef<str>>(
    scorer: &SimilarityScorer,
    results: &[S],
    threshold: f64,
) -> Result<ConsistencyCheck> {
    let Some((first, rest)) = results.split_first() else {
        return Ok(trivially_consistent(threshold));
    };
    if rest.is_empty() {
        return Ok(trivially_consistent(threshold));
    }

    let mut similarities = Vec::with_capacity(rest.len());
    for r in rest {
        similarities.push(
            scorer
                .semantic_similarity(first.as_ref(), r.as_ref(), None, true)
                .await?,
        );
    }
    let mean = mean(&similarities);
    let min = similarities.iter().copied().fold(f64::INFINITY, f64::min);
    let passed = meets_threshold(mean, threshold)
        && meets_threshold(min, threshold - CONSISTENCY_OUTLIER_SLACK);
    Ok(ConsistencyCheck {
        similarities,
        mean,
        min,
        threshold,
        passed,
    })
}

fn trivially_consistent(threshold: f64) -> ConsistencyCheck {
    ConsistencyCheck {
        similarities: vec![],
        mean: 1.0,
        min: 1.0,
        threshold,
        passed: true,
    }
}

impl ConsistencyCheck {
    pub fn into_error(self) -> EvalError {
        EvalError::ConsistencyFailed {
            mean: self.mean,
            min: self.min,
            threshold: self.threshold,
            similarities: self.similarities,
        }
    }
}

pub async fn assert_consistent<S: AsRef<str>>(
    scorer: &SimilarityScorer,
    results: &[S],
    threshold: f64,
) -> Result<ConsistencyCheck> {
    let check = check_consistent(scorer, results, threshold).await?;
    if check.passed {
        return Ok(check);
    }
    Err(check.into_error())
}
