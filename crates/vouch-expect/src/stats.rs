//! Matchers over the results of repeated runs.

use crate::Expectation;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use vouch_core::errors::{EvalError, Result};
use vouch_core::stats::chi2::DEFAULT_SIGNIFICANCE;
use vouch_core::stats::{
    self, GammaStrategy, SeriesGamma, DEFAULT_CONSISTENCY_THRESHOLD, DEFAULT_MOSTLY_THRESHOLD,
};

impl<'a, T> Expectation<'a, T> {
    /// At least 80% of the results equal `expected`.
    pub fn to_mostly_be<U, E>(&self, expected: &E) -> Result<()>
    where
        T: AsRef<[U]>,
        U: Serialize,
        E: Serialize + ?Sized,
    {
        self.to_mostly_be_with(expected, DEFAULT_MOSTLY_THRESHOLD)
    }

    /// Results and `expected` are compared by their JSON form, so a
    /// `Vec<String>` can be checked against a `&str`.
    pub fn to_mostly_be_with<U, E>(&self, expected: &E, threshold: f64) -> Result<()>
    where
        T: AsRef<[U]>,
        U: Serialize,
        E: Serialize + ?Sized,
    {
        let results = self
            .actual
            .as_ref()
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()
            .map_err(|e| EvalError::config(format!("to_mostly_be: unserializable result: {}", e)))?;
        let expected = serde_json::to_value(expected)
            .map_err(|e| EvalError::config(format!("to_mostly_be: unserializable value: {}", e)))?;

        let check = stats::check_mostly_be(&results, &expected, threshold)?;
        let match_rate = check.match_rate;
        let wanted = expected.clone();
        self.verdict(
            "to_mostly_be",
            check.passed,
            || check.into_error(expected),
            || {
                (
                    format!(
                        "expected fewer than {:.0}% of results to be {}, got {:.0}%",
                        threshold * 100.0,
                        wanted,
                        match_rate * 100.0
                    ),
                    json!({ "match_rate": match_rate, "threshold": threshold, "expected": wanted }),
                )
            },
        )
    }

    /// Population standard deviation of the results is at most `max_std_dev`.
    pub fn to_have_low_variance(&self, max_std_dev: f64) -> Result<()>
    where
        T: AsRef<[f64]>,
    {
        let check = stats::check_low_variance(self.actual.as_ref(), max_std_dev);
        let summary = check.summary;
        self.verdict(
            "to_have_low_variance",
            check.passed,
            || check.into_error(),
            || {
                (
                    format!(
                        "expected std dev above {:.4}, got {:.4}",
                        max_std_dev, summary.std_dev
                    ),
                    json!({ "summary": summary, "max_std_dev": max_std_dev }),
                )
            },
        )
    }

    /// Chi-squared goodness of fit against expected fractions; fails when the
    /// p-value drops below 0.05. Uses the engine's gamma strategy when a
    /// context is attached.
    pub fn to_match_distribution<S>(&self, expected: &BTreeMap<String, f64>) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.to_match_distribution_with(expected, DEFAULT_SIGNIFICANCE)
    }

    pub fn to_match_distribution_with<S>(
        &self,
        expected: &BTreeMap<String, f64>,
        significance: f64,
    ) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        let gamma: &dyn GammaStrategy = match self.ctx {
            Some(ctx) => ctx.engine().gamma(),
            None => &SeriesGamma,
        };
        let check = stats::check_distribution(self.actual.as_ref(), expected, significance, gamma)?;
        let p_value = check.test.p_value;
        self.verdict(
            "to_match_distribution",
            check.passed,
            || check.into_error(),
            || {
                (
                    format!(
                        "expected results to deviate from the distribution, but p = {:.4} >= {}",
                        p_value, significance
                    ),
                    json!({ "p_value": p_value, "significance": significance }),
                )
            },
        )
    }

    /// Every result after the first is semantically close to the first.
    pub async fn to_be_consistent<S>(&self) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str> + Sync,
    {
        self.to_be_consistent_with(DEFAULT_CONSISTENCY_THRESHOLD)
            .await
    }

    pub async fn to_be_consistent_with<S>(&self, threshold: f64) -> Result<()>
    where
        T: AsRef<[S]>,
        S: AsRef<str> + Sync,
    {
        let engine = self.engine("to_be_consistent")?;
        let check =
            stats::check_consistent(engine.similarity(), self.actual.as_ref(), threshold).await?;
        let (mean, min) = (check.mean, check.min);
        self.verdict(
            "to_be_consistent",
            check.passed,
            || check.into_error(),
            || {
                (
                    format!(
                        "expected inconsistent results, but mean similarity {:.4} and min {:.4} met {:.4}",
                        mean, min, threshold
                    ),
                    json!({ "mean": mean, "min": min, "threshold": threshold }),
                )
            },
        )
    }
}
