//! Matchers backed by the engine: semantic similarity, regression baselines,
//! snapshots and per-test cost.

use crate::Expectation;
use serde_json::json;
use std::borrow::Borrow;
use vouch_core::baseline::regression::{regression_error, RegressionOptions, RegressionOutcome};
use vouch_core::cost::CostLedger;
use vouch_core::embeddings::SemanticOptions;
use vouch_core::errors::{EvalError, Result};
use vouch_core::model::TokenScope;
use vouch_core::snapshot::{SnapshotCheck, DEFAULT_SNAPSHOT_THRESHOLD};

impl<'a, T: AsRef<str>> Expectation<'a, T> {
    pub async fn to_semantic_match(&self, expected: &str) -> Result<()> {
        self.to_semantic_match_with(expected, &SemanticOptions::default())
            .await
    }

    pub async fn to_semantic_match_with(&self, expected: &str, opts: &SemanticOptions) -> Result<()> {
        let engine = self.engine("to_semantic_match")?;
        let actual = self.actual.as_ref();
        let check = engine
            .similarity()
            .check_semantic_match(actual, expected, opts)
            .await?;
        let (similarity, threshold) = (check.similarity, check.threshold);
        self.verdict(
            "to_semantic_match",
            check.passed,
            || check.into_error(actual, expected),
            || {
                (
                    format!(
                        "expected similarity below {:.4}, got {:.4}",
                        threshold, similarity
                    ),
                    json!({
                        "similarity": similarity,
                        "threshold": threshold,
                        "actual": actual,
                        "expected": expected,
                    }),
                )
            },
        )
    }

    /// Checks against the stored baseline `baseline_id` with default options.
    /// The first call for an id records the baseline and passes.
    pub async fn to_pass_regression(&self, baseline_id: &str) -> Result<()> {
        self.to_pass_regression_with(baseline_id, &RegressionOptions::default())
            .await
    }

    pub async fn to_pass_regression_with(
        &self,
        baseline_id: &str,
        opts: &RegressionOptions,
    ) -> Result<()> {
        let engine = self.engine("to_pass_regression")?;
        let actual = self.actual.as_ref();
        let outcome = engine.check_regression(actual, baseline_id, opts).await?;
        self.verdict(
            "to_pass_regression",
            outcome.passed(),
            || {
                regression_error(&outcome, actual).unwrap_or_else(|| {
                    EvalError::assertion("to_pass_regression", "regression check failed")
                })
            },
            || {
                let message = match &outcome {
                    RegressionOutcome::Bootstrapped(b) => format!(
                        "expected a regression against '{}', but the baseline was just created",
                        b.id
                    ),
                    RegressionOutcome::Compared { baseline, .. } => format!(
                        "expected a regression against '{}' (v{}), but every metric held",
                        baseline.id, baseline.version
                    ),
                };
                (message, json!({ "baseline_id": baseline_id }))
            },
        )
    }

    pub async fn to_match_semantic_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.to_match_semantic_snapshot_with(snapshot_id, DEFAULT_SNAPSHOT_THRESHOLD)
            .await
    }

    pub async fn to_match_semantic_snapshot_with(
        &self,
        snapshot_id: &str,
        threshold: f64,
    ) -> Result<()> {
        let engine = self.engine("to_match_semantic_snapshot")?;
        let actual = self.actual.as_ref();
        let check = engine.check_snapshot(actual, snapshot_id, threshold).await?;
        self.verdict(
            "to_match_semantic_snapshot",
            check.passed(),
            || {
                check.mismatch(snapshot_id, actual).unwrap_or_else(|| {
                    EvalError::assertion("to_match_semantic_snapshot", "snapshot mismatch")
                })
            },
            || {
                let similarity = match &check {
                    SnapshotCheck::Created => None,
                    SnapshotCheck::Compared { similarity, .. } => Some(*similarity),
                };
                (
                    format!(
                        "expected output to differ from snapshot '{}' (threshold {:.4})",
                        snapshot_id, threshold
                    ),
                    json!({ "snapshot_id": snapshot_id, "similarity": similarity }),
                )
            },
        )
    }
}

/// Budget matchers over a ledger: `expect(ctx.ledger()).to_cost_less_than(0.01)`.
///
/// A ledger exactly at the budget passes.
impl<'a, T: Borrow<CostLedger>> Expectation<'a, T> {
    pub fn to_cost_less_than(&self, max_usd: f64) -> Result<()> {
        let check = self.actual.borrow().check_cost(max_usd);
        let actual_usd = check.actual;
        self.verdict(
            "to_cost_less_than",
            check.passed,
            || EvalError::CostExceeded {
                actual_usd: check.actual,
                max_usd,
                usage: check.usage,
            },
            || {
                (
                    format!(
                        "expected cost above ${:.6}, but spent ${:.6}",
                        max_usd, actual_usd
                    ),
                    json!({ "actual_usd": actual_usd, "max_usd": max_usd }),
                )
            },
        )
    }

    pub fn to_use_fewer_tokens_than(&self, max_tokens: u64, scope: TokenScope) -> Result<()> {
        let check = self.actual.borrow().check_tokens(max_tokens, scope);
        let actual = check.actual;
        self.verdict(
            "to_use_fewer_tokens_than",
            check.passed,
            || EvalError::TokenBudgetExceeded {
                scope,
                actual: check.actual,
                max: max_tokens,
                usage: check.usage,
            },
            || {
                (
                    format!(
                        "expected more than {} {} tokens, but used {}",
                        max_tokens, scope, actual
                    ),
                    json!({ "scope": scope, "actual": actual, "max": max_tokens }),
                )
            },
        )
    }
}
