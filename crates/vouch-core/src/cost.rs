//! Per-test token and dollar accounting.
//!
//! A [`CostLedger`] belongs to exactly one test execution. Handles are cheap to
//! clone and all clones observe the same totals, so a test body and the session
//! that owns it can both read the ledger without sharing it with other tests.

use crate::errors::{EvalError, Result};
use crate::model::{LlmResponse, TokenScope, UsageSnapshot};
use crate::pricing::{estimate_tokens, PricingTable};
use std::sync::{Arc, Mutex, MutexGuard};

/// Target for metered usage events, kept separate from diagnostic logging.
pub const USAGE_TARGET: &str = "vouch_usage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Active,
    Ended,
}

#[derive(Debug)]
struct Inner {
    state: LedgerState,
    usage: UsageSnapshot,
}

/// Outcome of comparing a ledger against a budget, before any pass/fail decision.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck<T> {
    pub actual: T,
    pub max: T,
    pub passed: bool,
    pub usage: UsageSnapshot,
}

#[derive(Debug, Clone)]
pub struct CostLedger {
    test_id: Arc<str>,
    pricing: Arc<PricingTable>,
    inner: Arc<Mutex<Inner>>,
}

impl CostLedger {
    pub fn new(test_id: &str, pricing: Arc<PricingTable>) -> Self {
        Self {
            test_id: Arc::from(test_id),
            pricing,
            inner: Arc::new(Mutex::new(Inner {
                state: LedgerState::Active,
                usage: UsageSnapshot::default(),
            })),
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned ledger still holds valid totals; keep reading them.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> LedgerState {
        self.lock().state
    }

    /// Adds one call's usage. `model`/`provider` become the most recent call's.
    pub fn record_usage(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<UsageSnapshot> {
        let quote = self.pricing.resolve(model);
        let cost = quote.entry.cost(input_tokens, output_tokens);

        let mut inner = self.lock();
        if inner.state == LedgerState::Ended {
            return Err(EvalError::config(format!(
                "cost ledger for test '{}' has ended; usage can no longer be recorded",
                self.test_id
            )));
        }
        inner.usage.total_cost_usd += cost;
        inner.usage.input_tokens = inner.usage.input_tokens.saturating_add(input_tokens);
        inner.usage.output_tokens = inner.usage.output_tokens.saturating_add(output_tokens);
        inner.usage.model = model.to_string();
        inner.usage.provider = quote.entry.provider.clone();
        let snapshot = inner.usage.clone();
        drop(inner);

        tracing::debug!(
            event = "vouch.cost.recorded",
            test_id = %self.test_id,
            model = %model,
            priced_as = %quote.entry.model,
            exact_price = quote.exact,
            input_tokens,
            output_tokens,
            cost_usd = cost,
            total_cost_usd = snapshot.total_cost_usd,
        );
        log_usage_event("input_tokens", input_tokens);
        log_usage_event("output_tokens", output_tokens);

        Ok(snapshot)
    }

    /// Records a completion. Token counts the provider did not report are
    /// estimated from `prompt` and the reply text.
    pub fn record_response(&self, prompt: &str, response: &LlmResponse) -> Result<UsageSnapshot> {
        let input = response
            .input_tokens
            .unwrap_or_else(|| estimate_tokens(prompt));
        let output = response
            .output_tokens
            .unwrap_or_else(|| estimate_tokens(&response.text));
        self.record_usage(&response.model, input, output)
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.lock().usage.clone()
    }

    /// Marks the ledger ended and returns its final totals.
    pub fn end(&self) -> UsageSnapshot {
        let mut inner = self.lock();
        inner.state = LedgerState::Ended;
        inner.usage.clone()
    }

    pub fn check_cost(&self, max_usd: f64) -> BudgetCheck<f64> {
        let usage = self.snapshot();
        BudgetCheck {
            actual: usage.total_cost_usd,
            max: max_usd,
            passed: usage.total_cost_usd <= max_usd,
            usage,
        }
    }

    pub fn check_tokens(&self, max_tokens: u64, scope: TokenScope) -> BudgetCheck<u64> {
        let usage = self.snapshot();
        let actual = usage.tokens(scope);
        BudgetCheck {
            actual,
            max: max_tokens,
            passed: actual <= max_tokens,
            usage,
        }
    }

    pub fn assert_cost_less_than(&self, max_usd: f64) -> Result<()> {
        let check = self.check_cost(max_usd);
        if check.passed {
            return Ok(());
        }
        Err(EvalError::CostExceeded {
            actual_usd: check.actual,
            max_usd,
            usage: check.usage,
        })
    }

    pub fn assert_tokens_less_than(&self, max_tokens: u64, scope: TokenScope) -> Result<()> {
        let check = self.check_tokens(max_tokens, scope);
        if check.passed {
            return Ok(());
        }
        Err(EvalError::TokenBudgetExceeded {
            scope,
            actual: check.actual,
            max: max_tokens,
            usage: check.usage,
        })
    }
}

/// Logs a standardized usage event for metered billing pipelines.
pub fn log_usage_event(usage_type: &str, count: u64) {
    tracing::info!(
        target: USAGE_TARGET,
        event = "vouch.usage.metered",
        usage_type = %usage_type,
        count = count,
    );
}
