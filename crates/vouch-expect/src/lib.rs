//! `expect(value)` matchers for AI output.
//!
//! Structural matchers work on any value with no setup. Matchers that need
//! providers, stores or a ledger take them from a [`TestContext`], attached with
//! `ctx.expect(value)` (see [`ExpectExt`]).
//!
//! ```ignore
//! ctx.expect(answer.as_str()).to_semantic_match("Paris is the capital").await?;
//! ctx.expect(answer.as_str()).not().to_contain_pii()?;
//! expect(ctx.ledger()).to_cost_less_than(0.01)?;
//! ```

pub mod ai;
pub mod pii;
pub mod schema;
pub mod stats;
pub mod structural;

pub use pii::{find_pii, PiiKind, PiiMatch};
pub use schema::JsonInstance;
pub use structural::{Contains, Truthy};

use std::fmt::Debug;
use vouch_core::engine::TestContext;
use vouch_core::errors::{EvalError, Result};
use vouch_core::Engine;

/// An actual value plus a negation flag and an optional test context.
///
/// Every matcher decides pass/fail once and then flips that decision when the
/// expectation is negated. Errors that are not verdicts (provider, storage,
/// configuration) are returned unchanged either way.
#[derive(Debug, Clone)]
pub struct Expectation<'a, T> {
    actual: T,
    negated: bool,
    ctx: Option<&'a TestContext>,
}

pub fn expect<T>(actual: T) -> Expectation<'static, T> {
    Expectation {
        actual,
        negated: false,
        ctx: None,
    }
}

impl<'a, T> Expectation<'a, T> {
    /// A new expectation with the opposite polarity.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self {
            negated: !self.negated,
            ..self
        }
    }

    pub fn with_context<'b>(self, ctx: &'b TestContext) -> Expectation<'b, T> {
        Expectation {
            actual: self.actual,
            negated: self.negated,
            ctx: Some(ctx),
        }
    }

    pub fn actual(&self) -> &T {
        &self.actual
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub(crate) fn context(&self, matcher: &'static str) -> Result<&'a TestContext> {
        self.ctx.ok_or_else(|| {
            EvalError::config(format!(
                "{} needs a test context; use ctx.expect(value) instead of expect(value)",
                matcher
            ))
        })
    }

    pub(crate) fn engine(&self, matcher: &'static str) -> Result<&'a Engine> {
        Ok(self.context(matcher)?.engine())
    }

    /// Applies polarity to a pass/fail decision.
    ///
    /// `on_fail` builds the matcher's own error for a plain failure;
    /// `on_negated_pass` describes why a negated matcher failed.
    pub(crate) fn verdict(
        &self,
        matcher: &'static str,
        passed: bool,
        on_fail: impl FnOnce() -> EvalError,
        on_negated_pass: impl FnOnce() -> (String, serde_json::Value),
    ) -> Result<()> {
        match (passed, self.negated) {
            (true, false) | (false, true) => Ok(()),
            (false, false) => Err(on_fail()),
            (true, true) => {
                let (message, details) = on_negated_pass();
                Err(EvalError::Assertion {
                    matcher,
                    message,
                    details,
                })
            }
        }
    }

    /// `verdict` for matchers whose plain failure is a generic assertion error.
    pub(crate) fn simple_verdict(
        &self,
        matcher: &'static str,
        passed: bool,
        describe: impl FnOnce(&str) -> String,
    ) -> Result<()>
    where
        T: Debug,
    {
        let polarity = if self.negated { "not " } else { "" };
        match (passed, self.negated) {
            (true, false) | (false, true) => Ok(()),
            _ => Err(EvalError::Assertion {
                matcher,
                message: describe(polarity),
                details: serde_json::json!({ "actual": format!("{:?}", self.actual) }),
            }),
        }
    }
}

/// `ctx.expect(value)`: an expectation bound to this test's engine and ledger.
pub trait ExpectExt {
    fn expect<T>(&self, actual: T) -> Expectation<'_, T>;
}

impl ExpectExt for TestContext {
    fn expect<T>(&self, actual: T) -> Expectation<'_, T> {
        expect(actual).with_context(self)
    }
}
