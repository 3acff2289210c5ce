use super::Engine;
use crate::cost::CostLedger;
use crate::errors::{EvalError, Result};
use crate::model::{TestStatus, UsageSnapshot};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a test body receives: the shared engine and this test's own ledger.
#[derive(Clone)]
pub struct TestContext {
    test_id: Arc<str>,
    engine: Arc<Engine>,
    ledger: CostLedger,
}

impl TestContext {
    pub fn new(engine: Arc<Engine>, test_id: &str) -> Self {
        Self {
            ledger: engine.new_ledger(test_id),
            test_id: Arc::from(test_id),
            engine,
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("test_id", &self.test_id)
            .field("usage", &self.ledger.snapshot())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub status: TestStatus,
    pub message: Option<String>,
    /// `EvalError::kind()` of the failure, `"Error"` for foreign errors.
    pub error_kind: Option<String>,
    pub details: serde_json::Value,
    pub cost: UsageSnapshot,
    pub duration_ms: u64,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub(crate) fn failed_with(test_id: &str, err: &anyhow::Error, cost: UsageSnapshot, duration_ms: u64) -> Self {
        let (kind, details) = match err.downcast_ref::<EvalError>() {
            Some(e) => (e.kind().to_string(), e.details()),
            None => ("Error".to_string(), serde_json::Value::Null),
        };
        Self {
            test_id: test_id.to_string(),
            status: TestStatus::Failed,
            message: Some(format!("{:#}", err)),
            error_kind: Some(kind),
            details,
            cost,
            duration_ms,
        }
    }
}

/// One test execution: `pending -> running -> passed | failed | skipped`.
pub struct TestSession {
    engine: Arc<Engine>,
    test_id: String,
    status: TestStatus,
    timeout: Duration,
}

impl TestSession {
    pub fn new(engine: Arc<Engine>, test_id: &str) -> Self {
        Self {
            timeout: engine.default_timeout(),
            engine,
            test_id: test_id.to_string(),
            status: TestStatus::Pending,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status == TestStatus::Pending {
            return Ok(());
        }
        Err(EvalError::config(format!(
            "test session '{}' already ran (status {:?})",
            self.test_id, self.status
        )))
    }

    pub fn skip(&mut self, reason: &str) -> Result<TestOutcome> {
        self.ensure_pending()?;
        self.status = TestStatus::Skipped;
        tracing::info!(event = "vouch.session.skipped", test_id = %self.test_id, reason = %reason);
        Ok(TestOutcome {
            test_id: self.test_id.clone(),
            status: TestStatus::Skipped,
            message: Some(reason.to_string()),
            error_kind: None,
            details: serde_json::Value::Null,
            cost: UsageSnapshot::default(),
            duration_ms: 0,
        })
    }

    /// Runs `body` with a fresh ledger under the session deadline.
    ///
    /// Any error from the body fails the test; it is recorded, not returned.
    /// When the deadline passes the body future is dropped and the test fails
    /// with `Timeout`, whatever the body was awaiting at the time.
    pub async fn run<F, Fut>(&mut self, body: F) -> Result<TestOutcome>
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.ensure_pending()?;
        self.status = TestStatus::Running;
        tracing::debug!(event = "vouch.session.started", test_id = %self.test_id);

        let ctx = TestContext::new(self.engine.clone(), &self.test_id);
        let ledger = ctx.ledger().clone();
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, body(ctx)).await {
            Ok(r) => r,
            Err(_) => Err(EvalError::Timeout {
                test_id: self.test_id.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
            .into()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        let cost = ledger.end();

        let outcome = match result {
            Ok(()) => TestOutcome {
                test_id: self.test_id.clone(),
                status: TestStatus::Passed,
                message: None,
                error_kind: None,
                details: serde_json::Value::Null,
                cost,
                duration_ms,
            },
            Err(e) => TestOutcome::failed_with(&self.test_id, &e, cost, duration_ms),
        };
        self.status = outcome.status;

        tracing::info!(
            event = "vouch.session.finished",
            test_id = %outcome.test_id,
            status = ?outcome.status,
            error_kind = outcome.error_kind.as_deref().unwrap_or(""),
            duration_ms,
            cost_usd = outcome.cost.total_cost_usd,
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::providers::embedder::fake::HashingEmbedder;

    fn engine() -> Arc<Engine> {
        let dir = std::env::temp_dir().join("vouch-session-tests");
        let mut cfg = EngineConfig::default();
        cfg.tool_dir = dir;
        Arc::new(
            Engine::builder(cfg)
                .with_embedder(Arc::new(HashingEmbedder::default()))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn passing_body_records_cost() {
        let mut s = engine().session("ok");
        assert_eq!(s.status(), TestStatus::Pending);
        let out = s
            .run(|ctx| async move {
                ctx.ledger().record_usage("gpt-4o-mini", 1000, 500)?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(out.passed());
        assert!((out.cost.total_cost_usd - 0.00045).abs() < 1e-12);
        assert_eq!(s.status(), TestStatus::Passed);
    }

    #[tokio::test]
    async fn eval_errors_keep_their_kind() {
        let mut s = engine().session("budget");
        let out = s
            .run(|ctx| async move {
                ctx.ledger().record_usage("gpt-4o-mini", 1000, 500)?;
                ctx.ledger().assert_cost_less_than(0.0001)?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(out.status, TestStatus::Failed);
        assert_eq!(out.error_kind.as_deref(), Some("CostExceeded"));
        assert_eq!(out.details["max_usd"], 0.0001);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_forces_timeout() {
        let mut s = engine().session("slow").with_timeout(Duration::from_millis(50));
        let out = s
            .run(|_ctx| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(out.status, TestStatus::Failed);
        assert_eq!(out.error_kind.as_deref(), Some("Timeout"));
    }

    #[tokio::test]
    async fn sessions_are_single_use() {
        let mut s = engine().session("once");
        s.run(|_| async { Ok(()) }).await.unwrap();
        assert!(s.run(|_| async { Ok(()) }).await.is_err());
        assert!(s.skip("late").is_err());

        let mut skipped = engine().session("skip");
        let out = skipped.skip("not on ci").unwrap();
        assert_eq!(out.status, TestStatus::Skipped);
        assert!(skipped.status().is_terminal());
    }
}
