use super::session::{TestContext, TestOutcome};
use super::Engine;
use crate::model::{TestStatus, UsageSnapshot};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

type BodyFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type TestBody = Box<dyn FnOnce(TestContext) -> BodyFuture + Send>;

enum Entry {
    Run(TestBody),
    Skip(String),
}

/// Named test bodies run with bounded parallelism, one session and ledger each.
pub struct Suite {
    engine: Arc<Engine>,
    name: String,
    parallel: usize,
    timeout: Option<Duration>,
    tests: Vec<(String, Entry)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub outcomes: Vec<TestOutcome>,
    pub duration_ms: u64,
}

impl SuiteReport {
    pub fn count(&self, status: TestStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, TestStatus::Passed | TestStatus::Skipped))
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.outcomes.iter().map(|o| o.cost.total_cost_usd).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.outcomes
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.cost.total_tokens()))
    }
}

impl Suite {
    pub fn new(engine: Arc<Engine>, name: &str) -> Self {
        Self {
            parallel: engine.config().session.parallel,
            engine,
            name: name.to_string(),
            timeout: None,
            tests: Vec::new(),
        }
    }

    pub fn parallel(mut self, n: usize) -> Self {
        self.parallel = n.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn test<F, Fut>(mut self, id: &str, body: F) -> Self
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: TestBody = Box::new(move |ctx| Box::pin(body(ctx)));
        self.tests.push((id.to_string(), Entry::Run(body)));
        self
    }

    pub fn skip(mut self, id: &str, reason: &str) -> Self {
        self.tests.push((id.to_string(), Entry::Skip(reason.to_string())));
        self
    }

    /// Runs every test. A failing test is recorded and the rest still run.
    /// Outcomes are reported in declaration order.
    pub async fn run(self) -> SuiteReport {
        let started = Instant::now();
        let sem = Arc::new(Semaphore::new(self.parallel.max(1)));
        let mut handles = Vec::with_capacity(self.tests.len());

        for (id, entry) in self.tests {
            let mut session = self.engine.session(&id);
            if let Some(t) = self.timeout {
                session = session.with_timeout(t);
            }
            let sem = sem.clone();
            let h = tokio::spawn(async move {
                // closed only if the semaphore is dropped, which we never do
                let _permit = sem.acquire_owned().await.ok();
                match entry {
                    Entry::Run(body) => session.run(body).await,
                    Entry::Skip(reason) => session.skip(&reason),
                }
            });
            handles.push((id, h));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, h) in handles {
            let outcome = match h.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    TestOutcome::failed_with(&id, &e.into(), UsageSnapshot::default(), 0)
                }
                Err(join) => TestOutcome::failed_with(
                    &id,
                    &anyhow::anyhow!("test task panicked or was cancelled: {}", join),
                    UsageSnapshot::default(),
                    0,
                ),
            };
            outcomes.push(outcome);
        }

        let report = SuiteReport {
            suite: self.name,
            outcomes,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            event = "vouch.suite.finished",
            suite = %report.suite,
            passed = report.count(TestStatus::Passed),
            failed = report.count(TestStatus::Failed),
            skipped = report.count(TestStatus::Skipped),
            cost_usd = report.total_cost_usd(),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::builder(EngineConfig::default()).build().unwrap())
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_suite() {
        let report = engine()
            .suite("mixed")
            .test("first", |ctx| async move {
                ctx.ledger().record_usage("gpt-4o", 10, 10)?;
                Ok(())
            })
            .test("broken", |_| async { Err(anyhow::anyhow!("boom")) })
            .test("panics", |_| async {
                if true {
                    panic!("unexpected");
                }
                Ok(())
            })
            .skip("later", "flaky upstream")
            .test("last", |_| async { Ok(()) })
            .run()
            .await;

        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.test_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "broken", "panics", "later", "last"]);
        assert_eq!(report.count(TestStatus::Passed), 2);
        assert_eq!(report.count(TestStatus::Failed), 2);
        assert_eq!(report.count(TestStatus::Skipped), 1);
        assert!(!report.all_passed());
        assert_eq!(report.outcomes[1].error_kind.as_deref(), Some("Error"));
        assert_eq!(report.total_tokens(), 20);
    }

    #[tokio::test]
    async fn ledgers_are_per_test() {
        let report = engine()
            .suite("isolated")
            .parallel(4)
            .test("a", |ctx| async move {
                ctx.ledger().record_usage("gpt-4o-mini", 100, 0)?;
                Ok(())
            })
            .test("b", |ctx| async move {
                ctx.ledger().record_usage("gpt-4o-mini", 0, 7)?;
                Ok(())
            })
            .run()
            .await;
        assert_eq!(report.outcomes[0].cost.input_tokens, 100);
        assert_eq!(report.outcomes[0].cost.output_tokens, 0);
        assert_eq!(report.outcomes[1].cost.output_tokens, 7);
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut suite = engine().suite("bounded").parallel(2);
        for i in 0..6 {
            let (l, p) = (live.clone(), peak.clone());
            suite = suite.test(&format!("t{i}"), move |_| async move {
                let now = l.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                l.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let report = suite.run().await;
        assert!(report.all_passed());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
