use std::sync::Arc;
use std::time::Duration;
use vouch_core::config::EngineConfig;
use vouch_core::model::{LlmResponse, TestStatus, TokenScope};
use vouch_core::pricing::PricingEntry;
use vouch_core::providers::embedder::fake::HashingEmbedder;
use vouch_core::report::{self, console};
use vouch_core::Engine;

fn engine(dir: &std::path::Path) -> Arc<Engine> {
    let mut cfg = EngineConfig::default();
    cfg.tool_dir = dir.to_path_buf();
    cfg.pricing.models = vec![PricingEntry::new("house-model", 1.0, 2.0, "internal")];
    Arc::new(
        Engine::builder(cfg)
            .with_embedder(Arc::new(HashingEmbedder::default()))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn cost_is_additive_and_failure_carries_usage() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());

    let outcome = engine
        .session("budget")
        .run(|ctx| async move {
            ctx.ledger().record_usage("house-model", 1_000_000, 0)?;
            ctx.ledger().record_usage("house-model", 0, 500_000)?;
            ctx.ledger().record_response(
                "12345678",
                &LlmResponse {
                    text: "1234".into(),
                    model: "house-model".into(),
                    ..Default::default()
                },
            )?;
            ctx.ledger().assert_cost_less_than(1.5)?;
            Ok(())
        })
        .await?;

    assert_eq!(outcome.status, TestStatus::Failed);
    assert_eq!(outcome.error_kind.as_deref(), Some("CostExceeded"));
    // 1.0 + 1.0, plus 2 estimated input and 1 estimated output token
    let expected = 2.0 + 2.0 / 1e6 + 2.0 / 1e6;
    assert!((outcome.cost.total_cost_usd - expected).abs() < 1e-12);
    assert_eq!(outcome.cost.input_tokens, 1_000_002);
    assert_eq!(outcome.cost.output_tokens, 500_001);
    assert_eq!(outcome.cost.provider, "internal");
    assert_eq!(outcome.details["max_usd"], 1.5);
    Ok(())
}

#[tokio::test]
async fn token_budget_scopes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());
    let outcome = engine
        .session("tokens")
        .run(|ctx| async move {
            ctx.ledger().record_usage("gpt-4o-mini", 300, 50)?;
            ctx.ledger().assert_tokens_less_than(100, TokenScope::Output)?;
            ctx.ledger().assert_tokens_less_than(350, TokenScope::Total)?;
            ctx.ledger().assert_tokens_less_than(200, TokenScope::Input)?;
            Ok(())
        })
        .await?;
    assert_eq!(outcome.error_kind.as_deref(), Some("TokenBudgetExceeded"));
    assert_eq!(outcome.details["scope"], "input");
    assert_eq!(outcome.details["actual"], 300);
    Ok(())
}

#[tokio::test]
async fn suite_report_round_trips_to_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path());
    let report = engine
        .suite("smoke")
        .timeout(Duration::from_secs(5))
        .test("semantic", |ctx| async move {
            ctx.engine()
                .similarity()
                .assert_semantic_match(
                    "refund issued to the customer today",
                    "refund issued to the customer",
                    &Default::default(),
                )
                .await?;
            Ok(())
        })
        .test("snapshot", |ctx| async move {
            let snap = ctx.engine().check_snapshot("hello there", "greeting", 0.9).await?;
            assert!(snap.passed());
            Ok(())
        })
        .skip("later", "not ready")
        .run()
        .await;

    assert!(report.all_passed(), "{report:?}");
    assert_eq!(report.count(TestStatus::Skipped), 1);

    let out = dir.path().join("report.json");
    report::write_json(&report, &out)?;
    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(written["suite"], "smoke");
    assert_eq!(written["outcomes"].as_array().map(Vec::len), Some(3));

    let summary = console::render_summary(&report);
    assert!(summary.contains("semantic"));
    assert!(summary.contains("skipped"));
    Ok(())
}
