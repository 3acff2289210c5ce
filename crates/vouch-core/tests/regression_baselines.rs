use std::sync::Arc;
use vouch_core::baseline::regression::{RegressionOptions, RegressionOutcome, Winner};
use vouch_core::config::EngineConfig;
use vouch_core::model::{MetricName, ScoringSource};
use vouch_core::providers::embedder::fake::HashingEmbedder;
use vouch_core::providers::llm::fake::FakeClient;
use vouch_core::{Engine, EvalError};

fn engine(dir: &std::path::Path, judge: Option<FakeClient>) -> Engine {
    let mut cfg = EngineConfig::default();
    cfg.tool_dir = dir.to_path_buf();
    let mut b = Engine::builder(cfg).with_embedder(Arc::new(HashingEmbedder::default()));
    if let Some(j) = judge {
        b = b.with_judge(Arc::new(j));
    }
    b.build().unwrap()
}

fn coherence_only(update: bool) -> RegressionOptions {
    RegressionOptions {
        metrics: vec![MetricName::Coherence],
        threshold: 0.5,
        update_baseline: update,
    }
}

#[tokio::test]
async fn baseline_only_moves_on_improvement() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let judge = FakeClient::scripted(
        "judge",
        vec![
            Ok(r#"{"coherence": 0.7}"#.into()),
            Ok(r#"{"coherence": 0.6}"#.into()),
            Ok(r#"{"coherence": 0.8}"#.into()),
        ],
    );
    let engine = engine(dir.path(), Some(judge));

    let first = engine
        .check_regression("first answer", "answers", &coherence_only(true))
        .await?;
    let RegressionOutcome::Bootstrapped(b) = first else {
        panic!("expected bootstrap, got {first:?}");
    };
    assert_eq!(b.version, 1);
    assert_eq!(b.get_score(MetricName::Coherence), Some(0.7));
    assert_eq!(b.scoring, ScoringSource::Judged);

    // 0.6 is within the allowed dip, so the check passes, but it is no improvement.
    let worse = engine
        .check_regression("weaker answer", "answers", &coherence_only(true))
        .await?;
    assert!(worse.passed());
    let stored = engine.baselines().load("answers")?.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.text, "first answer");

    let better = engine
        .check_regression("better answer", "answers", &coherence_only(true))
        .await?;
    match better {
        RegressionOutcome::Compared { updated_to, .. } => assert_eq!(updated_to, Some(2)),
        other => panic!("unexpected {other:?}"),
    }
    let stored = engine.baselines().load("answers")?.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.text, "better answer");
    assert_eq!(stored.get_score(MetricName::Coherence), Some(0.8));
    assert!(stored.updated_at >= stored.created_at);
    Ok(())
}

#[tokio::test]
async fn drop_below_floor_reports_every_violation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let judge = FakeClient::scripted(
        "judge",
        vec![
            Ok(r#"{"coherence": 0.95, "relevance": 0.9}"#.into()),
            Ok(r#"{"coherence": 0.84, "relevance": 0.91}"#.into()),
        ],
    );
    let engine = engine(dir.path(), Some(judge));
    let opts = RegressionOptions::default();

    engine.check_regression("baseline text", "summary", &opts).await?;
    let err = engine
        .assert_passes_regression("drifted text", "summary", &opts)
        .await
        .unwrap_err();
    match err {
        EvalError::RegressionFailed {
            baseline_id,
            version,
            violations,
            actual_excerpt,
            ..
        } => {
            assert_eq!(baseline_id, "summary");
            assert_eq!(version, 1);
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].metric, MetricName::Coherence);
            // max(0.85, 0.95 - 0.1)
            assert!((violations[0].min_acceptable - 0.85).abs() < 1e-9);
            assert_eq!(actual_excerpt, "drifted text");
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn fallback_scoring_without_judge() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = engine(dir.path(), None);
    let opts = RegressionOptions::default();

    let first = engine
        .check_regression("the invoice is overdue by ten days", "billing", &opts)
        .await?;
    match &first {
        RegressionOutcome::Bootstrapped(b) => {
            assert_eq!(b.scoring, ScoringSource::FallbackEstimated);
            for v in b.metrics.values() {
                assert!((v - 1.0).abs() < 1e-9);
            }
        }
        other => panic!("unexpected {other:?}"),
    }

    let same = engine
        .check_regression("the invoice is overdue by ten days", "billing", &opts)
        .await?;
    assert!(same.passed());
    let other = engine
        .check_regression("sunny weather expected at the coast", "billing", &opts)
        .await?;
    assert!(!other.passed());
    assert_eq!(other.violations().len(), 2);
    Ok(())
}

#[tokio::test]
async fn version_comparison_uses_dead_zone() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let all = |v: f64| {
        format!(
            r#"{{"coherence": {v}, "coverage": {v}, "conciseness": {v}, "accuracy": {v}, "relevance": {v}}}"#
        )
    };
    let judge = FakeClient::scripted(
        "judge",
        vec![Ok(all(0.8)), Ok(all(0.805)), Ok(all(0.9)), Ok(all(0.7))],
    );
    let engine = engine(dir.path(), Some(judge));

    // totals 4.0 vs 4.025: inside the 0.05 margin
    let tie = engine.compare_versions("a", "b", "ref").await?;
    assert_eq!(tie.winner, Winner::Tie);

    // totals 4.5 vs 3.5
    let clear = engine.compare_versions("a", "b", "ref").await?;
    assert_eq!(clear.winner, Winner::First);
    assert!((clear.margin() - 1.0).abs() < 1e-9);
    Ok(())
}
