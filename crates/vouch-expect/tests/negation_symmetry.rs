//! For every matcher and input, exactly one of `m` and `not().m` fails.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use vouch_core::config::EngineConfig;
use vouch_core::engine::TestContext;
use vouch_core::errors::Result;
use vouch_core::model::TokenScope;
use vouch_core::providers::embedder::fake::HashingEmbedder;
use vouch_core::Engine;
use vouch_expect::{expect, ExpectExt};

fn exactly_one_fails(label: &str, plain: Result<()>, negated: Result<()>) {
    match (&plain, &negated) {
        (Ok(()), Err(e)) | (Err(e), Ok(())) => {
            assert!(e.is_assertion_failure(), "{label}: non-verdict error {e}");
        }
        _ => panic!("{label}: plain={plain:?} negated={negated:?}"),
    }
}

fn context(dir: &std::path::Path) -> TestContext {
    let mut cfg = EngineConfig::default();
    cfg.tool_dir = dir.to_path_buf();
    let engine = Engine::builder(cfg)
        .with_embedder(Arc::new(HashingEmbedder::default()))
        .build()
        .unwrap();
    TestContext::new(Arc::new(engine), "negation")
}

#[test]
fn structural_matchers() {
    for (a, b) in [(1, 1), (1, 2)] {
        exactly_one_fails("to_be", expect(a).to_be(b), expect(a).not().to_be(b));
        exactly_one_fails(
            "to_be_greater_than",
            expect(a).to_be_greater_than(b),
            expect(a).not().to_be_greater_than(b),
        );
    }
    for text in ["", "hello 42"] {
        exactly_one_fails("to_be_truthy", expect(text).to_be_truthy(), expect(text).not().to_be_truthy());
        exactly_one_fails("to_contain", expect(text).to_contain("42"), expect(text).not().to_contain("42"));
        exactly_one_fails("to_match", expect(text).to_match(r"\d+"), expect(text).not().to_match(r"\d+"));
        exactly_one_fails("to_contain_pii", expect(text).to_contain_pii(), expect(text).not().to_contain_pii());
    }
    for v in [Some(1), None] {
        exactly_one_fails("to_be_defined", expect(v).to_be_defined(), expect(v).not().to_be_defined());
    }
    let value = json!({"a": [1, 2]});
    for other in [json!({"a": [1, 2]}), json!({"a": [2, 1]})] {
        exactly_one_fails(
            "to_equal",
            expect(&value).to_equal(&other),
            expect(&value).not().to_equal(&other),
        );
    }
}

#[test]
fn schema_and_statistics() {
    let schema = json!({"type": "object", "required": ["id"]});
    for doc in [json!({"id": 1}), json!({})] {
        exactly_one_fails(
            "to_match_schema",
            expect(&doc).to_match_schema(&schema),
            expect(&doc).not().to_match_schema(&schema),
        );
    }

    let runs = ["a", "a", "a", "b", "a"];
    for wanted in ["a", "b"] {
        exactly_one_fails(
            "to_mostly_be",
            expect(&runs[..]).to_mostly_be(wanted),
            expect(&runs[..]).not().to_mostly_be(wanted),
        );
    }

    let mut dist = BTreeMap::new();
    dist.insert("a".to_string(), 0.8);
    dist.insert("b".to_string(), 0.2);
    exactly_one_fails(
        "to_match_distribution",
        expect(&runs[..]).to_match_distribution(&dist),
        expect(&runs[..]).not().to_match_distribution(&dist),
    );

    for scores in [vec![0.5, 0.52], vec![0.1, 0.9]] {
        exactly_one_fails(
            "to_have_low_variance",
            expect(&scores).to_have_low_variance(0.05),
            expect(&scores).not().to_have_low_variance(0.05),
        );
    }
}

#[tokio::test]
async fn engine_backed_matchers() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    for candidate in ["shipping takes five days", "our office is closed on sunday"] {
        exactly_one_fails(
            "to_semantic_match",
            ctx.expect(candidate).to_semantic_match("shipping takes five days").await,
            ctx.expect(candidate).not().to_semantic_match("shipping takes five days").await,
        );
    }

    ctx.ledger().record_usage("gpt-4o-mini", 10_000, 2_000).unwrap();
    for budget in [1.0, 0.0001] {
        exactly_one_fails(
            "to_cost_less_than",
            expect(ctx.ledger()).to_cost_less_than(budget),
            expect(ctx.ledger()).not().to_cost_less_than(budget),
        );
    }
    for max in [100_000, 100] {
        exactly_one_fails(
            "to_use_fewer_tokens_than",
            expect(ctx.ledger()).to_use_fewer_tokens_than(max, TokenScope::Total),
            expect(ctx.ledger()).not().to_use_fewer_tokens_than(max, TokenScope::Total),
        );
    }

    let runs = ["the sky is blue", "the sky is blue", "the sky is blue today"];
    exactly_one_fails(
        "to_be_consistent",
        ctx.expect(&runs[..]).to_be_consistent().await,
        ctx.expect(&runs[..]).not().to_be_consistent().await,
    );
}
