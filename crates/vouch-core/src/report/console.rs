use crate::engine::SuiteReport;
use crate::model::TestStatus;
use std::fmt::Write;

pub fn render_summary(report: &SuiteReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\nSuite '{}': {} tests", report.suite, report.outcomes.len());

    for o in &report.outcomes {
        let duration = format!("({:.1}s)", o.duration_ms as f64 / 1000.0);
        let cost = if o.cost.total_tokens() > 0 {
            format!("${:.6} / {} tok", o.cost.total_cost_usd, o.cost.total_tokens())
        } else {
            String::new()
        };
        match o.status {
            TestStatus::Passed => {
                let _ = writeln!(out, "✅ {:<28} PASS  {} {}", o.test_id, duration, cost);
            }
            TestStatus::Skipped => {
                let _ = writeln!(
                    out,
                    "⏭️  {:<28} SKIPPED ({})",
                    o.test_id,
                    o.message.as_deref().unwrap_or("no reason given")
                );
            }
            TestStatus::Failed => {
                let kind = o.error_kind.as_deref().unwrap_or("Error");
                let _ = writeln!(out, "❌ {:<28} {}  {} {}", o.test_id, kind, duration, cost);
                if let Some(msg) = &o.message {
                    let _ = writeln!(out, "      {}", msg);
                }
            }
            TestStatus::Pending | TestStatus::Running => {
                let _ = writeln!(out, "…  {:<28} did not finish", o.test_id);
            }
        }
    }

    let _ = writeln!(
        out,
        "\nSummary: {} passed, {} failed, {} skipped | cost ${:.6} ({} tokens) | {:.1}s",
        report.count(TestStatus::Passed),
        report.count(TestStatus::Failed),
        report.count(TestStatus::Skipped),
        report.total_cost_usd(),
        report.total_tokens(),
        report.duration_ms as f64 / 1000.0
    );
    out
}

pub fn print_summary(report: &SuiteReport) {
    eprint!("{}", render_summary(report));
}
