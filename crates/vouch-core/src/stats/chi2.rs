//! Pearson chi-squared goodness-of-fit with pluggable incomplete-gamma math.

use crate::errors::{DistributionRow, EvalError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;

pub const DEFAULT_SIGNIFICANCE: f64 = 0.05;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Log-gamma and the regularized lower incomplete gamma `P(a, x)`.
pub trait GammaStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn ln_gamma(&self, x: f64) -> f64;
    fn regularized_lower(&self, a: f64, x: f64) -> f64;
}

/// Fast approximation: Stirling log-gamma with the power series for `P(a, x)`.
///
/// The series only converges quickly for `x < a + 1`. Above that the upper
/// tail comes from the continued fraction, so large statistics still give
/// p-values near 0 rather than a truncated sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesGamma;

const SERIES_MAX_ITER: usize = 500;

impl GammaStrategy for SeriesGamma {
    fn name(&self) -> &'static str {
        "series"
    }

    fn ln_gamma(&self, x: f64) -> f64 {
        // shift up so the asymptotic expansion is accurate
        let mut x = x;
        let mut shift = 0.0;
        while x < 7.0 {
            shift += x.ln();
            x += 1.0;
        }
        let inv = 1.0 / x;
        let inv2 = inv * inv;
        (x - 0.5) * x.ln() - x + LN_SQRT_2PI
            + inv * (1.0 / 12.0 - inv2 * (1.0 / 360.0 - inv2 / 1260.0))
            - shift
    }

    fn regularized_lower(&self, a: f64, x: f64) -> f64 {
        if x <= 0.0 || a <= 0.0 {
            return 0.0;
        }
        let gln = self.ln_gamma(a);
        if x < a + 1.0 {
            return lower_series(a, x, gln, SERIES_MAX_ITER);
        }
        (1.0 - upper_fraction(a, x, gln)).clamp(0.0, 1.0)
    }
}

/// Tighter bounds: Lanczos log-gamma, series below `a + 1` and a Lentz
/// continued fraction for the upper tail above it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuedFractionGamma;

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];
const CF_MAX_ITER: usize = 1_000;
const CF_EPS: f64 = 1e-15;
const FP_MIN: f64 = 1e-300;

impl GammaStrategy for ContinuedFractionGamma {
    fn name(&self) -> &'static str {
        "continued_fraction"
    }

    fn ln_gamma(&self, x: f64) -> f64 {
        if x < 0.5 {
            // reflection
            return (PI / (PI * x).sin()).ln() - self.ln_gamma(1.0 - x);
        }
        let x = x - 1.0;
        let t = x + LANCZOS_G + 0.5;
        let mut acc = LANCZOS[0];
        for (i, c) in LANCZOS.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        LN_SQRT_2PI + (x + 0.5) * t.ln() - t + acc.ln()
    }

    fn regularized_lower(&self, a: f64, x: f64) -> f64 {
        if x <= 0.0 || a <= 0.0 {
            return 0.0;
        }
        let gln = self.ln_gamma(a);
        if x < a + 1.0 {
            return lower_series(a, x, gln, CF_MAX_ITER);
        }
        (1.0 - upper_fraction(a, x, gln)).clamp(0.0, 1.0)
    }
}

/// Lentz evaluation of the upper tail `Q(a, x)`, valid for `x >= a + 1`.
fn upper_fraction(a: f64, x: f64, gln: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FP_MIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=CF_MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FP_MIN {
            d = FP_MIN;
        }
        c = b + an / c;
        if c.abs() < FP_MIN {
            c = FP_MIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < CF_EPS {
            break;
        }
    }
    (-x + a * x.ln() - gln).exp() * h
}

fn lower_series(a: f64, x: f64, ln_gamma_a: f64, max_iter: usize) -> f64 {
    let mut term = 1.0 / a;
    let mut sum = term;
    for n in 1..max_iter {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < sum.abs() * 1e-15 {
            break;
        }
    }
    (sum * (-x + a * x.ln() - ln_gamma_a).exp()).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquared {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
}

pub fn chi_squared_test(observed: &[f64], expected: &[f64]) -> Result<ChiSquared> {
    chi_squared_test_with(observed, expected, &SeriesGamma)
}

/// Pearson statistic over paired category counts. Categories with
/// `expected == 0` are left out of the sum and of the degrees of freedom.
pub fn chi_squared_test_with(
    observed: &[f64],
    expected: &[f64],
    gamma: &dyn GammaStrategy,
) -> Result<ChiSquared> {
    if observed.len() != expected.len() {
        return Err(EvalError::DimensionMismatch {
            left: observed.len(),
            right: expected.len(),
        });
    }

    let mut statistic = 0.0;
    let mut categories = 0usize;
    for (o, e) in observed.iter().zip(expected) {
        if *e == 0.0 {
            continue;
        }
        statistic += (o - e).powi(2) / e;
        categories += 1;
    }
    let df = categories.saturating_sub(1).max(1);
    let p_value = (1.0 - gamma.regularized_lower(df as f64 / 2.0, statistic / 2.0)).clamp(0.0, 1.0);
    // a non-finite tail means the statistic is far out of range
    let p_value = if p_value.is_finite() { p_value } else { 0.0 };

    tracing::trace!(
        event = "vouch.stats.chi_squared",
        statistic,
        df,
        p_value,
        strategy = gamma.name(),
    );
    Ok(ChiSquared {
        statistic,
        degrees_of_freedom: df,
        p_value,
    })
}

/// Observed vs expected counts for string results. `expected` maps each value
/// to its expected fraction of the sample; values seen but not listed appear in
/// the table with an expected count of 0.
pub fn distribution_table<S: AsRef<str>>(
    results: &[S],
    expected: &BTreeMap<String, f64>,
) -> Vec<DistributionRow> {
    let n = results.len() as f64;
    let mut observed: BTreeMap<&str, u64> = BTreeMap::new();
    for r in results {
        *observed.entry(r.as_ref()).or_default() += 1;
    }

    let mut rows: Vec<DistributionRow> = expected
        .iter()
        .map(|(value, frac)| DistributionRow {
            value: value.clone(),
            expected: frac * n,
            observed: observed.get(value.as_str()).copied().unwrap_or(0),
        })
        .collect();
    for (value, count) in observed {
        if !expected.contains_key(value) {
            rows.push(DistributionRow {
                value: value.to_string(),
                expected: 0.0,
                observed: count,
            });
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionCheck {
    pub test: ChiSquared,
    pub significance: f64,
    pub passed: bool,
    pub table: Vec<DistributionRow>,
}

impl DistributionCheck {
    pub fn into_error(self) -> EvalError {
        EvalError::DistributionMismatch {
            statistic: self.test.statistic,
            p_value: self.test.p_value,
            significance: self.significance,
            table: self.table,
        }
    }
}

pub fn check_distribution<S: AsRef<str>>(
    results: &[S],
    expected: &BTreeMap<String, f64>,
    significance: f64,
    gamma: &dyn GammaStrategy,
) -> Result<DistributionCheck> {
    let table = distribution_table(results, expected);
    let obs: Vec<f64> = table.iter().map(|r| r.observed as f64).collect();
    let exp: Vec<f64> = table.iter().map(|r| r.expected).collect();
    let test = chi_squared_test_with(&obs, &exp, gamma)?;
    Ok(DistributionCheck {
        passed: test.p_value >= significance,
        test,
        significance,
        table,
    })
}

/// Fails when the chi-squared p-value falls below `significance`.
pub fn assert_distribution<S: AsRef<str>>(
    results: &[S],
    expected: &BTreeMap<String, f64>,
    significance: f64,
    gamma: &dyn GammaStrategy,
) -> Result<ChiSquared> {
    let check = check_distribution(results, expected, significance, gamma)?;
    if check.passed {
        return Ok(check.test);
    }
    Err(check.into_error())
}
