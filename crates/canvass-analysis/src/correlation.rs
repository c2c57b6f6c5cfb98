use canvass_core::config::AnalysisSettings;
use canvass_core::model::Response;
use serde::{Deserialize, Serialize};

/// Numeric variables derivable from a response row, the axes of every
/// correlation the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Sentiment,
    Intensity,
    LatencyMs,
    CostUsd,
    ScaleValue,
    TextLength,
    WouldSwitch,
}

impl Variable {
    pub const ALL: [Variable; 7] = [
        Variable::Sentiment,
        Variable::Intensity,
        Variable::LatencyMs,
        Variable::CostUsd,
        Variable::ScaleValue,
        Variable::TextLength,
        Variable::WouldSwitch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variable::Sentiment => "sentiment",
            Variable::Intensity => "intensity",
            Variable::LatencyMs => "latency_ms",
            Variable::CostUsd => "cost_usd",
            Variable::ScaleValue => "scale_value",
            Variable::TextLength => "text_length",
            Variable::WouldSwitch => "would_switch",
        }
    }

    pub fn parse(s: &str) -> Option<Variable> {
        Variable::ALL.into_iter().find(|v| v.name() == s)
    }

    /// None when a response does not carry the variable (e.g. a non-numeric
    /// answer for `ScaleValue`).
    pub fn extract(&self, r: &Response) -> Option<f64> {
        match self {
            Variable::Sentiment => Some(r.signals.sentiment),
            Variable::Intensity => Some(r.signals.intensity),
            Variable::LatencyMs => Some(r.latency_ms as f64),
            Variable::CostUsd => Some(r.cost_usd),
            Variable::ScaleValue => r
                .value
                .as_f64()
                .or_else(|| r.value.as_bool().map(|b| if b { 1.0 } else { 0.0 })),
            Variable::TextLength => Some(r.text.chars().count() as f64),
            Variable::WouldSwitch => Some(if r.signals.would_switch { 1.0 } else { 0.0 }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CorrelationOutcome {
    /// Undefined r (constant series) is reported as the absence of a
    /// correlation, never as NaN.
    NoCorrelation { reason: String },
    Correlated(Correlation),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub n: usize,
    pub strength: Strength,
    /// Two-tailed significance estimate from a normal approximation of the
    /// t distribution. Exploratory only; not publication-grade.
    pub p_approx: f64,
}

/// Pearson's r over paired series. Pairs where either side is missing must
/// be filtered by the caller; the slices are aligned by index.
pub fn pearson(xs: &[f64], ys: &[f64], settings: &AnalysisSettings) -> CorrelationOutcome {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return CorrelationOutcome::NoCorrelation {
            reason: format!("fewer than 2 paired observations ({})", n),
        };
    }
    let xs = &xs[..n];
    let ys = &ys[..n];

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return CorrelationOutcome::NoCorrelation {
            reason: "zero variance in at least one series".into(),
        };
    }

    let r = (cov / denom).clamp(-1.0, 1.0);
    CorrelationOutcome::Correlated(Correlation {
        r,
        n,
        strength: classify(r.abs(), settings),
        p_approx: approx_p_two_tailed(r, n),
    })
}

fn classify(abs_r: f64, settings: &AnalysisSettings) -> Strength {
    if abs_r < settings.correlation_weak_r {
        Strength::Weak
    } else if abs_r < settings.correlation_strong_r {
        Strength::Moderate
    } else {
        Strength::Strong
    }
}

/// p ~= 2 * (1 - Phi(|t|)) with t = r * sqrt((n-2) / (1-r^2)).
fn approx_p_two_tailed(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.0;
    }
    let r2 = r * r;
    if (1.0 - r2).abs() < f64::EPSILON {
        return 0.0;
    }
    let t = r.abs() * ((n - 2) as f64 / (1.0 - r2)).sqrt();
    (2.0 * (1.0 - normal_cdf(t))).clamp(0.0, 1.0)
}

/// Standard normal CDF via the Abramowitz-Stegun erf polynomial (7.1.26).
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AnalysisSettings {
        AnalysisSettings::default()
    }

    #[test]
    fn self_correlation_is_one() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        match pearson(&xs, &xs, &settings()) {
            CorrelationOutcome::Correlated(c) => {
                assert!((c.r - 1.0).abs() < 1e-12);
                assert_eq!(c.strength, Strength::Strong);
                assert!(c.p_approx < 0.01);
            }
            other => panic!("expected correlation, got {:?}", other),
        }
    }

    #[test]
    fn constant_series_is_no_correlation() {
        let xs = [3.0, 3.0, 3.0, 3.0];
        let ys = [1.0, 2.0, 3.0, 4.0];
        assert!(matches!(
            pearson(&xs, &ys, &settings()),
            CorrelationOutcome::NoCorrelation { .. }
        ));
    }

    #[test]
    fn anti_correlation_is_minus_one() {
        let xs = [1.0, 2.0, 3.0];
        let ys = [6.0, 4.0, 2.0];
        match pearson(&xs, &ys, &settings()) {
            CorrelationOutcome::Correlated(c) => assert!((c.r + 1.0).abs() < 1e-12),
            other => panic!("expected correlation, got {:?}", other),
        }
    }

    #[test]
    fn uncorrelated_noise_is_weak() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let ys = [5.0, 1.0, 4.0, 2.0, 5.0, 1.0, 4.0, 2.0];
        match pearson(&xs, &ys, &settings()) {
            CorrelationOutcome::Correlated(c) => {
                assert_eq!(c.strength, Strength::Weak);
                assert!(c.p_approx > 0.2);
            }
            other => panic!("expected correlation, got {:?}", other),
        }
    }

    #[test]
    fn erf_is_sane() {
        // The polynomial approximation is good to ~1.5e-7, not machine eps.
        assert!((erf(0.0)).abs() < 1e-6);
        assert!((erf(10.0) - 1.0).abs() < 1e-6);
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        // Phi(1.96) ~ 0.975
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
    }

    #[test]
    fn variable_names_roundtrip() {
        for v in Variable::ALL {
            assert_eq!(Variable::parse(v.name()), Some(v));
        }
        assert_eq!(Variable::parse("nope"), None);
    }
}
