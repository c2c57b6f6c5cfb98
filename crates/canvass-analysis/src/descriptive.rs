use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a statistical computation over a possibly sparse sample.
/// Sparse samples are an expected steady state, so "not enough data" is a
/// value, never an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "data")]
pub enum Computed<T> {
    Value(T),
    InsufficientData { needed: usize, got: usize },
}

impl<T> Computed<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Computed::Value(v) => Some(v),
            Computed::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub mode: f64,
    /// Population variance and standard deviation.
    pub variance: f64,
    pub std_dev: f64,
    pub q1: f64,
    pub q3: f64,
    pub min: f64,
    pub max: f64,
    /// std_dev / mean; absent when the mean is zero.
    pub coefficient_of_variation: Option<f64>,
}

/// Descriptive statistics over a numeric series. Below two points there is
/// nothing defensible to report.
pub fn describe(values: &[f64]) -> Computed<DescriptiveStats> {
    if values.len() < 2 {
        return Computed::InsufficientData {
            needed: 2,
            got: values.len(),
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();

    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    let cv = if mean != 0.0 { Some(std_dev / mean) } else { None };

    Computed::Value(DescriptiveStats {
        count: n,
        mean,
        median,
        mode: mode_of(&sorted),
        variance,
        std_dev,
        q1: percentile(&sorted, 0.25),
        q3: percentile(&sorted, 0.75),
        min: sorted[0],
        max: sorted[n - 1],
        coefficient_of_variation: cv,
    })
}

/// Nearest-rank (floor) percentile over a sorted slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as f64;
    let idx = ((q * (n - 1.0)).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

pub fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_of(values);
    (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Most frequent value; ties break toward the smaller value since the
/// input is sorted.
fn mode_of(sorted: &[f64]) -> f64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in sorted {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    let mut best = sorted[0];
    let mut best_count = 0usize;
    for v in sorted {
        let c = counts[&v.to_bits()];
        if c > best_count {
            best = *v;
            best_count = c;
        }
    }
    best
}
