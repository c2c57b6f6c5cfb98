use crate::descriptive::{mean_of, std_dev_of, Computed};
use canvass_core::config::AnalysisSettings;
use canvass_core::model::Response;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutlierKind {
    LatencyHigh,
    TextTooShort,
    TextTooLong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlier {
    pub subject_id: String,
    pub question_id: i64,
    pub kind: OutlierKind,
    /// Latency z-score for LatencyHigh, text length for the length kinds.
    pub measure: f64,
}

/// Flags responses with anomalous latency (z-score at or above the
/// configured threshold) or degenerate text length. Needs a minimum sample
/// before latency z-scores mean anything.
pub fn detect(responses: &[Response], settings: &AnalysisSettings) -> Computed<Vec<Outlier>> {
    if responses.len() < settings.outlier_min_samples {
        return Computed::InsufficientData {
            needed: settings.outlier_min_samples,
            got: responses.len(),
        };
    }

    let latencies: Vec<f64> = responses.iter().map(|r| r.latency_ms as f64).collect();
    let mean = mean_of(&latencies);
    let std_dev = std_dev_of(&latencies);

    let mut found = Vec::new();
    for r in responses {
        if std_dev > 0.0 {
            let z = (r.latency_ms as f64 - mean) / std_dev;
            if z >= settings.outlier_z_threshold {
                found.push(Outlier {
                    subject_id: r.subject_id.clone(),
                    question_id: r.question_id,
                    kind: OutlierKind::LatencyHigh,
                    measure: z,
                });
            }
        }
        let len = r.text.chars().count();
        if len < settings.outlier_min_len {
            found.push(Outlier {
                subject_id: r.subject_id.clone(),
                question_id: r.question_id,
                kind: OutlierKind::TextTooShort,
                measure: len as f64,
            });
        } else if len > settings.outlier_max_len {
            found.push(Outlier {
                subject_id: r.subject_id.clone(),
                question_id: r.question_id,
                kind: OutlierKind::TextTooLong,
                measure: len as f64,
            });
        }
    }
    Computed::Value(found)
}
