use crate::correlation::{Correlation, Strength};
use crate::descriptive::Computed;
use crate::detectors::{HiddenPreference, RupturePoint};
use crate::outliers::Outlier;
use crate::sentiment::{SentimentBucket, SentimentSummary};
use crate::themes::ThemeSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    SentimentClimate,
    DominantTheme,
    Correlation,
    HiddenPreference,
    RupturePoint,
    DataQuality,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub relevance: Relevance,
    /// How many underlying observations back this insight.
    pub support: usize,
}

/// Everything the synthesis rules look at.
pub struct InsightInputs<'a> {
    pub sentiment: &'a SentimentSummary,
    pub themes: &'a [ThemeSummary],
    pub correlations: &'a [(String, String, Correlation)],
    pub hidden_preferences: &'a [HiddenPreference],
    pub rupture_points: &'a [RupturePoint],
    pub outliers: &'a Computed<Vec<Outlier>>,
}

/// Fixed rules, fixed ordering: the same inputs always produce the same
/// insight list. Sorted by relevance descending, then title.
pub fn synthesize(inputs: &InsightInputs<'_>) -> Vec<Insight> {
    let mut out = Vec::new();

    let total = inputs.sentiment.total();
    if total > 0 {
        let dominant = inputs.sentiment.dominant();
        let relevance = match dominant {
            SentimentBucket::Negative => Relevance::High,
            SentimentBucket::Positive => Relevance::Medium,
            SentimentBucket::Neutral => Relevance::Low,
        };
        out.push(Insight {
            kind: InsightKind::SentimentClimate,
            title: format!("Overall sentiment is {}", dominant.label()),
            description: format!(
                "{} positive, {} neutral, {} negative across {} responses (mean score {:.2})",
                inputs.sentiment.positive,
                inputs.sentiment.neutral,
                inputs.sentiment.negative,
                total,
                inputs.sentiment.mean_score,
            ),
            relevance,
            support: total,
        });
    }

    if let Some(top) = inputs.themes.first() {
        let relevance = if top.share >= 0.5 {
            Relevance::High
        } else if top.share >= 0.25 {
            Relevance::Medium
        } else {
            Relevance::Low
        };
        out.push(Insight {
            kind: InsightKind::DominantTheme,
            title: format!("Dominant theme: {}", top.topic),
            description: format!(
                "{} of {} tagged mentions ({:.0}% of responses), average sentiment {:.2}",
                top.count,
                inputs.themes.iter().map(|t| t.count).sum::<usize>(),
                top.share * 100.0,
                top.avg_sentiment,
            ),
            relevance,
            support: top.count,
        });
    }

    for (x, y, c) in inputs.correlations {
        let relevance = match c.strength {
            Strength::Strong => Relevance::High,
            Strength::Moderate => Relevance::Medium,
            Strength::Weak => Relevance::Low,
        };
        if relevance == Relevance::Low {
            continue;
        }
        out.push(Insight {
            kind: InsightKind::Correlation,
            title: format!("{x} correlates with {y}"),
            description: format!(
                "r = {:.3} over {} pairs (exploratory p ~ {:.3})",
                c.r, c.n, c.p_approx,
            ),
            relevance,
            support: c.n,
        });
    }

    if !inputs.hidden_preferences.is_empty() {
        let n = inputs.hidden_preferences.len();
        out.push(Insight {
            kind: InsightKind::HiddenPreference,
            title: format!("{n} subjects approve on substance yet refuse support"),
            description: format!(
                "e.g. {}: \"{}\"",
                inputs.hidden_preferences[0].subject_id, inputs.hidden_preferences[0].quote,
            ),
            relevance: if n >= 3 { Relevance::High } else { Relevance::Medium },
            support: n,
        });
    }

    if !inputs.rupture_points.is_empty() {
        let n = inputs.rupture_points.len();
        out.push(Insight {
            kind: InsightKind::RupturePoint,
            title: format!("{n} subjects signalled a hard limit"),
            description: format!(
                "e.g. {} ({}): \"{}\"",
                inputs.rupture_points[0].subject_id,
                inputs.rupture_points[0].trigger,
                inputs.rupture_points[0].quote,
            ),
            relevance: Relevance::High,
            support: n,
        });
    }

    if let Computed::Value(found) = inputs.outliers {
        if !found.is_empty() {
            out.push(Insight {
                kind: InsightKind::DataQuality,
                title: format!("{} anomalous responses", found.len()),
                description: "Responses with unusual latency or degenerate length; \
                              review before trusting aggregates"
                    .to_string(),
                relevance: Relevance::Low,
                support: found.len(),
            });
        }
    }

    out.sort_by(|a, b| b.relevance.cmp(&a.relevance).then_with(|| a.title.cmp(&b.title)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_inputs<'a>(
        sentiment: &'a SentimentSummary,
        outliers: &'a Computed<Vec<Outlier>>,
    ) -> InsightInputs<'a> {
        InsightInputs {
            sentiment,
            themes: &[],
            correlations: &[],
            hidden_preferences: &[],
            rupture_points: &[],
            outliers,
        }
    }

    #[test]
    fn negative_climate_outranks_data_quality() {
        let sentiment = SentimentSummary {
            mean_score: -0.6,
            positive: 1,
            negative: 8,
            neutral: 1,
        };
        let outliers = Computed::Value(vec![Outlier {
            subject_id: "s1".into(),
            question_id: 1,
            kind: crate::outliers::OutlierKind::TextTooShort,
            measure: 3.0,
        }]);
        let insights = synthesize(&empty_inputs(&sentiment, &outliers));
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].kind, InsightKind::SentimentClimate);
        assert_eq!(insights[0].relevance, Relevance::High);
        assert_eq!(insights[1].kind, InsightKind::DataQuality);
    }

    #[test]
    fn same_inputs_same_output() {
        let sentiment = SentimentSummary {
            mean_score: 0.4,
            positive: 5,
            negative: 1,
            neutral: 2,
        };
        let outliers = Computed::InsufficientData { needed: 10, got: 3 };
        let a = synthesize(&empty_inputs(&sentiment, &outliers));
        let b = synthesize(&empty_inputs(&sentiment, &outliers));
        assert_eq!(serde_json::to_value(&a).ok(), serde_json::to_value(&b).ok());
    }

    #[test]
    fn weak_correlations_are_dropped() {
        let sentiment = SentimentSummary {
            mean_score: 0.0,
            positive: 0,
            negative: 0,
            neutral: 0,
        };
        let outliers = Computed::InsufficientData { needed: 10, got: 0 };
        let correlations = vec![(
            "sentiment".to_string(),
            "latency_ms".to_string(),
            Correlation {
                r: 0.1,
                n: 40,
                strength: Strength::Weak,
                p_approx: 0.6,
            },
        )];
        let mut inputs = empty_inputs(&sentiment, &outliers);
        inputs.correlations = &correlations;
        assert!(synthesize(&inputs).is_empty());
    }
}
