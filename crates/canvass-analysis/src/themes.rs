use crate::sentiment;
use canvass_core::config::AnalysisSettings;
use canvass_core::model::Response;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeSummary {
    pub topic: String,
    pub count: usize,
    /// Fraction of responses tagged with this topic.
    pub share: f64,
    pub avg_sentiment: f64,
}

/// Topics whose keyword set matches the text. A response can carry any
/// number of topics.
pub fn tag_text<'a>(text: &str, settings: &'a AnalysisSettings) -> Vec<&'a str> {
    let lowered = text.to_lowercase();
    settings
        .theme_keywords
        .iter()
        .filter(|t| t.keywords.iter().any(|k| lowered.contains(k.to_lowercase().as_str())))
        .map(|t| t.topic.as_str())
        .collect()
}

/// Per-topic frequency and average lexicon sentiment over a response set.
/// Topics with no matches are omitted; output is ordered by count
/// descending, then topic name for determinism.
pub fn extract(responses: &[Response], settings: &AnalysisSettings) -> Vec<ThemeSummary> {
    let total = responses.len();
    if total == 0 {
        return Vec::new();
    }

    let mut summaries: Vec<ThemeSummary> = Vec::new();
    for theme in &settings.theme_keywords {
        let mut count = 0usize;
        let mut sentiment_sum = 0.0;
        for r in responses {
            let lowered = r.text.to_lowercase();
            if theme
                .keywords
                .iter()
                .any(|k| lowered.contains(k.to_lowercase().as_str()))
            {
                count += 1;
                sentiment_sum += sentiment::score_text(&r.text, settings).score;
            }
        }
        if count > 0 {
            summaries.push(ThemeSummary {
                topic: theme.topic.clone(),
                count,
                share: count as f64 / total as f64,
                avg_sentiment: sentiment_sum / count as f64,
            });
        }
    }

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.topic.cmp(&b.topic)));
    summaries
}
