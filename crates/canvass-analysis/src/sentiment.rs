use canvass_core::config::AnalysisSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBucket {
    Positive,
    Negative,
    Neutral,
}

impl SentimentBucket {
    pub fn label(&self) -> &'static str {
        match self {
            SentimentBucket::Positive => "positive",
            SentimentBucket::Negative => "negative",
            SentimentBucket::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentScore {
    /// (positive - negative) / max(total markers, 1), in [-1, 1].
    pub score: f64,
    pub bucket: SentimentBucket,
    pub positive_hits: usize,
    pub negative_hits: usize,
}

/// Lexicon-count polarity. Marker lists and the bucket threshold come from
/// settings; matching is case-insensitive substring counting.
pub fn score_text(text: &str, settings: &AnalysisSettings) -> SentimentScore {
    let lowered = text.to_lowercase();
    let positive_hits = count_markers(&lowered, &settings.positive_markers);
    let negative_hits = count_markers(&lowered, &settings.negative_markers);

    let total = positive_hits + negative_hits;
    let score = (positive_hits as f64 - negative_hits as f64) / (total.max(1) as f64);

    let bucket = if score > settings.sentiment_threshold {
        SentimentBucket::Positive
    } else if score < -settings.sentiment_threshold {
        SentimentBucket::Negative
    } else {
        SentimentBucket::Neutral
    };

    SentimentScore {
        score,
        bucket,
        positive_hits,
        negative_hits,
    }
}

fn count_markers(lowered: &str, markers: &[String]) -> usize {
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| lowered.matches(m.to_lowercase().as_str()).count())
        .sum()
}

/// Mean score and bucket counts over a set of texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SentimentSummary {
    pub mean_score: f64,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentSummary {
    pub fn dominant(&self) -> SentimentBucket {
        if self.positive >= self.negative && self.positive >= self.neutral {
            SentimentBucket::Positive
        } else if self.negative >= self.neutral {
            SentimentBucket::Negative
        } else {
            SentimentBucket::Neutral
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative + self.neutral
    }
}

pub fn summarize<'a, I: IntoIterator<Item = &'a str>>(
    texts: I,
    settings: &AnalysisSettings,
) -> SentimentSummary {
    let mut summary = SentimentSummary::default();
    let mut sum = 0.0;
    let mut n = 0usize;
    for text in texts {
        let s = score_text(text, settings);
        sum += s.score;
        n += 1;
        match s.bucket {
            SentimentBucket::Positive => summary.positive += 1,
            SentimentBucket::Negative => summary.negative += 1,
            SentimentBucket::Neutral => summary.neutral += 1,
        }
    }
    summary.mean_score = if n > 0 { sum / n as f64 } else { 0.0 };
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AnalysisSettings {
        AnalysisSettings::default()
    }

    #[test]
    fn three_positive_markers_score_plus_one() {
        let s = score_text("Things are good, I support this and I agree.", &settings());
        assert_eq!(s.positive_hits, 3);
        assert_eq!(s.negative_hits, 0);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.bucket, SentimentBucket::Positive);
    }

    #[test]
    fn no_markers_is_neutral_zero() {
        let s = score_text("The weather exists.", &settings());
        assert_eq!(s.score, 0.0);
        assert_eq!(s.bucket, SentimentBucket::Neutral);
    }

    #[test]
    fn mixed_markers_land_in_the_neutral_band() {
        // 2 positive, 2 negative -> score 0.
        let s = score_text("It is good and I agree, but prices are bad and I fear worse.", &settings());
        assert!(s.positive_hits >= 2);
        assert!(s.negative_hits >= 2);
        assert_eq!(s.bucket, SentimentBucket::Neutral);
    }

    #[test]
    fn negative_markers_dominate() {
        let s = score_text("Everything got worse, I am angry and afraid.", &settings());
        assert_eq!(s.bucket, SentimentBucket::Negative);
        assert!(s.score < -0.2);
    }

    #[test]
    fn summary_counts_buckets() {
        let texts = ["good good good", "bad bad", "nothing here"];
        let sum = summarize(texts, &settings());
        assert_eq!(sum.positive, 1);
        assert_eq!(sum.negative, 1);
        assert_eq!(sum.neutral, 1);
        assert_eq!(sum.total(), 3);
    }
}
