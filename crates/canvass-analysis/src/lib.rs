//! Descriptive and exploratory analysis over persisted interview
//! responses, plus cross-survey aggregation.

pub mod aggregate;
pub mod correlation;
pub mod descriptive;
pub mod detectors;
pub mod insights;
pub mod outliers;
pub mod sentiment;
pub mod themes;

use canvass_core::config::AnalysisSettings;
use canvass_core::model::AnalysisRecord;
use canvass_core::providers::ProfileStore;
use canvass_core::storage::{ResponseFilter, Store};
use correlation::{CorrelationOutcome, Variable};
use descriptive::{Computed, DescriptiveStats};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("survey {0} not found")]
    SurveyNotFound(i64),
    #[error("no responses recorded yet")]
    NoResponses,
    #[error("persistence failure")]
    Persistence(#[source] anyhow::Error),
}

impl From<anyhow::Error> for AnalysisError {
    fn from(e: anyhow::Error) -> Self {
        AnalysisError::Persistence(e)
    }
}

/// Per-question descriptive block inside a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub question: String,
    pub responses: usize,
    pub stats: Computed<DescriptiveStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub x: String,
    pub y: String,
    pub outcome: CorrelationOutcome,
}

/// Everything one analysis version records. Serialized to JSON and stored
/// immutably; later schema additions must stay backward-readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub survey_id: i64,
    pub responses: usize,
    pub subjects: usize,
    pub question_stats: Vec<QuestionStats>,
    pub correlations: Vec<CorrelationEntry>,
    pub sentiment: sentiment::SentimentSummary,
    pub themes: Vec<themes::ThemeSummary>,
    pub outliers: Computed<Vec<outliers::Outlier>>,
    pub hidden_preferences: Vec<detectors::HiddenPreference>,
    pub rupture_points: Vec<detectors::RupturePoint>,
    pub insights: Vec<insights::Insight>,
}

/// Builds one immutable analysis version per invocation. Safe to run while
/// the survey is still collecting; the version captures whatever responses
/// exist at read time.
pub struct Analyzer {
    store: Store,
    profiles: Arc<dyn ProfileStore>,
    settings: AnalysisSettings,
}

impl Analyzer {
    pub fn new(store: Store, profiles: Arc<dyn ProfileStore>, settings: AnalysisSettings) -> Self {
        Self {
            store,
            profiles,
            settings,
        }
    }

    pub async fn analyze(&self, survey_id: i64) -> Result<AnalysisRecord, AnalysisError> {
        let survey = self
            .store
            .fetch_survey(survey_id)?
            .ok_or(AnalysisError::SurveyNotFound(survey_id))?;

        let responses = self
            .store
            .query_responses(survey_id, &ResponseFilter::default())?;
        if responses.is_empty() {
            return Err(AnalysisError::NoResponses);
        }

        let questions = self.store.fetch_questions(survey_id)?;

        let mut question_stats = Vec::new();
        for q in &questions {
            if !q.qtype.is_numeric() {
                continue;
            }
            let values: Vec<f64> = responses
                .iter()
                .filter(|r| r.question_id == q.id)
                .filter_map(|r| Variable::ScaleValue.extract(r))
                .collect();
            question_stats.push(QuestionStats {
                question_id: q.id,
                question: q.text.clone(),
                responses: values.len(),
                stats: descriptive::describe(&values),
            });
        }

        let mut correlations = Vec::new();
        for i in 0..Variable::ALL.len() {
            for j in (i + 1)..Variable::ALL.len() {
                let (x, y) = (Variable::ALL[i], Variable::ALL[j]);
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                for r in &responses {
                    if let (Some(xv), Some(yv)) = (x.extract(r), y.extract(r)) {
                        xs.push(xv);
                        ys.push(yv);
                    }
                }
                correlations.push(CorrelationEntry {
                    x: x.name().to_string(),
                    y: y.name().to_string(),
                    outcome: correlation::pearson(&xs, &ys, &self.settings),
                });
            }
        }

        let sentiment_summary =
            sentiment::summarize(responses.iter().map(|r| r.text.as_str()), &self.settings);
        let theme_summaries = themes::extract(&responses, &self.settings);
        let outlier_report = outliers::detect(&responses, &self.settings);
        let hidden = detectors::hidden_preferences(&responses, &self.settings);

        let subject_ids: Vec<String> = {
            let mut seen = HashSet::new();
            responses
                .iter()
                .filter(|r| seen.insert(r.subject_id.clone()))
                .map(|r| r.subject_id.clone())
                .collect()
        };
        let profiles = self.profiles.resolve(&subject_ids).await?;
        let ruptures = detectors::rupture_points(&responses, &profiles, &self.settings);

        let notable: Vec<(String, String, correlation::Correlation)> = correlations
            .iter()
            .filter_map(|e| match &e.outcome {
                CorrelationOutcome::Correlated(c) => {
                    Some((e.x.clone(), e.y.clone(), c.clone()))
                }
                CorrelationOutcome::NoCorrelation { .. } => None,
            })
            .collect();
        let synthesized = insights::synthesize(&insights::InsightInputs {
            sentiment: &sentiment_summary,
            themes: &theme_summaries,
            correlations: &notable,
            hidden_preferences: &hidden,
            rupture_points: &ruptures,
            outliers: &outlier_report,
        });

        let payload = AnalysisPayload {
            survey_id,
            responses: responses.len(),
            subjects: subject_ids.len(),
            question_stats,
            correlations,
            sentiment: sentiment_summary,
            themes: theme_summaries,
            outliers: outlier_report,
            hidden_preferences: hidden,
            rupture_points: ruptures,
            insights: synthesized,
        };

        let value = serde_json::to_value(&payload)
            .map_err(|e| AnalysisError::Persistence(e.into()))?;
        let record = self.store.insert_analysis(survey_id, &value)?;
        tracing::info!(
            survey = %survey.title,
            version = record.version,
            responses = payload.responses,
            insights = payload.insights.len(),
            "analysis recorded"
        );
        Ok(record)
    }
}
