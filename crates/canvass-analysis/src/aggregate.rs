use crate::correlation::{self, CorrelationOutcome, Variable};
use crate::descriptive::Computed;
use crate::outliers::{self, Outlier};
use crate::sentiment::{self, SentimentSummary};
use crate::AnalysisError;
use canvass_core::config::AnalysisSettings;
use canvass_core::model::Response;
use canvass_core::providers::ProfileStore;
use canvass_core::storage::Store;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrendPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl TrendPeriod {
    pub fn parse(s: &str) -> Option<TrendPeriod> {
        match s {
            "daily" => Some(TrendPeriod::Daily),
            "weekly" => Some(TrendPeriod::Weekly),
            "monthly" => Some(TrendPeriod::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationCell {
    pub x: String,
    pub y: String,
    pub outcome: CorrelationOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub variables: Vec<String>,
    pub cells: Vec<CorrelationCell>,
    /// Pairs whose |r| clears the notable cutoff.
    pub notable: Vec<CorrelationCell>,
    pub responses: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendBucket {
    /// Bucket start date, ISO (first day of week/month for coarser periods).
    pub bucket: String,
    pub volume: usize,
    pub mean_sentiment: f64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub period: TrendPeriod,
    pub buckets: Vec<TrendBucket>,
    /// Percent change in volume between the first and last bucket, when
    /// there are at least two.
    pub volume_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileGroup {
    pub value: String,
    pub subjects: usize,
    pub responses: usize,
    pub sentiment: SentimentSummary,
    pub mean_intensity: f64,
    pub would_switch_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CumulativeInsights {
    pub surveys: usize,
    pub responses: usize,
    pub subjects: usize,
    pub dominant_sentiment: String,
    pub mean_sentiment: f64,
    /// Share of responses whose model signals marked the subject as
    /// willing to switch allegiance.
    pub persuasion_rate: f64,
    pub total_cost_usd: f64,
    pub cost_per_subject_usd: f64,
    pub notable_correlations: Vec<CorrelationCell>,
}

/// Cross-survey reads. Every method pulls the corpus (or a survey subset)
/// fresh from the store; nothing is cached between calls.
pub struct Aggregator {
    store: Store,
    profiles: Arc<dyn ProfileStore>,
    settings: AnalysisSettings,
}

impl Aggregator {
    pub fn new(store: Store, profiles: Arc<dyn ProfileStore>, settings: AnalysisSettings) -> Self {
        Self {
            store,
            profiles,
            settings,
        }
    }

    fn corpus(&self, survey_ids: Option<&[i64]>) -> Result<Vec<Response>, AnalysisError> {
        let responses = self.store.all_responses(survey_ids)?;
        if responses.is_empty() {
            return Err(AnalysisError::NoResponses);
        }
        Ok(responses)
    }

    /// Pearson r for every distinct variable pair over the selected corpus.
    pub fn global_correlations(
        &self,
        variables: Option<&[Variable]>,
        survey_ids: Option<&[i64]>,
    ) -> Result<CorrelationMatrix, AnalysisError> {
        let responses = self.corpus(survey_ids)?;
        let variables: Vec<Variable> = match variables {
            Some(v) => v.to_vec(),
            None => Variable::ALL.to_vec(),
        };

        let mut cells = Vec::new();
        let mut notable = Vec::new();
        for i in 0..variables.len() {
            for j in (i + 1)..variables.len() {
                let (x, y) = (variables[i], variables[j]);
                let mut xs = Vec::new();
                let mut ys = Vec::new();
                for r in &responses {
                    if let (Some(xv), Some(yv)) = (x.extract(r), y.extract(r)) {
                        xs.push(xv);
                        ys.push(yv);
                    }
                }
                let outcome = correlation::pearson(&xs, &ys, &self.settings);
                let cell = CorrelationCell {
                    x: x.name().to_string(),
                    y: y.name().to_string(),
                    outcome,
                };
                if let CorrelationOutcome::Correlated(c) = &cell.outcome {
                    if c.r.abs() > self.settings.correlation_notable_r {
                        notable.push(cell.clone());
                    }
                }
                cells.push(cell);
            }
        }

        Ok(CorrelationMatrix {
            variables: variables.iter().map(|v| v.name().to_string()).collect(),
            cells,
            notable,
            responses: responses.len(),
        })
    }

    /// Volume, mean lexicon sentiment and spend per time bucket, oldest
    /// first. Responses with unparseable timestamps are skipped with a warn.
    pub fn identify_trends(
        &self,
        period: TrendPeriod,
        survey_ids: Option<&[i64]>,
    ) -> Result<TrendReport, AnalysisError> {
        let responses = self.corpus(survey_ids)?;

        let mut buckets: BTreeMap<NaiveDate, (usize, f64, f64)> = BTreeMap::new();
        for r in &responses {
            let ts = match DateTime::parse_from_rfc3339(&r.created_at) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(err) => {
                    tracing::warn!(subject = %r.subject_id, %err, "skipping response with bad timestamp");
                    continue;
                }
            };
            let key = bucket_start(ts.date_naive(), period);
            let entry = buckets.entry(key).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += sentiment::score_text(&r.text, &self.settings).score;
            entry.2 += r.cost_usd;
        }

        let buckets: Vec<TrendBucket> = buckets
            .into_iter()
            .map(|(date, (volume, sentiment_sum, cost))| TrendBucket {
                bucket: date.to_string(),
                volume,
                mean_sentiment: sentiment_sum / volume as f64,
                cost_usd: cost,
            })
            .collect();

        let volume_change_pct = match (buckets.first(), buckets.last()) {
            (Some(first), Some(last)) if buckets.len() >= 2 && first.volume > 0 => Some(
                (last.volume as f64 - first.volume as f64) / first.volume as f64 * 100.0,
            ),
            _ => None,
        };

        Ok(TrendReport {
            period,
            buckets,
            volume_change_pct,
        })
    }

    /// Groups the corpus by one profile attribute. Subjects whose profile
    /// lacks the attribute land in an "unknown" group.
    pub async fn group_by_profile(
        &self,
        attribute: &str,
        survey_ids: Option<&[i64]>,
    ) -> Result<Vec<ProfileGroup>, AnalysisError> {
        let responses = self.corpus(survey_ids)?;
        let subject_ids: Vec<String> = {
            let mut seen = HashSet::new();
            responses
                .iter()
                .filter(|r| seen.insert(r.subject_id.clone()))
                .map(|r| r.subject_id.clone())
                .collect()
        };
        let profiles = self.profiles.resolve(&subject_ids).await?;

        let mut grouped: BTreeMap<String, Vec<&Response>> = BTreeMap::new();
        for r in &responses {
            let value = profiles
                .get(&r.subject_id)
                .and_then(|p| p.attributes.get(attribute))
                .map(attribute_label)
                .unwrap_or_else(|| "unknown".to_string());
            grouped.entry(value).or_default().push(r);
        }

        let mut groups = Vec::new();
        for (value, members) in grouped {
            let subjects = members
                .iter()
                .map(|r| r.subject_id.as_str())
                .collect::<HashSet<_>>()
                .len();
            let sentiment =
                sentiment::summarize(members.iter().map(|r| r.text.as_str()), &self.settings);
            let mean_intensity =
                members.iter().map(|r| r.signals.intensity).sum::<f64>() / members.len() as f64;
            let switchers = members.iter().filter(|r| r.signals.would_switch).count();
            groups.push(ProfileGroup {
                value,
                subjects,
                responses: members.len(),
                sentiment,
                mean_intensity,
                would_switch_rate: switchers as f64 / members.len() as f64,
            });
        }
        groups.sort_by(|a, b| b.responses.cmp(&a.responses).then_with(|| a.value.cmp(&b.value)));
        Ok(groups)
    }

    /// Latency and length anomalies, system-wide when no survey is given.
    pub fn detect_outliers(
        &self,
        survey_id: Option<i64>,
    ) -> Result<Computed<Vec<Outlier>>, AnalysisError> {
        let ids = survey_id.map(|id| vec![id]);
        let responses = self.corpus(ids.as_deref())?;
        Ok(outliers::detect(&responses, &self.settings))
    }

    /// Corpus-wide headline numbers. At most `limit` notable correlations
    /// are returned, strongest first.
    pub fn cumulative_insights(&self, limit: usize) -> Result<CumulativeInsights, AnalysisError> {
        let responses = self.corpus(None)?;
        let surveys = self.store.list_surveys()?.len();

        let subjects = responses
            .iter()
            .map(|r| r.subject_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let summary =
            sentiment::summarize(responses.iter().map(|r| r.text.as_str()), &self.settings);
        let switchers = responses.iter().filter(|r| r.signals.would_switch).count();
        let total_cost: f64 = responses.iter().map(|r| r.cost_usd).sum();

        let mut notable = self.global_correlations(None, None)?.notable;
        notable.sort_by(|a, b| {
            let ra = match &a.outcome {
                CorrelationOutcome::Correlated(c) => c.r.abs(),
                CorrelationOutcome::NoCorrelation { .. } => 0.0,
            };
            let rb = match &b.outcome {
                CorrelationOutcome::Correlated(c) => c.r.abs(),
                CorrelationOutcome::NoCorrelation { .. } => 0.0,
            };
            rb.total_cmp(&ra)
        });
        notable.truncate(limit);

        Ok(CumulativeInsights {
            surveys,
            responses: responses.len(),
            subjects,
            dominant_sentiment: summary.dominant().label().to_string(),
            mean_sentiment: summary.mean_score,
            persuasion_rate: switchers as f64 / responses.len() as f64,
            total_cost_usd: total_cost,
            cost_per_subject_usd: if subjects > 0 {
                total_cost / subjects as f64
            } else {
                0.0
            },
            notable_correlations: notable,
        })
    }
}

fn bucket_start(date: NaiveDate, period: TrendPeriod) -> NaiveDate {
    match period {
        TrendPeriod::Daily => date,
        TrendPeriod::Weekly => {
            date - chrono::Days::new(date.weekday().num_days_from_monday() as u64)
        }
        TrendPeriod::Monthly => date.with_day(1).unwrap_or(date),
    }
}

fn attribute_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
