use crate::config::EngineSettings;
use crate::engine::control::{ControlRegistry, RunControl};
use crate::errors::EngineError;
use crate::model::{
    BatchReport, CallOutcome, ModelReply, ProgressReport, Question, Response, RunSummary,
    SubjectProfile, SubjectRef, SurveyStatus,
};
use crate::providers::model::ModelClient;
use crate::providers::profile::ProfileStore;
use crate::storage::store::{now_rfc3339, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// Drives one survey to completion in bounded concurrent batches. One engine
/// may serve many surveys; each survey has at most one active run, enforced
/// by the control registry.
pub struct Engine {
    pub store: Store,
    pub profiles: Arc<dyn ProfileStore>,
    pub client: Arc<dyn ModelClient>,
    pub settings: EngineSettings,
    pub controls: ControlRegistry,
}

impl Engine {
    pub fn new(
        store: Store,
        profiles: Arc<dyn ProfileStore>,
        client: Arc<dyn ModelClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            profiles,
            client,
            settings,
            controls: ControlRegistry::new(),
        }
    }

    /// Run a draft or paused survey to a terminal (or paused-out) state.
    /// Responses committed before a failure are always retained.
    pub async fn start(&self, survey_id: i64) -> Result<RunSummary, EngineError> {
        let survey = self
            .store
            .fetch_survey(survey_id)?
            .ok_or(EngineError::SurveyNotFound(survey_id))?;

        match survey.status {
            SurveyStatus::Draft | SurveyStatus::Paused => {}
            SurveyStatus::Running => return Err(EngineError::AlreadyRunning(survey_id)),
            status => return Err(EngineError::NotStartable { id: survey_id, status }),
        }

        let control = self.controls.register(survey_id)?;
        let result = self.run_registered(survey_id, &survey.title, control).await;
        self.controls.remove(survey_id);

        match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if let Some(status) = e.terminal_status() {
                    // Best-effort terminal status; the original error wins.
                    if let Err(se) = self.store.update_status(survey_id, status) {
                        tracing::error!(survey_id, error = %se, "failed to record terminal status");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_registered(
        &self,
        survey_id: i64,
        title: &str,
        control: Arc<RunControl>,
    ) -> Result<RunSummary, EngineError> {
        let started = std::time::Instant::now();

        // Refuse before the draft -> running transition; a survey with
        // nothing to do must stay startable, not get stuck in running.
        let questions = self.store.fetch_questions(survey_id)?;
        let subjects = self.store.fetch_subject_refs(survey_id)?;
        let total_units = (questions.len() * subjects.len()) as u64;
        if total_units == 0 {
            return Err(EngineError::Validation(
                "survey has no work units (questions x subjects is zero)".into(),
            ));
        }

        self.store.update_status(survey_id, SurveyStatus::Running)?;

        let ids: Vec<String> = subjects.iter().map(|s| s.subject_id.clone()).collect();
        let profiles = self.profiles.resolve(&ids).await?;

        let survey = self
            .store
            .fetch_survey(survey_id)?
            .ok_or(EngineError::SurveyNotFound(survey_id))?;
        let ceiling = survey.cost_ceiling_usd;
        let mut total_cost = survey.total_cost_usd;
        let mut total_tokens = survey.total_tokens;
        let mut cost_warned = total_cost >= self.settings.cost_warn_fraction * ceiling;

        // After a restart the only trustworthy progress baseline is the
        // response count; gaps from failed calls are re-attempted.
        let mut attempted = self.store.count_responses(survey_id, None)?;
        let mut written: u64 = 0;
        let mut failed_calls: u64 = 0;

        tracing::info!(
            survey_id,
            title,
            total_units,
            resumed_from = attempted,
            provider = self.client.provider_name(),
            "survey run starting"
        );

        for question in &questions {
            let answered = self.store.answered_subjects(survey_id, question.id)?;

            for chunk in subjects.chunks(self.settings.batch_size) {
                if control.is_cancelled() {
                    self.flush_progress(survey_id, attempted, total_units, total_cost, total_tokens)?;
                    return Err(EngineError::Cancelled);
                }

                if control.is_paused() {
                    self.hold_while_paused(survey_id, &control).await?;
                    if control.is_cancelled() {
                        self.flush_progress(
                            survey_id, attempted, total_units, total_cost, total_tokens,
                        )?;
                        return Err(EngineError::Cancelled);
                    }
                }

                if !cost_warned && total_cost >= self.settings.cost_warn_fraction * ceiling {
                    cost_warned = true;
                    tracing::warn!(
                        survey_id,
                        spent = total_cost,
                        ceiling,
                        "cumulative cost passed {:.0}% of the ceiling",
                        self.settings.cost_warn_fraction * 100.0
                    );
                }
                if total_cost >= ceiling {
                    self.flush_progress(survey_id, attempted, total_units, total_cost, total_tokens)?;
                    return Err(EngineError::CostLimitExceeded {
                        ceiling,
                        spent: total_cost,
                    });
                }

                let to_run: Vec<&SubjectRef> = chunk
                    .iter()
                    .filter(|s| !answered.contains(&s.subject_id))
                    .collect();
                if to_run.is_empty() {
                    continue;
                }

                let report = self
                    .dispatch_batch(survey_id, question, &to_run, &profiles)
                    .await?;

                attempted += report.attempted as u64;
                written += report.written as u64;
                failed_calls += report.failures.len() as u64;
                total_cost += report.cost_usd;
                total_tokens += report.tokens;

                self.flush_progress(survey_id, attempted, total_units, total_cost, total_tokens)?;

                if self.settings.batch_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.settings.batch_delay_ms)).await;
                }
            }
        }

        self.store.update_status(survey_id, SurveyStatus::Completed)?;
        self.flush_progress(survey_id, attempted, total_units, total_cost, total_tokens)?;

        let summary = RunSummary {
            survey_id,
            status: SurveyStatus::Completed,
            attempted,
            responses_written: written,
            failed_calls,
            total_cost_usd: total_cost,
            total_tokens,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            survey_id,
            responses = summary.responses_written,
            failed = summary.failed_calls,
            cost = summary.total_cost_usd,
            elapsed_ms = summary.elapsed_ms,
            "survey run completed"
        );
        Ok(summary)
    }

    /// Fan out one model call per subject, fan in before returning. Each
    /// outcome carries its subject id, so attribution cannot drift even
    /// though completion order inside the batch is unspecified.
    async fn dispatch_batch(
        &self,
        survey_id: i64,
        question: &Question,
        batch: &[&SubjectRef],
        profiles: &HashMap<String, SubjectProfile>,
    ) -> Result<BatchReport, EngineError> {
        let call_timeout = Duration::from_secs(self.settings.timeout_seconds);
        let mut handles = Vec::with_capacity(batch.len());

        for subject in batch {
            let client = self.client.clone();
            let question = question.clone();
            let subject_id = subject.subject_id.clone();
            let profile = profiles
                .get(&subject.subject_id)
                .cloned()
                .unwrap_or_else(|| SubjectProfile {
                    id: subject.subject_id.clone(),
                    display_name: subject.display_name.clone(),
                    attributes: Default::default(),
                });

            handles.push(tokio::spawn(async move {
                let result = match timeout(call_timeout, client.invoke(&profile, &question)).await {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("model call timed out after {:?}", call_timeout)),
                };
                CallOutcome { subject_id, result }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for h in handles {
            match h.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // A panicked task is a gap like any other call failure,
                    // but we cannot attribute it without the outcome.
                    tracing::error!(survey_id, error = %e, "batch task join error");
                    outcomes.push(CallOutcome {
                        subject_id: "<unknown>".into(),
                        result: Err(format!("join error: {}", e)),
                    });
                }
            }
        }

        let mut report = BatchReport {
            attempted: outcomes.len(),
            ..Default::default()
        };
        let mut rows = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(reply) => {
                    report.cost_usd += reply.cost_usd;
                    report.tokens += reply.tokens_in + reply.tokens_out;
                    rows.push(to_response(survey_id, question.id, &outcome.subject_id, reply));
                }
                Err(msg) => {
                    tracing::warn!(
                        survey_id,
                        question_id = question.id,
                        subject_id = %outcome.subject_id,
                        error = %msg,
                        "model call failed; recorded as gap"
                    );
                    report.failures.push(outcome.subject_id);
                }
            }
        }

        report.written = self.store.append_batch(&rows)?;
        Ok(report)
    }

    async fn hold_while_paused(
        &self,
        survey_id: i64,
        control: &RunControl,
    ) -> Result<(), EngineError> {
        self.store.update_status(survey_id, SurveyStatus::Paused)?;
        tracing::info!(survey_id, "run paused at batch boundary");
        let bound = Duration::from_millis(self.settings.pause_poll_ms.max(1));
        while control.is_paused() && !control.is_cancelled() {
            control.wait_for_wake(bound).await;
        }
        if !control.is_cancelled() {
            self.store.update_status(survey_id, SurveyStatus::Running)?;
            tracing::info!(survey_id, "run resumed");
        }
        Ok(())
    }

    fn flush_progress(
        &self,
        survey_id: i64,
        attempted: u64,
        total_units: u64,
        total_cost: f64,
        total_tokens: i64,
    ) -> Result<(), EngineError> {
        let progress = (attempted as f64 / total_units as f64) * 100.0;
        self.store
            .update_progress(survey_id, progress.min(100.0), total_cost, total_tokens)?;
        Ok(())
    }

    pub fn pause(&self, survey_id: i64) -> bool {
        self.controls.pause(survey_id)
    }

    pub fn resume(&self, survey_id: i64) -> bool {
        self.controls.resume(survey_id)
    }

    pub fn cancel(&self, survey_id: i64) -> bool {
        self.controls.cancel(survey_id)
    }

    /// Progress snapshot from the store, valid whether or not a run is
    /// active in this process.
    pub fn progress(&self, survey_id: i64) -> Result<ProgressReport, EngineError> {
        let survey = self
            .store
            .fetch_survey(survey_id)?
            .ok_or(EngineError::SurveyNotFound(survey_id))?;
        let questions = self.store.fetch_questions(survey_id)?;
        let subjects = self.store.fetch_subject_refs(survey_id)?;
        let responses = self.store.count_responses(survey_id, None)?;
        Ok(ProgressReport {
            survey_id,
            status: survey.status,
            percent: survey.progress,
            responses,
            total_units: (questions.len() * subjects.len()) as u64,
            cost_so_far_usd: survey.total_cost_usd,
        })
    }
}

fn to_response(survey_id: i64, question_id: i64, subject_id: &str, reply: ModelReply) -> Response {
    Response {
        survey_id,
        question_id,
        subject_id: subject_id.to_string(),
        text: reply.text,
        value: reply.value,
        signals: reply.signals,
        tokens_in: reply.tokens_in,
        tokens_out: reply.tokens_out,
        cost_usd: reply.cost_usd,
        latency_ms: reply.latency_ms,
        created_at: now_rfc3339(),
    }
}
