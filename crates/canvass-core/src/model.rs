use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl SurveyStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "draft" => SurveyStatus::Draft,
            "running" => SurveyStatus::Running,
            "paused" => SurveyStatus::Paused,
            "completed" => SurveyStatus::Completed,
            "cancelled" => SurveyStatus::Cancelled,
            "failed" => SurveyStatus::Failed,
            _ => SurveyStatus::Failed, // Default fallback
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyStatus::Draft => "draft",
            SurveyStatus::Running => "running",
            SurveyStatus::Paused => "paused",
            SurveyStatus::Completed => "completed",
            SurveyStatus::Cancelled => "cancelled",
            SurveyStatus::Failed => "failed",
        }
    }

    /// Terminal states are sinks: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SurveyStatus::Completed | SurveyStatus::Cancelled | SurveyStatus::Failed
        )
    }

    /// Legal transitions: draft->running, running<->paused,
    /// running->{completed, cancelled, failed}.
    pub fn can_transition_to(&self, next: SurveyStatus) -> bool {
        use SurveyStatus::*;
        matches!(
            (self, next),
            (Draft, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Paused, Cancelled)
                | (Paused, Failed)
        )
    }
}

impl std::fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    pub id: i64,
    pub title: String,
    pub status: SurveyStatus,
    pub cost_ceiling_usd: f64,
    /// 0..=100, non-decreasing while a run is active.
    pub progress: f64,
    pub total_cost_usd: f64,
    pub total_tokens: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Open,
    Scale,
    SingleChoice,
    MultiChoice,
    Boolean,
    Ranking,
}

impl QuestionType {
    pub fn parse(s: &str) -> Self {
        match s {
            "open" => QuestionType::Open,
            "scale" => QuestionType::Scale,
            "single_choice" => QuestionType::SingleChoice,
            "multi_choice" => QuestionType::MultiChoice,
            "boolean" => QuestionType::Boolean,
            "ranking" => QuestionType::Ranking,
            _ => QuestionType::Open,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Open => "open",
            QuestionType::Scale => "scale",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multi_choice",
            QuestionType::Boolean => "boolean",
            QuestionType::Ranking => "ranking",
        }
    }

    /// Question kinds whose structured value is numeric enough for
    /// descriptive statistics. Booleans enter as 0/1.
    pub fn is_numeric(&self) -> bool {
        matches!(self, QuestionType::Scale | QuestionType::Boolean)
    }

    pub fn needs_options(&self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice | QuestionType::MultiChoice | QuestionType::Ranking
        )
    }
}

/// Immutable once the owning survey leaves draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub survey_id: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    pub order_index: i64,
}

/// A subject as resolved by the external profile store. The survey itself
/// only holds (id, display_name) denormalized rows; attributes are never
/// copied into survey state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// The denormalized subject reference stored with a survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_id: String,
    pub display_name: String,
}

/// Signals derived by the model service. Every field is untrusted input
/// copied verbatim into the response row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponseSignals {
    #[serde(default)]
    pub sentiment: f64,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default)]
    pub would_switch: bool,
    #[serde(default)]
    pub fear: bool,
}

/// One interview answer. At most one exists per
/// (survey_id, question_id, subject_id); written only by the engine and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub survey_id: i64,
    pub question_id: i64,
    pub subject_id: String,
    pub text: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub signals: ResponseSignals,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub created_at: String,
}

/// What the model service returns for a single invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelReply {
    pub text: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub signals: ResponseSignals,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// One immutable analysis version for a survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub survey_id: i64,
    pub version: i64,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Outcome of one model invocation inside a batch. Failures are data, not
/// errors: they are logged, counted as gaps, and never abort the batch.
#[derive(Debug)]
pub struct CallOutcome {
    pub subject_id: String,
    pub result: Result<ModelReply, String>,
}

/// Fan-in result of one batch: committed responses vs recorded gaps, plus
/// the batch's share of spend.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub attempted: usize,
    pub written: usize,
    /// Subject ids whose calls failed; gaps, not errors.
    pub failures: Vec<String>,
    pub cost_usd: f64,
    pub tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub survey_id: i64,
    pub status: SurveyStatus,
    pub attempted: u64,
    pub responses_written: u64,
    pub failed_calls: u64,
    pub total_cost_usd: f64,
    pub total_tokens: i64,
    pub elapsed_ms: u64,
}

/// Snapshot of a survey's progress for callers polling an active run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub survey_id: i64,
    pub status: SurveyStatus,
    pub percent: f64,
    pub responses: u64,
    pub total_units: u64,
    pub cost_so_far_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            SurveyStatus::Draft,
            SurveyStatus::Running,
            SurveyStatus::Paused,
            SurveyStatus::Completed,
            SurveyStatus::Cancelled,
            SurveyStatus::Failed,
        ] {
            assert_eq!(SurveyStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [
            SurveyStatus::Completed,
            SurveyStatus::Cancelled,
            SurveyStatus::Failed,
        ] {
            for next in [
                SurveyStatus::Draft,
                SurveyStatus::Running,
                SurveyStatus::Paused,
                SurveyStatus::Completed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn draft_only_starts() {
        assert!(SurveyStatus::Draft.can_transition_to(SurveyStatus::Running));
        assert!(!SurveyStatus::Draft.can_transition_to(SurveyStatus::Completed));
        assert!(SurveyStatus::Running.can_transition_to(SurveyStatus::Paused));
        assert!(SurveyStatus::Paused.can_transition_to(SurveyStatus::Running));
    }
}
