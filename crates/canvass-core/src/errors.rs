use crate::model::SurveyStatus;
use thiserror::Error;

/// Run-fatal error kinds. Per-call failures are not here: they are recorded
/// as gaps in the batch report and never escape their batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid survey definition: {0}")]
    Validation(String),

    #[error("survey {0} already has an active run")]
    AlreadyRunning(i64),

    #[error("survey {0} not found")]
    SurveyNotFound(i64),

    #[error("survey {id} is {status} and cannot be started")]
    NotStartable { id: i64, status: SurveyStatus },

    #[error("run cancelled at batch boundary")]
    Cancelled,

    #[error("cost ceiling ${ceiling:.2} reached (spent ${spent:.4})")]
    CostLimitExceeded { ceiling: f64, spent: f64 },

    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Persistence(e)
    }
}

impl EngineError {
    /// Terminal survey status the run should be left in when this error
    /// ends it. Committed responses are retained in every case.
    pub fn terminal_status(&self) -> Option<SurveyStatus> {
        match self {
            EngineError::Cancelled => Some(SurveyStatus::Cancelled),
            EngineError::CostLimitExceeded { .. } | EngineError::Persistence(_) => {
                Some(SurveyStatus::Failed)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_cancelled_status() {
        assert_eq!(
            EngineError::Cancelled.terminal_status(),
            Some(SurveyStatus::Cancelled)
        );
    }

    #[test]
    fn cost_limit_maps_to_failed_status() {
        let e = EngineError::CostLimitExceeded {
            ceiling: 0.05,
            spent: 0.06,
        };
        assert_eq!(e.terminal_status(), Some(SurveyStatus::Failed));
        assert!(e.to_string().contains("$0.05"));
    }

    #[test]
    fn pre_run_errors_have_no_terminal_status() {
        assert!(EngineError::AlreadyRunning(1).terminal_status().is_none());
        assert!(EngineError::Validation("no questions".into())
            .terminal_status()
            .is_none());
    }
}
