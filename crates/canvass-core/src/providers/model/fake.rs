use super::ModelClient;
use crate::model::{ModelReply, Question, QuestionType, ResponseSignals, SubjectProfile};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Duration;

/// Deterministic model client for tests and the demo provider. Replies are
/// a pure function of (subject id, question id); failures and per-call cost
/// are scriptable.
pub struct FakeModelClient {
    pub cost_per_call: f64,
    pub latency_ms: u64,
    pub tokens_per_call: i64,
    /// Real wall-clock delay per call, for exercising pause/cancel timing.
    pub call_delay: Option<Duration>,
    /// Subject ids whose calls always fail.
    pub fail_subjects: HashSet<String>,
    calls: AtomicU64,
}

impl Default for FakeModelClient {
    fn default() -> Self {
        Self {
            cost_per_call: 0.001,
            latency_ms: 120,
            tokens_per_call: 40,
            call_delay: None,
            fail_subjects: HashSet::new(),
            calls: AtomicU64::new(0),
        }
    }
}

impl FakeModelClient {
    pub fn with_cost(cost_per_call: f64) -> Self {
        Self {
            cost_per_call,
            ..Default::default()
        }
    }

    pub fn failing_for<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            fail_subjects: ids.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Adds real wall-clock latency per call, for pause/cancel timing tests.
    pub fn with_delay(call_delay: Duration) -> Self {
        Self {
            call_delay: Some(call_delay),
            ..Default::default()
        }
    }

    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn seed(profile: &SubjectProfile, question: &Question) -> u64 {
        let mut acc = question.id as u64;
        for b in profile.id.bytes() {
            acc = acc.wrapping_mul(31).wrapping_add(b as u64);
        }
        acc
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn invoke(
        &self,
        profile: &SubjectProfile,
        question: &Question,
    ) -> anyhow::Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.call_delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_subjects.contains(&profile.id) {
            anyhow::bail!("simulated model failure for subject {}", profile.id);
        }

        let seed = Self::seed(profile, question);
        let value = match question.qtype {
            QuestionType::Scale => serde_json::json!(seed % 10 + 1),
            QuestionType::Boolean => serde_json::json!(seed % 2 == 0),
            QuestionType::SingleChoice => {
                let opts = &question.options;
                if opts.is_empty() {
                    serde_json::Value::Null
                } else {
                    serde_json::json!(opts[(seed as usize) % opts.len()])
                }
            }
            _ => serde_json::Value::Null,
        };

        let sentiment = ((seed % 21) as f64 - 10.0) / 10.0;
        Ok(ModelReply {
            text: format!(
                "As {}, regarding \"{}\": my honest answer is {}.",
                profile.display_name,
                question.text,
                value
            ),
            value,
            signals: ResponseSignals {
                sentiment,
                intensity: (seed % 11) as f64 / 10.0,
                would_switch: seed % 3 == 0,
                fear: seed % 7 == 0,
            },
            tokens_in: self.tokens_per_call,
            tokens_out: self.tokens_per_call,
            cost_usd: self.cost_per_call,
            latency_ms: self.latency_ms,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
