use super::ModelClient;
use crate::model::{ModelReply, Question, QuestionType, ResponseSignals, SubjectProfile};
use async_trait::async_trait;
use serde_json::json;

/// Chat-completions-shaped client for the interview model service. Every
/// field of the reply is untrusted and copied verbatim into the response.
pub struct HttpModelClient {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            temperature: 0.7,
            max_tokens: 512,
            client: reqwest::Client::new(),
        }
    }

    fn build_prompt(profile: &SubjectProfile, question: &Question) -> String {
        let attrs = serde_json::to_string(&profile.attributes).unwrap_or_else(|_| "{}".into());
        let mut prompt = format!(
            "You are {}. Your profile: {}\n\nAnswer this interview question in character:\n{}\n",
            profile.display_name, attrs, question.text
        );
        if !question.options.is_empty() {
            prompt.push_str(&format!("Options: {}\n", question.options.join(", ")));
        }
        let format_hint = match question.qtype {
            QuestionType::Scale => "Reply with JSON: {\"answer\": <1-10>, \"text\": \"...\"}",
            QuestionType::Boolean => "Reply with JSON: {\"answer\": true|false, \"text\": \"...\"}",
            _ => "Reply with JSON: {\"answer\": \"...\", \"text\": \"...\"}",
        };
        prompt.push_str(format_hint);
        prompt
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn invoke(
        &self,
        profile: &SubjectProfile,
        question: &Question,
    ) -> anyhow::Result<ModelReply> {
        let prompt = Self::build_prompt(profile, question);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("model service error: {}", error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("model service response missing content"))?
            .to_string();

        let tokens_in = json
            .pointer("/usage/prompt_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let tokens_out = json
            .pointer("/usage/completion_tokens")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let cost_usd = json
            .pointer("/usage/cost_usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        // Lenient structured parse: a reply that is not the requested JSON
        // still yields a usable open-text response.
        let (value, signals) = parse_structured(&text);

        Ok(ModelReply {
            text,
            value,
            signals,
            tokens_in,
            tokens_out,
            cost_usd,
            latency_ms,
        })
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

fn parse_structured(text: &str) -> (serde_json::Value, ResponseSignals) {
    let trimmed = text.trim();
    let parsed: Option<serde_json::Value> = serde_json::from_str(trimmed).ok().or_else(|| {
        // Tolerate a JSON object embedded in prose.
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        serde_json::from_str(&trimmed[start..=end]).ok()
    });

    match parsed {
        Some(v) => {
            let value = v.get("answer").cloned().unwrap_or(serde_json::Value::Null);
            let signals = v
                .get("signals")
                .and_then(|s| serde_json::from_value(s.clone()).ok())
                .unwrap_or_default();
            (value, signals)
        }
        None => (serde_json::Value::Null, ResponseSignals::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_embedded_json_answer() {
        let (value, _) = parse_structured("Sure. {\"answer\": 7, \"text\": \"fine\"}");
        assert_eq!(value, serde_json::json!(7));
    }

    #[test]
    fn plain_prose_falls_back_to_null_value() {
        let (value, signals) = parse_structured("I feel hopeful about next year.");
        assert!(value.is_null());
        assert_eq!(signals.sentiment, 0.0);
        assert!(!signals.would_switch);
    }

    #[test]
    fn reads_signals_block_when_present() {
        let (_, signals) = parse_structured(
            r#"{"answer": true, "signals": {"sentiment": -0.4, "intensity": 0.9, "would_switch": true}}"#,
        );
        assert_eq!(signals.intensity, 0.9);
        assert!(signals.would_switch);
    }
}
