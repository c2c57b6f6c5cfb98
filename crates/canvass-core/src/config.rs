use crate::errors::EngineError;
use crate::model::QuestionType;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// A survey definition file: the question set, the subject population, and
/// the run/analysis tunables. Questions become immutable once the survey is
/// created and leaves draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyDefinition {
    #[serde(default, rename = "configVersion", alias = "version")]
    pub version: u32,
    pub title: String,
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling_usd: f64,
    #[serde(default, skip_serializing_if = "is_default_settings")]
    pub settings: EngineSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    pub questions: Vec<QuestionDef>,
    pub subjects: Vec<SubjectDef>,
}

fn default_cost_ceiling() -> f64 {
    10.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDef {
    pub text: String,
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Concurrent model calls per batch; also the fan-out bound.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Backpressure sleep between batches.
    #[serde(default)]
    pub batch_delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Upper bound on one paused wait; keeps cancellation responsive even
    /// if a resume notify is missed.
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,
    /// Fraction of the cost ceiling at which a single warning is emitted.
    #[serde(default = "default_cost_warn_fraction")]
    pub cost_warn_fraction: f64,
}

fn default_batch_size() -> usize {
    10
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_pause_poll_ms() -> u64 {
    500
}
fn default_cost_warn_fraction() -> f64 {
    0.8
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: 0,
            timeout_seconds: default_timeout_seconds(),
            pause_poll_ms: default_pause_poll_ms(),
            cost_warn_fraction: default_cost_warn_fraction(),
        }
    }
}

fn is_default_settings(s: &EngineSettings) -> bool {
    s == &EngineSettings::default()
}

/// Tunables for the analysis heuristics. The defaults reproduce the
/// empirically chosen thresholds of the original detectors; none of them is
/// validated, which is exactly why they are configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSettings {
    #[serde(default = "default_positive_markers")]
    pub positive_markers: Vec<String>,
    #[serde(default = "default_negative_markers")]
    pub negative_markers: Vec<String>,
    /// Polarity scores beyond +/- this value bucket as positive/negative.
    #[serde(default = "default_sentiment_threshold")]
    pub sentiment_threshold: f64,

    #[serde(default = "default_theme_keywords")]
    pub theme_keywords: Vec<ThemeDef>,

    #[serde(default = "default_outlier_z_threshold")]
    pub outlier_z_threshold: f64,
    #[serde(default = "default_outlier_min_len")]
    pub outlier_min_len: usize,
    #[serde(default = "default_outlier_max_len")]
    pub outlier_max_len: usize,
    #[serde(default = "default_outlier_min_samples")]
    pub outlier_min_samples: usize,

    #[serde(default = "default_weak_r")]
    pub correlation_weak_r: f64,
    #[serde(default = "default_strong_r")]
    pub correlation_strong_r: f64,
    /// |r| above this is reported in the notable subset of the global matrix.
    #[serde(default = "default_notable_r")]
    pub correlation_notable_r: f64,

    #[serde(default = "default_approval_keywords")]
    pub approval_keywords: Vec<String>,
    #[serde(default = "default_dissent_phrases")]
    pub dissent_phrases: Vec<String>,
    #[serde(default = "default_rupture_phrases")]
    pub rupture_phrases: Vec<String>,
    /// Advisory detectors cap their hit lists at this size.
    #[serde(default = "default_detector_cap")]
    pub detector_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeDef {
    pub topic: String,
    pub keywords: Vec<String>,
}

fn default_positive_markers() -> Vec<String> {
    [
        "good", "great", "support", "agree", "approve", "hope", "better", "improve", "trust",
        "happy", "proud", "confident",
    ]
    .map(String::from)
    .to_vec()
}

fn default_negative_markers() -> Vec<String> {
    [
        "bad", "worse", "against", "disagree", "reject", "fear", "afraid", "angry", "corrupt",
        "betray", "distrust", "disappointed",
    ]
    .map(String::from)
    .to_vec()
}

fn default_sentiment_threshold() -> f64 {
    0.2
}

fn default_theme_keywords() -> Vec<ThemeDef> {
    vec![
        ThemeDef {
            topic: "economy".into(),
            keywords: ["economy", "jobs", "wages", "prices", "inflation", "taxes"]
                .map(String::from)
                .to_vec(),
        },
        ThemeDef {
            topic: "security".into(),
            keywords: ["security", "crime", "safety", "police", "war"]
                .map(String::from)
                .to_vec(),
        },
        ThemeDef {
            topic: "leadership".into(),
            keywords: ["leader", "president", "government", "corruption", "honest"]
                .map(String::from)
                .to_vec(),
        },
        ThemeDef {
            topic: "social".into(),
            keywords: ["health", "education", "family", "community", "pension"]
                .map(String::from)
                .to_vec(),
        },
        ThemeDef {
            topic: "environment".into(),
            keywords: ["environment", "climate", "water", "pollution"]
                .map(String::from)
                .to_vec(),
        },
    ]
}

fn default_outlier_z_threshold() -> f64 {
    2.0
}
fn default_outlier_min_len() -> usize {
    10
}
fn default_outlier_max_len() -> usize {
    5000
}
fn default_outlier_min_samples() -> usize {
    10
}
fn default_weak_r() -> f64 {
    0.3
}
fn default_strong_r() -> f64 {
    0.7
}
fn default_notable_r() -> f64 {
    0.3
}

fn default_approval_keywords() -> Vec<String> {
    ["economy improved", "jobs came back", "wages", "better off", "prosperity"]
        .map(String::from)
        .to_vec()
}

fn default_dissent_phrases() -> Vec<String> {
    ["but i cannot", "i will not accept", "not with my vote", "even so, no", "crossed a line"]
        .map(String::from)
        .to_vec()
}

fn default_rupture_phrases() -> Vec<String> {
    ["never", "that's my limit", "that is my limit", "no way back", "unforgivable"]
        .map(String::from)
        .to_vec()
}

fn default_detector_cap() -> usize {
    20
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            positive_markers: default_positive_markers(),
            negative_markers: default_negative_markers(),
            sentiment_threshold: default_sentiment_threshold(),
            theme_keywords: default_theme_keywords(),
            outlier_z_threshold: default_outlier_z_threshold(),
            outlier_min_len: default_outlier_min_len(),
            outlier_max_len: default_outlier_max_len(),
            outlier_min_samples: default_outlier_min_samples(),
            correlation_weak_r: default_weak_r(),
            correlation_strong_r: default_strong_r(),
            correlation_notable_r: default_notable_r(),
            approval_keywords: default_approval_keywords(),
            dissent_phrases: default_dissent_phrases(),
            rupture_phrases: default_rupture_phrases(),
            detector_cap: default_detector_cap(),
        }
    }
}

/// Load a survey definition, capturing unknown keys. In strict mode any
/// meaningful unknown field is an error; otherwise it is warned and ignored.
pub fn load_definition(path: &Path, strict: bool) -> Result<SurveyDefinition, EngineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        EngineError::Validation(format!("failed to read definition {}: {}", path.display(), e))
    })?;
    parse_definition(&raw, strict)
}

pub fn parse_definition(raw: &str, strict: bool) -> Result<SurveyDefinition, EngineError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let def: SurveyDefinition = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| EngineError::Validation(format!("failed to parse YAML: {}", e)))?;

    let meaningful: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !meaningful.is_empty() {
        if strict {
            return Err(EngineError::Validation(format!(
                "unknown fields in strict mode: {:?}",
                meaningful
            )));
        }
        tracing::warn!(fields = ?meaningful, "ignored unknown definition fields");
    }

    validate_definition(&def)?;
    Ok(def)
}

pub fn validate_definition(def: &SurveyDefinition) -> Result<(), EngineError> {
    if def.version != 0 && def.version != SUPPORTED_CONFIG_VERSION {
        return Err(EngineError::Validation(format!(
            "unsupported definition version {} (supported: 0, {})",
            def.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if def.title.trim().is_empty() {
        return Err(EngineError::Validation("survey title is empty".into()));
    }
    if def.questions.is_empty() {
        return Err(EngineError::Validation("survey has no questions".into()));
    }
    if def.subjects.is_empty() {
        return Err(EngineError::Validation("survey has no subjects".into()));
    }
    if def.cost_ceiling_usd <= 0.0 {
        return Err(EngineError::Validation(
            "cost_ceiling_usd must be positive".into(),
        ));
    }
    if def.settings.batch_size == 0 {
        return Err(EngineError::Validation("batch_size must be >= 1".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for s in &def.subjects {
        if s.id.trim().is_empty() {
            return Err(EngineError::Validation("subject with empty id".into()));
        }
        if !seen.insert(s.id.as_str()) {
            return Err(EngineError::Validation(format!(
                "duplicate subject id: {}",
                s.id
            )));
        }
    }

    for (i, q) in def.questions.iter().enumerate() {
        if q.text.trim().is_empty() {
            return Err(EngineError::Validation(format!("question {} has no text", i)));
        }
        if q.qtype.needs_options() && q.options.is_empty() {
            return Err(EngineError::Validation(format!(
                "question {} is {} but has no options",
                i,
                q.qtype.as_str()
            )));
        }
    }
    Ok(())
}

pub fn write_sample_definition(path: &Path) -> Result<(), EngineError> {
    std::fs::write(
        path,
        r#"version: 1
title: Demo campaign
cost_ceiling_usd: 2.0
settings:
  batch_size: 5
  timeout_seconds: 30
questions:
  - text: "How do you feel about the state of the economy?"
    type: open
  - text: "On a scale of 1 to 10, how satisfied are you with the current government?"
    type: scale
  - text: "Would you consider voting for a different party next election?"
    type: boolean
subjects:
  - id: s1
    name: "Maria, 42, teacher"
    attributes:
      age: 42
      occupation: teacher
      red_lines: ["corruption"]
  - id: s2
    name: "Jorge, 58, farmer"
    attributes:
      age: 58
      occupation: farmer
      red_lines: ["pension cuts", "water rights"]
  - id: s3
    name: "Lucia, 29, nurse"
    attributes:
      age: 29
      occupation: nurse
      red_lines: []
"#,
    )
    .map_err(|e| EngineError::Validation(format!("failed to write sample definition: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
version: 1
title: T
questions:
  - text: "Q1"
    type: open
subjects:
  - id: a
    name: A
"#
    }

    #[test]
    fn parses_minimal_definition() {
        let def = parse_definition(minimal_yaml(), true).unwrap();
        assert_eq!(def.title, "T");
        assert_eq!(def.settings.batch_size, 10);
        assert_eq!(def.analysis.outlier_z_threshold, 2.0);
        assert_eq!(def.analysis.detector_cap, 20);
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let yaml = format!("{}\nbogus_key: 1\n", minimal_yaml());
        let err = parse_definition(&yaml, true).unwrap_err();
        assert!(err.to_string().contains("bogus_key"));
    }

    #[test]
    fn rejects_duplicate_subjects() {
        let yaml = r#"
title: T
questions: [{ text: "Q", type: open }]
subjects:
  - { id: a, name: A }
  - { id: a, name: B }
"#;
        assert!(parse_definition(yaml, false).is_err());
    }

    #[test]
    fn rejects_choice_question_without_options() {
        let yaml = r#"
title: T
questions: [{ text: "Pick one", type: single_choice }]
subjects: [{ id: a, name: A }]
"#;
        let err = parse_definition(yaml, false).unwrap_err();
        assert!(err.to_string().contains("options"));
    }

    #[test]
    fn sample_definition_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.yaml");
        write_sample_definition(&path).unwrap();
        let def = load_definition(&path, true).unwrap();
        assert_eq!(def.questions.len(), 3);
        assert_eq!(def.subjects.len(), 3);
    }
}
