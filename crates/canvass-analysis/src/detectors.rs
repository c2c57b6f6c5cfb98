use canvass_core::config::AnalysisSettings;
use canvass_core::model::{Response, SubjectProfile};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A subject who grants the incumbent narrative on one axis while
/// refusing it on another in the same breath.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenPreference {
    pub subject_id: String,
    pub approval_keyword: String,
    pub dissent_phrase: String,
    pub quote: String,
}

/// A subject signalling a hard limit: either an explicit trigger phrase
/// or the model's fear signal firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RupturePoint {
    pub subject_id: String,
    pub trigger: String,
    pub quote: String,
    /// Red-line topics the subject's profile declares, if any.
    pub red_lines: Vec<String>,
}

fn first_match<'a>(lowered: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|n| lowered.contains(n.to_lowercase().as_str()))
        .map(|n| n.as_str())
}

/// Scans responses for texts carrying both an approval keyword and a
/// dissent phrase. One hit per subject, capped at `detector_cap`.
pub fn hidden_preferences(
    responses: &[Response],
    settings: &AnalysisSettings,
) -> Vec<HiddenPreference> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut hits = Vec::new();
    for r in responses {
        if hits.len() >= settings.detector_cap {
            break;
        }
        if seen.contains(r.subject_id.as_str()) {
            continue;
        }
        let lowered = r.text.to_lowercase();
        let approval = match first_match(&lowered, &settings.approval_keywords) {
            Some(k) => k,
            None => continue,
        };
        let dissent = match first_match(&lowered, &settings.dissent_phrases) {
            Some(p) => p,
            None => continue,
        };
        seen.insert(r.subject_id.as_str());
        hits.push(HiddenPreference {
            subject_id: r.subject_id.clone(),
            approval_keyword: approval.to_string(),
            dissent_phrase: dissent.to_string(),
            quote: r.text.clone(),
        });
    }
    hits
}

/// Red-line topics from a profile's `red_lines` attribute, tolerating
/// both a string array and a single string.
fn red_lines_of(profile: Option<&SubjectProfile>) -> Vec<String> {
    let Some(profile) = profile else {
        return Vec::new();
    };
    match profile.attributes.get("red_lines") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Scans responses for rupture signals. One hit per subject, capped at
/// `detector_cap`.
pub fn rupture_points(
    responses: &[Response],
    profiles: &HashMap<String, SubjectProfile>,
    settings: &AnalysisSettings,
) -> Vec<RupturePoint> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut hits = Vec::new();
    for r in responses {
        if hits.len() >= settings.detector_cap {
            break;
        }
        if seen.contains(r.subject_id.as_str()) {
            continue;
        }
        let lowered = r.text.to_lowercase();
        let trigger = match first_match(&lowered, &settings.rupture_phrases) {
            Some(p) => p.to_string(),
            None if r.signals.fear => "fear signal".to_string(),
            None => continue,
        };
        seen.insert(r.subject_id.as_str());
        hits.push(RupturePoint {
            subject_id: r.subject_id.clone(),
            trigger,
            quote: r.text.clone(),
            red_lines: red_lines_of(profiles.get(&r.subject_id)),
        });
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvass_core::model::ResponseSignals;

    fn response(subject: &str, text: &str, fear: bool) -> Response {
        Response {
            survey_id: 1,
            question_id: 1,
            subject_id: subject.into(),
            text: text.into(),
            value: serde_json::Value::Null,
            signals: ResponseSignals {
                fear,
                ..ResponseSignals::default()
            },
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            latency_ms: 0,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn approval_plus_dissent_is_a_hidden_preference() {
        let settings = AnalysisSettings::default();
        let responses = vec![
            response("s1", "The economy improved, but I cannot forgive what happened.", false),
            response("s2", "The economy improved and I am pleased.", false),
            response("s3", "I will not accept this.", false),
        ];
        let hits = hidden_preferences(&responses, &settings);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].subject_id, "s1");
        assert_eq!(hits[0].approval_keyword, "economy improved");
        assert_eq!(hits[0].dissent_phrase, "but i cannot");
    }

    #[test]
    fn one_hit_per_subject_and_capped() {
        let mut settings = AnalysisSettings::default();
        settings.detector_cap = 2;
        let line = "Wages went up, but I cannot stay silent.";
        let responses = vec![
            response("s1", line, false),
            response("s1", line, false),
            response("s2", line, false),
            response("s3", line, false),
        ];
        let hits = hidden_preferences(&responses, &settings);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].subject_id, "s1");
        assert_eq!(hits[1].subject_id, "s2");
    }

    #[test]
    fn rupture_from_phrase_and_from_fear_signal() {
        let settings = AnalysisSettings::default();
        let mut attributes = serde_json::Map::new();
        attributes.insert(
            "red_lines".into(),
            serde_json::json!(["corruption", "violence"]),
        );
        let profiles = HashMap::from([(
            "s1".to_string(),
            SubjectProfile {
                id: "s1".into(),
                display_name: "Subject One".into(),
                attributes,
            },
        )]);

        let responses = vec![
            response("s1", "If they touch the courts, that's my limit.", false),
            response("s2", "I keep my head down and hope it passes.", true),
            response("s3", "Things are fine.", false),
        ];
        let hits = rupture_points(&responses, &profiles, &settings);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].subject_id, "s1");
        assert_eq!(hits[0].trigger, "that's my limit");
        assert_eq!(hits[0].red_lines, vec!["corruption", "violence"]);
        assert_eq!(hits[1].subject_id, "s2");
        assert_eq!(hits[1].trigger, "fear signal");
        assert!(hits[1].red_lines.is_empty());
    }
}
