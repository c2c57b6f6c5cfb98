use canvass_core::config::{parse_definition, SurveyDefinition};
use canvass_core::model::{Response, ResponseSignals, SurveyStatus};
use canvass_core::storage::{ResponseFilter, Store};
use tempfile::tempdir;

fn definition() -> SurveyDefinition {
    parse_definition(
        r#"
version: 1
title: Smoke
cost_ceiling_usd: 1.0
questions:
  - text: "Q1"
    type: open
  - text: "Q2"
    type: scale
subjects:
  - { id: s1, name: "Subject One" }
  - { id: s2, name: "Subject Two" }
"#,
        true,
    )
    .unwrap()
}

fn response(survey_id: i64, question_id: i64, subject_id: &str) -> Response {
    Response {
        survey_id,
        question_id,
        subject_id: subject_id.into(),
        text: format!("answer from {}", subject_id),
        value: serde_json::json!(5),
        signals: ResponseSignals {
            sentiment: 0.5,
            intensity: 0.4,
            would_switch: false,
            fear: false,
        },
        tokens_in: 10,
        tokens_out: 20,
        cost_usd: 0.01,
        latency_ms: 100,
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[test]
fn schema_lifecycle_on_disk() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = Store::open(&dir.path().join("canvass.db"))?;
    store.init_schema()?;
    store.init_schema()?; // idempotent

    let id = store.create_survey(&definition())?;
    let survey = store.fetch_survey(id)?.unwrap();
    assert_eq!(survey.status, SurveyStatus::Draft);
    assert_eq!(survey.progress, 0.0);

    let questions = store.fetch_questions(id)?;
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].order_index, 0);
    assert_eq!(questions[1].text, "Q2");

    let subjects = store.fetch_subject_refs(id)?;
    assert_eq!(subjects.len(), 2);
    Ok(())
}

#[test]
fn duplicate_triple_is_rejected() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;
    let q = store.fetch_questions(id)?;

    store.append_response(&response(id, q[0].id, "s1"))?;
    let err = store.append_response(&response(id, q[0].id, "s1")).unwrap_err();
    assert!(err.to_string().contains("already recorded"));

    // Same subject, different question is fine.
    store.append_response(&response(id, q[1].id, "s1"))?;
    assert_eq!(store.count_responses(id, None)?, 2);
    Ok(())
}

#[test]
fn batch_append_skips_duplicates() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;
    let q = store.fetch_questions(id)?;

    let rows = vec![
        response(id, q[0].id, "s1"),
        response(id, q[0].id, "s2"),
    ];
    assert_eq!(store.append_batch(&rows)?, 2);
    // Re-running the same batch writes nothing new.
    assert_eq!(store.append_batch(&rows)?, 0);
    assert_eq!(store.count_responses(id, Some(q[0].id))?, 2);

    let answered = store.answered_subjects(id, q[0].id)?;
    assert!(answered.contains("s1") && answered.contains("s2"));
    Ok(())
}

#[test]
fn query_filters_by_question_and_subject() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;
    let q = store.fetch_questions(id)?;

    store.append_batch(&[
        response(id, q[0].id, "s1"),
        response(id, q[0].id, "s2"),
        response(id, q[1].id, "s1"),
    ])?;

    let all = store.query_responses(id, &ResponseFilter::default())?;
    assert_eq!(all.len(), 3);

    let by_question = store.query_responses(
        id,
        &ResponseFilter {
            question_id: Some(q[0].id),
            subject_id: None,
        },
    )?;
    assert_eq!(by_question.len(), 2);

    let by_both = store.query_responses(
        id,
        &ResponseFilter {
            question_id: Some(q[1].id),
            subject_id: Some("s1".into()),
        },
    )?;
    assert_eq!(by_both.len(), 1);
    assert_eq!(by_both[0].subject_id, "s1");
    Ok(())
}

#[test]
fn status_transitions_are_guarded() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;

    assert!(store.update_status(id, SurveyStatus::Completed).is_err());
    store.update_status(id, SurveyStatus::Running)?;
    store.update_status(id, SurveyStatus::Paused)?;
    store.update_status(id, SurveyStatus::Running)?;
    store.update_status(id, SurveyStatus::Completed)?;
    // Terminal states are sinks.
    assert!(store.update_status(id, SurveyStatus::Running).is_err());
    Ok(())
}

#[test]
fn progress_is_non_decreasing_in_storage() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;

    store.update_progress(id, 40.0, 0.1, 100)?;
    store.update_progress(id, 25.0, 0.2, 200)?;
    let survey = store.fetch_survey(id)?.unwrap();
    assert_eq!(survey.progress, 40.0);
    assert_eq!(survey.total_cost_usd, 0.2);
    Ok(())
}

#[test]
fn analysis_versions_are_monotonic_and_immutable() -> anyhow::Result<()> {
    let store = Store::memory()?;
    store.init_schema()?;
    let id = store.create_survey(&definition())?;

    let v1 = store.insert_analysis(id, &serde_json::json!({"n": 1}))?;
    let v2 = store.insert_analysis(id, &serde_json::json!({"n": 2}))?;
    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);

    let latest = store.latest_analysis(id)?.unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.payload["n"], 2);

    let all = store.list_analyses(id)?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].payload["n"], 1);
    Ok(())
}
