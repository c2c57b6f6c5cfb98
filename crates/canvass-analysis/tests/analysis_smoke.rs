use canvass_analysis::aggregate::{Aggregator, TrendPeriod};
use canvass_analysis::descriptive::Computed;
use canvass_analysis::{AnalysisError, Analyzer};
use canvass_core::config::{QuestionDef, SubjectDef, SurveyDefinition};
use canvass_core::model::{QuestionType, Response, ResponseSignals};
use canvass_core::providers::StaticProfiles;
use canvass_core::storage::Store;
use std::sync::Arc;

fn definition(subjects: usize) -> SurveyDefinition {
    SurveyDefinition {
        version: 1,
        title: "post-election mood".into(),
        cost_ceiling_usd: 10.0,
        settings: Default::default(),
        analysis: Default::default(),
        questions: vec![
            QuestionDef {
                text: "How do you feel about the last year?".into(),
                qtype: QuestionType::Open,
                options: vec![],
            },
            QuestionDef {
                text: "Rate your trust in institutions".into(),
                qtype: QuestionType::Scale,
                options: vec![],
            },
        ],
        subjects: (0..subjects)
            .map(|i| SubjectDef {
                id: format!("s{i}"),
                name: format!("Subject {i}"),
                attributes: Default::default(),
            })
            .collect(),
    }
}

fn response(
    survey_id: i64,
    question_id: i64,
    subject: &str,
    text: &str,
    latency_ms: u64,
    created_at: &str,
) -> Response {
    Response {
        survey_id,
        question_id,
        subject_id: subject.into(),
        text: text.into(),
        value: serde_json::json!(3),
        signals: ResponseSignals {
            sentiment: 0.1,
            intensity: 0.5,
            would_switch: subject.ends_with('1'),
            fear: false,
        },
        tokens_in: 40,
        tokens_out: 80,
        cost_usd: 0.002,
        latency_ms,
        created_at: created_at.into(),
    }
}

fn seeded_store(subjects: usize, latencies: &[u64]) -> (Store, i64, i64) {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let survey_id = store.create_survey(&definition(subjects)).unwrap();
    let questions = store.fetch_questions(survey_id).unwrap();
    let qid = questions[0].id;

    let rows: Vec<Response> = latencies
        .iter()
        .enumerate()
        .map(|(i, &latency)| {
            response(
                survey_id,
                qid,
                &format!("s{i}"),
                "Things are better, I support the new council.",
                latency,
                &format!("2026-01-{:02}T12:00:00Z", (i % 20) + 1),
            )
        })
        .collect();
    store.append_batch(&rows).unwrap();
    (store, survey_id, qid)
}

fn analyzer(store: &Store) -> Analyzer {
    Analyzer::new(
        store.clone(),
        Arc::new(StaticProfiles::new(vec![])),
        Default::default(),
    )
}

#[tokio::test]
async fn empty_survey_yields_no_responses() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let survey_id = store.create_survey(&definition(3)).unwrap();

    match analyzer(&store).analyze(survey_id).await {
        Err(AnalysisError::NoResponses) => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_survey_is_reported_as_such() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    match analyzer(&store).analyze(999).await {
        Err(AnalysisError::SurveyNotFound(999)) => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn repeated_analysis_bumps_the_version() {
    let (store, survey_id, _) = seeded_store(12, &[1000; 12]);
    let analyzer = analyzer(&store);

    let first = analyzer.analyze(survey_id).await.unwrap();
    let second = analyzer.analyze(survey_id).await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);

    let latest = store.latest_analysis(survey_id).unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.payload["responses"], serde_json::json!(12));
    assert_eq!(latest.payload["sentiment"]["positive"], serde_json::json!(12));
}

#[tokio::test]
async fn nine_responses_are_too_few_for_outliers() {
    let (store, survey_id, _) = seeded_store(9, &[1000; 9]);
    let record = analyzer(&store).analyze(survey_id).await.unwrap();
    assert_eq!(record.payload["outliers"]["outcome"], serde_json::json!("insufficient_data"));
    assert_eq!(record.payload["outliers"]["data"]["got"], serde_json::json!(9));
}

#[tokio::test]
async fn one_slow_response_in_twelve_is_flagged() {
    let mut latencies = vec![1000u64; 11];
    latencies.push(10_000);
    let (store, survey_id, _) = seeded_store(12, &latencies);

    let record = analyzer(&store).analyze(survey_id).await.unwrap();
    let flagged = record.payload["outliers"]["data"].as_array().unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0]["subject_id"], serde_json::json!("s11"));
    assert_eq!(flagged[0]["kind"], serde_json::json!("latency_high"));
}

#[tokio::test]
async fn aggregator_covers_the_whole_corpus() {
    let (store, _, _) = seeded_store(12, &[1000; 12]);
    let aggregator = Aggregator::new(
        store.clone(),
        Arc::new(StaticProfiles::new(vec![])),
        Default::default(),
    );

    let matrix = aggregator.global_correlations(None, None).unwrap();
    assert_eq!(matrix.responses, 12);
    assert_eq!(matrix.cells.len(), 21);

    let trends = aggregator.identify_trends(TrendPeriod::Daily, None).unwrap();
    assert_eq!(trends.buckets.iter().map(|b| b.volume).sum::<usize>(), 12);

    match aggregator.detect_outliers(None).unwrap() {
        Computed::Value(found) => assert!(found.is_empty()),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let cumulative = aggregator.cumulative_insights(10).unwrap();
    assert_eq!(cumulative.responses, 12);
    assert_eq!(cumulative.subjects, 12);
    assert_eq!(cumulative.dominant_sentiment, "positive");
    assert!((cumulative.persuasion_rate - 2.0 / 12.0).abs() < 1e-12);

    let capped = aggregator.cumulative_insights(1).unwrap();
    assert!(capped.notable_correlations.len() <= 1);

    let groups = aggregator.group_by_profile("region", None).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].value, "unknown");
    assert_eq!(groups[0].subjects, 12);
}

#[tokio::test]
async fn empty_corpus_has_nothing_to_aggregate() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let aggregator = Aggregator::new(
        store,
        Arc::new(StaticProfiles::new(vec![])),
        Default::default(),
    );
    match aggregator.cumulative_insights(10) {
        Err(AnalysisError::NoResponses) => {}
        other => panic!("unexpected outcome: {other:?}"),
    }
}
