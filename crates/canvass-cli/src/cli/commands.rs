use super::args::*;
use canvass_analysis::aggregate::{Aggregator, TrendPeriod};
use canvass_analysis::correlation::CorrelationOutcome;
use canvass_analysis::descriptive::Computed;
use canvass_analysis::{AnalysisError, Analyzer};
use canvass_core::config::{self, AnalysisSettings, SurveyDefinition};
use canvass_core::engine::Engine;
use canvass_core::errors::EngineError;
use canvass_core::model::ProgressReport;
use canvass_core::providers::model::{FakeModelClient, HttpModelClient, ModelClient};
use canvass_core::providers::{ProfileStore, StaticProfiles};
use canvass_core::report::console;
use canvass_core::storage::Store;
use std::path::Path;
use std::sync::Arc;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Create(args) => cmd_create(args),
        Command::Run(args) => cmd_run(args).await,
        Command::Progress(args) => cmd_progress(args),
        Command::List(args) => cmd_list(args),
        Command::Analyze(args) => cmd_analyze(args).await,
        Command::Aggregate(args) => cmd_aggregate(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists (skipped)", args.config.display());
        return Ok(exit_codes::OK);
    }
    if let Some(parent) = args.config.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    config::write_sample_definition(&args.config)?;
    eprintln!("created {}", args.config.display());
    Ok(exit_codes::OK)
}

fn cmd_create(args: CreateArgs) -> anyhow::Result<i32> {
    let def = match config::load_definition(&args.config, args.strict) {
        Ok(def) => def,
        Err(e) => {
            eprintln!("config error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let store = open_store(&args.db)?;
    let survey_id = store.create_survey(&def)?;
    println!("{survey_id}");
    eprintln!(
        "created survey #{survey_id} \"{}\" ({} questions x {} subjects)",
        def.title,
        def.questions.len(),
        def.subjects.len()
    );
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let def = match config::load_definition(&args.config, false) {
        Ok(def) => def,
        Err(e) => {
            eprintln!("config error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let client: Arc<dyn ModelClient> = match args.provider.as_str() {
        "fake" => Arc::new(FakeModelClient::default()),
        "http" => {
            if args.api_key.is_empty() {
                eprintln!("config error: --api-key (or CANVASS_API_KEY) is required for the http provider");
                return Ok(exit_codes::CONFIG_ERROR);
            }
            Arc::new(HttpModelClient::new(args.endpoint, args.model, args.api_key))
        }
        other => {
            eprintln!("config error: unknown provider '{other}' (expected fake|http)");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let store = open_store(&args.db)?;
    let engine = Arc::new(Engine::new(
        store,
        Arc::new(StaticProfiles::from_defs(&def.subjects)),
        client,
        def.settings.clone(),
    ));

    // Ctrl-C cancels at the next batch boundary; committed responses stay.
    let ctrlc_engine = Arc::clone(&engine);
    let survey_id = args.survey_id;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt: cancelling survey #{survey_id}");
            ctrlc_engine.cancel(survey_id);
        }
    });

    match engine.start(args.survey_id).await {
        Ok(summary) => {
            console::print_run_summary(&summary);
            Ok(exit_codes::OK)
        }
        Err(e @ (EngineError::Cancelled | EngineError::CostLimitExceeded { .. })) => {
            eprintln!("run stopped: {e}");
            if let Ok(p) = engine.progress(args.survey_id) {
                console::print_progress(&p);
            }
            Ok(exit_codes::RUN_FAILED)
        }
        Err(e) => {
            eprintln!("run error: {e}");
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn cmd_progress(args: ProgressArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let survey = match store.fetch_survey(args.survey_id)? {
        Some(s) => s,
        None => {
            eprintln!("no survey #{}", args.survey_id);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let questions = store.fetch_questions(args.survey_id)?;
    let subjects = store.fetch_subject_refs(args.survey_id)?;
    let responses = store.count_responses(args.survey_id, None)?;
    console::print_progress(&ProgressReport {
        survey_id: survey.id,
        status: survey.status,
        percent: survey.progress,
        responses,
        total_units: (questions.len() * subjects.len()) as u64,
        cost_so_far_usd: survey.total_cost_usd,
    });
    Ok(exit_codes::OK)
}

fn cmd_list(args: ListArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let surveys = store.list_surveys()?;
    if surveys.is_empty() {
        eprintln!("no surveys yet");
        return Ok(exit_codes::OK);
    }
    for s in surveys {
        println!(
            "#{:<4} {:<10} {:>5.1}%  ${:<8.4} {}",
            s.id,
            s.status.as_str(),
            s.progress,
            s.total_cost_usd,
            s.title
        );
    }
    Ok(exit_codes::OK)
}

async fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let (settings, profiles) = analysis_context(&args.config);
    let store = open_store(&args.db)?;
    let analyzer = Analyzer::new(store, profiles, settings);

    let record = match analyzer.analyze(args.survey_id).await {
        Ok(record) => record,
        Err(e @ (AnalysisError::NoResponses | AnalysisError::SurveyNotFound(_))) => {
            eprintln!("analyze: {e}");
            return Ok(exit_codes::RUN_FAILED);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record.payload)?);
        return Ok(exit_codes::OK);
    }

    eprintln!(
        "📊 analysis v{} for survey #{} ({} responses)",
        record.version, record.survey_id, record.payload["responses"]
    );
    if let Some(insights) = record.payload["insights"].as_array() {
        for i in insights {
            eprintln!(
                "   [{}] {}",
                i["relevance"].as_str().unwrap_or("?"),
                i["title"].as_str().unwrap_or("?")
            );
        }
    }
    Ok(exit_codes::OK)
}

async fn cmd_aggregate(args: AggregateArgs) -> anyhow::Result<i32> {
    let common = match &args.cmd {
        AggregateSub::Correlations(c) => c,
        AggregateSub::Insights(i) => &i.common,
        AggregateSub::Trends(t) => &t.common,
        AggregateSub::Groups(g) => &g.common,
        AggregateSub::Outliers(o) => &o.common,
    };
    let (settings, profiles) = analysis_context(&common.config);
    let store = open_store(&common.db)?;
    let aggregator = Aggregator::new(store, profiles, settings);

    let outcome = match args.cmd {
        AggregateSub::Correlations(_) => aggregator.global_correlations(None, None).map(|matrix| {
            eprintln!("🔗 {} responses, {} variable pairs", matrix.responses, matrix.cells.len());
            for cell in &matrix.notable {
                if let CorrelationOutcome::Correlated(c) = &cell.outcome {
                    eprintln!(
                        "   {} ~ {}: r = {:+.3} ({:?}, n = {}, p ~ {:.3})",
                        cell.x, cell.y, c.r, c.strength, c.n, c.p_approx
                    );
                }
            }
            if matrix.notable.is_empty() {
                eprintln!("   nothing above the notable threshold");
            }
        }),
        AggregateSub::Trends(t) => {
            let period = match TrendPeriod::parse(&t.period) {
                Some(p) => p,
                None => {
                    eprintln!("config error: unknown period '{}' (expected daily|weekly|monthly)", t.period);
                    return Ok(exit_codes::CONFIG_ERROR);
                }
            };
            aggregator.identify_trends(period, None).map(|report| {
                eprintln!("📈 {} buckets ({:?})", report.buckets.len(), report.period);
                for b in &report.buckets {
                    eprintln!(
                        "   {}  {:>5} responses  sentiment {:+.2}  ${:.4}",
                        b.bucket, b.volume, b.mean_sentiment, b.cost_usd
                    );
                }
                if let Some(pct) = report.volume_change_pct {
                    eprintln!("   volume change first→last: {pct:+.1}%");
                }
            })
        }
        AggregateSub::Groups(g) => aggregator.group_by_profile(&g.attribute, None).await.map(|groups| {
            eprintln!("👥 {} groups by '{}'", groups.len(), g.attribute);
            for grp in &groups {
                eprintln!(
                    "   {:<16} {:>4} subjects  {:>5} responses  {} sentiment  intensity {:.2}  switch {:.0}%",
                    grp.value,
                    grp.subjects,
                    grp.responses,
                    grp.sentiment.dominant().label(),
                    grp.mean_intensity,
                    grp.would_switch_rate * 100.0
                );
            }
        }),
        AggregateSub::Outliers(o) => aggregator.detect_outliers(o.survey_id).map(|computed| match computed {
            Computed::Value(found) => {
                eprintln!("🔎 {} anomalous responses", found.len());
                for f in &found {
                    eprintln!(
                        "   subject {} q{} {:?} ({:.2})",
                        f.subject_id, f.question_id, f.kind, f.measure
                    );
                }
            }
            Computed::InsufficientData { needed, got } => {
                eprintln!("🔎 not enough data: {got} responses, {needed} needed");
            }
        }),
        AggregateSub::Insights(i) => aggregator.cumulative_insights(i.limit).map(|ci| {
            eprintln!(
                "🧭 {} surveys, {} responses from {} subjects",
                ci.surveys, ci.responses, ci.subjects
            );
            eprintln!(
                "   sentiment {} (mean {:+.2})  persuasion {:.1}%  cost ${:.4} (${:.4}/subject)",
                ci.dominant_sentiment,
                ci.mean_sentiment,
                ci.persuasion_rate * 100.0,
                ci.total_cost_usd,
                ci.cost_per_subject_usd
            );
            for cell in &ci.notable_correlations {
                if let CorrelationOutcome::Correlated(c) = &cell.outcome {
                    eprintln!("   {} ~ {}: r = {:+.3}", cell.x, cell.y, c.r);
                }
            }
        }),
    };

    match outcome {
        Ok(()) => Ok(exit_codes::OK),
        Err(AnalysisError::NoResponses) => {
            eprintln!("aggregate: no responses recorded yet");
            Ok(exit_codes::RUN_FAILED)
        }
        Err(e) => Err(e.into()),
    }
}

/// Analysis tunables and profiles come from the definition file when it is
/// readable; otherwise defaults and an empty profile store.
fn analysis_context(config: &Path) -> (AnalysisSettings, Arc<dyn ProfileStore>) {
    match config::load_definition(config, false) {
        Ok(def) => {
            let SurveyDefinition { analysis, subjects, .. } = def;
            let profiles: Arc<dyn ProfileStore> = Arc::new(StaticProfiles::from_defs(&subjects));
            (analysis, profiles)
        }
        Err(e) => {
            tracing::debug!(config = %config.display(), %e, "definition not loaded, using defaults");
            let profiles: Arc<dyn ProfileStore> = Arc::new(StaticProfiles::new(Vec::new()));
            (AnalysisSettings::default(), profiles)
        }
    }
}

fn open_store(db: &Path) -> anyhow::Result<Store> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Store::open(db)?;
    store.init_schema()?;
    Ok(store)
}
