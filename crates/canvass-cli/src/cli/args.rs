use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "canvass",
    version,
    about = "Model-driven interview campaigns: run, persist, analyze"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a runnable sample survey definition
    Init(InitArgs),
    /// Create a survey from a definition file
    Create(CreateArgs),
    /// Run a draft or paused survey to completion (Ctrl-C cancels)
    Run(RunArgs),
    /// Show progress for a survey
    Progress(ProgressArgs),
    /// List all surveys
    List(ListArgs),
    /// Compute and store a new analysis version for a survey
    Analyze(AnalyzeArgs),
    /// Cross-survey aggregation over the whole response corpus
    Aggregate(AggregateArgs),
    Version,
}

#[derive(clap::Args)]
pub struct InitArgs {
    #[arg(long, default_value = "survey.yaml")]
    pub config: PathBuf,
}

#[derive(clap::Args)]
pub struct CreateArgs {
    #[arg(long, default_value = "survey.yaml")]
    pub config: PathBuf,
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
    /// Fail on unknown keys instead of warning
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args)]
pub struct RunArgs {
    pub survey_id: i64,
    #[arg(long, default_value = "survey.yaml")]
    pub config: PathBuf,
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
    /// Model provider: fake | http
    #[arg(long, default_value = "fake")]
    pub provider: String,
    #[arg(long, env = "CANVASS_ENDPOINT", default_value = "https://api.openai.com/v1/chat/completions")]
    pub endpoint: String,
    #[arg(long, env = "CANVASS_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,
    #[arg(long, env = "CANVASS_API_KEY", default_value = "")]
    pub api_key: String,
}

#[derive(clap::Args)]
pub struct ProgressArgs {
    pub survey_id: i64,
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
}

#[derive(clap::Args)]
pub struct ListArgs {
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    pub survey_id: i64,
    #[arg(long, default_value = "survey.yaml")]
    pub config: PathBuf,
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
    /// Print the full payload as JSON instead of the summary
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct AggregateArgs {
    #[command(subcommand)]
    pub cmd: AggregateSub,
}

#[derive(Subcommand)]
pub enum AggregateSub {
    /// Pearson correlations over every variable pair, corpus-wide
    Correlations(AggregateCommonArgs),
    /// Volume, sentiment and spend per time bucket
    Trends(TrendsArgs),
    /// Group responses by a subject profile attribute
    Groups(GroupsArgs),
    /// Latency and length anomalies, system-wide or per survey
    Outliers(OutliersArgs),
    /// Corpus-wide headline numbers
    Insights(InsightsArgs),
}

#[derive(clap::Args)]
pub struct InsightsArgs {
    #[command(flatten)]
    pub common: AggregateCommonArgs,
    /// Maximum notable correlations to include
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(clap::Args)]
pub struct AggregateCommonArgs {
    #[arg(long, default_value = ".canvass/canvass.db")]
    pub db: PathBuf,
    #[arg(long, default_value = "survey.yaml")]
    pub config: PathBuf,
}

#[derive(clap::Args)]
pub struct TrendsArgs {
    #[command(flatten)]
    pub common: AggregateCommonArgs,
    /// daily | weekly | monthly
    #[arg(long, default_value = "daily")]
    pub period: String,
}

#[derive(clap::Args)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub common: AggregateCommonArgs,
    /// Profile attribute to group by
    pub attribute: String,
}

#[derive(clap::Args)]
pub struct OutliersArgs {
    #[command(flatten)]
    pub common: AggregateCommonArgs,
    #[arg(long)]
    pub survey_id: Option<i64>,
}
