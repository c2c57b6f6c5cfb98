use crate::model::{ProgressReport, RunSummary, SurveyStatus};

pub fn print_run_summary(s: &RunSummary) {
    let icon = match s.status {
        SurveyStatus::Completed => "✅",
        SurveyStatus::Cancelled => "🚫",
        SurveyStatus::Failed => "❌",
        _ => "⏳",
    };
    eprintln!("\n{} survey #{} {}", icon, s.survey_id, s.status);
    eprintln!(
        "   responses: {} written, {} attempted, {} gaps",
        s.responses_written, s.attempted, s.failed_calls
    );
    eprintln!(
        "   cost: ${:.4}  tokens: {}  elapsed: {:.1}s",
        s.total_cost_usd,
        s.total_tokens,
        s.elapsed_ms as f64 / 1000.0
    );
}

pub fn print_progress(p: &ProgressReport) {
    eprintln!(
        "survey #{:<4} {:<10} {:>5.1}%  {}/{} responses  ${:.4}",
        p.survey_id, p.status.as_str(), p.percent, p.responses, p.total_units, p.cost_so_far_usd
    );
}
