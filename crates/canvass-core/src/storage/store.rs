use crate::config::SurveyDefinition;
use crate::model::{
    AnalysisRecord, Question, QuestionType, Response, ResponseSignals, SubjectRef, Survey,
    SurveyStatus,
};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Handle to the relational store. The engine is the sole writer for a
/// running survey; analysis code only reads.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Optional filters for `query_responses`.
#[derive(Debug, Default, Clone)]
pub struct ResponseFilter {
    pub question_id: Option<i64>,
    pub subject_id: Option<String>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    /// Persist a validated definition as a draft survey with its questions
    /// and subject references, atomically.
    pub fn create_survey(&self, def: &SurveyDefinition) -> anyhow::Result<i64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO surveys(title, status, cost_ceiling_usd, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                def.title,
                SurveyStatus::Draft.as_str(),
                def.cost_ceiling_usd,
                now_rfc3339()
            ],
        )?;
        let survey_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO questions(survey_id, text, qtype, options_json, order_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (idx, q) in def.questions.iter().enumerate() {
                stmt.execute(params![
                    survey_id,
                    q.text,
                    q.qtype.as_str(),
                    serde_json::to_string(&q.options)?,
                    idx as i64
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO survey_subjects(survey_id, subject_id, display_name)
                 VALUES (?1, ?2, ?3)",
            )?;
            for s in &def.subjects {
                stmt.execute(params![survey_id, s.id, s.name])?;
            }
        }
        tx.commit()?;
        Ok(survey_id)
    }

    pub fn fetch_survey(&self, id: i64) -> anyhow::Result<Option<Survey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, status, cost_ceiling_usd, progress, total_cost_usd,
                    total_tokens, created_at
             FROM surveys WHERE id = ?1",
        )?;
        let survey = stmt
            .query_row(params![id], map_survey_row)
            .optional()
            .context("fetch survey")?;
        Ok(survey)
    }

    pub fn list_surveys(&self) -> anyhow::Result<Vec<Survey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, status, cost_ceiling_usd, progress, total_cost_usd,
                    total_tokens, created_at
             FROM surveys ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], map_survey_row)?;
        rows.collect::<Result<Vec<_>, _>>().context("list surveys")
    }

    /// Status transition with the lifecycle guard. Illegal transitions
    /// (including anything out of a terminal state) are rejected.
    pub fn update_status(&self, id: i64, next: SurveyStatus) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn
            .query_row("SELECT status FROM surveys WHERE id = ?1", params![id], |r| {
                r.get(0)
            })
            .context("survey not found for status update")?;
        let current = SurveyStatus::parse(&current);
        if !current.can_transition_to(next) {
            anyhow::bail!("illegal status transition {} -> {}", current, next);
        }
        conn.execute(
            "UPDATE surveys SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        Ok(())
    }

    /// Progress is clamped non-decreasing at the storage layer as well;
    /// totals are absolute values from the run's accumulator.
    pub fn update_progress(
        &self,
        id: i64,
        progress: f64,
        total_cost_usd: f64,
        total_tokens: i64,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE surveys
             SET progress = MAX(progress, ?1), total_cost_usd = ?2, total_tokens = ?3
             WHERE id = ?4",
            params![progress, total_cost_usd, total_tokens, id],
        )?;
        Ok(())
    }

    pub fn fetch_questions(&self, survey_id: i64) -> anyhow::Result<Vec<Question>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, survey_id, text, qtype, options_json, order_index
             FROM questions WHERE survey_id = ?1 ORDER BY order_index ASC",
        )?;
        let rows = stmt.query_map(params![survey_id], |row| {
            let options_json: String = row.get(4)?;
            Ok(Question {
                id: row.get(0)?,
                survey_id: row.get(1)?,
                text: row.get(2)?,
                qtype: QuestionType::parse(&row.get::<_, String>(3)?),
                options: serde_json::from_str(&options_json).unwrap_or_default(),
                order_index: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().context("fetch questions")
    }

    pub fn fetch_subject_refs(&self, survey_id: i64) -> anyhow::Result<Vec<SubjectRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT subject_id, display_name FROM survey_subjects
             WHERE survey_id = ?1 ORDER BY subject_id ASC",
        )?;
        let rows = stmt.query_map(params![survey_id], |row| {
            Ok(SubjectRef {
                subject_id: row.get(0)?,
                display_name: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().context("fetch subjects")
    }

    /// At-most-once append. A duplicate (survey, question, subject) triple
    /// is an error; re-running a partially completed survey should skip the
    /// triple before dispatch instead of relying on this guard.
    pub fn append_response(&self, r: &Response) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO responses(survey_id, question_id, subject_id, text, value_json,
                        sentiment, intensity, would_switch, fear,
                        tokens_in, tokens_out, cost_usd, latency_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(survey_id, question_id, subject_id) DO NOTHING",
                response_params(r)?,
            )
            .context("append response")?;
        if inserted == 0 {
            anyhow::bail!(
                "response already recorded for survey={} question={} subject={}",
                r.survey_id,
                r.question_id,
                r.subject_id
            );
        }
        Ok(())
    }

    /// Transactional batch append; duplicates are skipped silently so a
    /// concurrent re-run cannot double-write. Returns inserted count.
    pub fn append_batch(&self, responses: &[Response]) -> anyhow::Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO responses(survey_id, question_id, subject_id, text, value_json,
                        sentiment, intensity, would_switch, fear,
                        tokens_in, tokens_out, cost_usd, latency_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(survey_id, question_id, subject_id) DO NOTHING",
            )?;
            for r in responses {
                inserted += stmt.execute(response_params(r)?)?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn query_responses(
        &self,
        survey_id: i64,
        filter: &ResponseFilter,
    ) -> anyhow::Result<Vec<Response>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT survey_id, question_id, subject_id, text, value_json,
                    sentiment, intensity, would_switch, fear,
                    tokens_in, tokens_out, cost_usd, latency_ms, created_at
             FROM responses WHERE survey_id = ?1",
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(survey_id)];
        if let Some(qid) = filter.question_id {
            args.push(Box::new(qid));
            sql.push_str(&format!(" AND question_id = ?{}", args.len()));
        }
        if let Some(sid) = &filter.subject_id {
            args.push(Box::new(sid.clone()));
            sql.push_str(&format!(" AND subject_id = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter().map(|b| b.as_ref())), map_response_row)?;
        rows.collect::<Result<Vec<_>, _>>().context("query responses")
    }

    /// Used to recompute progress after a restart instead of trusting
    /// in-memory counters.
    pub fn count_responses(&self, survey_id: i64, question_id: Option<i64>) -> anyhow::Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = match question_id {
            Some(qid) => conn.query_row(
                "SELECT COUNT(*) FROM responses WHERE survey_id = ?1 AND question_id = ?2",
                params![survey_id, qid],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM responses WHERE survey_id = ?1",
                params![survey_id],
                |r| r.get(0),
            )?,
        };
        Ok(n as u64)
    }

    /// Subjects that already answered a question; resume skips these before
    /// dispatching any model call.
    pub fn answered_subjects(
        &self,
        survey_id: i64,
        question_id: i64,
    ) -> anyhow::Result<HashSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT subject_id FROM responses WHERE survey_id = ?1 AND question_id = ?2",
        )?;
        let rows = stmt.query_map(params![survey_id, question_id], |r| r.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for r in rows {
            out.insert(r?);
        }
        Ok(out)
    }

    /// Cross-survey read for the aggregation service. `survey_ids = None`
    /// means the whole corpus.
    pub fn all_responses(&self, survey_ids: Option<&[i64]>) -> anyhow::Result<Vec<Response>> {
        let conn = self.conn.lock().unwrap();
        let base = "SELECT survey_id, question_id, subject_id, text, value_json,
                    sentiment, intensity, would_switch, fear,
                    tokens_in, tokens_out, cost_usd, latency_ms, created_at
             FROM responses";
        let mut out = Vec::new();
        match survey_ids {
            None => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC", base))?;
                let rows = stmt.query_map([], map_response_row)?;
                for r in rows {
                    out.push(r?);
                }
            }
            Some(ids) => {
                let placeholders = ids
                    .iter()
                    .enumerate()
                    .map(|(i, _)| format!("?{}", i + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "{} WHERE survey_id IN ({}) ORDER BY id ASC",
                    base, placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(rusqlite::params_from_iter(ids.iter()), map_response_row)?;
                for r in rows {
                    out.push(r?);
                }
            }
        }
        Ok(out)
    }

    /// Next version for the survey; analyses are append-only.
    pub fn insert_analysis(
        &self,
        survey_id: i64,
        payload: &serde_json::Value,
    ) -> anyhow::Result<AnalysisRecord> {
        let conn = self.conn.lock().unwrap();
        let version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM analyses WHERE survey_id = ?1",
            params![survey_id],
            |r| r.get(0),
        )?;
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO analyses(survey_id, version, payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![survey_id, version, serde_json::to_string(payload)?, created_at],
        )?;
        Ok(AnalysisRecord {
            id: conn.last_insert_rowid(),
            survey_id,
            version,
            payload: payload.clone(),
            created_at,
        })
    }

    pub fn latest_analysis(&self, survey_id: i64) -> anyhow::Result<Option<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, survey_id, version, payload_json, created_at
             FROM analyses WHERE survey_id = ?1 ORDER BY version DESC LIMIT 1",
        )?;
        stmt.query_row(params![survey_id], map_analysis_row)
            .optional()
            .context("latest analysis")
    }

    pub fn list_analyses(&self, survey_id: i64) -> anyhow::Result<Vec<AnalysisRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, survey_id, version, payload_json, created_at
             FROM analyses WHERE survey_id = ?1 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![survey_id], map_analysis_row)?;
        rows.collect::<Result<Vec<_>, _>>().context("list analyses")
    }
}

fn map_survey_row(row: &Row<'_>) -> rusqlite::Result<Survey> {
    Ok(Survey {
        id: row.get(0)?,
        title: row.get(1)?,
        status: SurveyStatus::parse(&row.get::<_, String>(2)?),
        cost_ceiling_usd: row.get(3)?,
        progress: row.get(4)?,
        total_cost_usd: row.get(5)?,
        total_tokens: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn map_response_row(row: &Row<'_>) -> rusqlite::Result<Response> {
    let value_json: String = row.get(4)?;
    Ok(Response {
        survey_id: row.get(0)?,
        question_id: row.get(1)?,
        subject_id: row.get(2)?,
        text: row.get(3)?,
        value: serde_json::from_str(&value_json).unwrap_or(serde_json::Value::Null),
        signals: ResponseSignals {
            sentiment: row.get(5)?,
            intensity: row.get(6)?,
            would_switch: row.get::<_, i64>(7)? != 0,
            fear: row.get::<_, i64>(8)? != 0,
        },
        tokens_in: row.get(9)?,
        tokens_out: row.get(10)?,
        cost_usd: row.get(11)?,
        latency_ms: row.get::<_, i64>(12)? as u64,
        created_at: row.get(13)?,
    })
}

fn map_analysis_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let payload_json: String = row.get(3)?;
    Ok(AnalysisRecord {
        id: row.get(0)?,
        survey_id: row.get(1)?,
        version: row.get(2)?,
        payload: serde_json::from_str(&payload_json).unwrap_or(serde_json::Value::Null),
        created_at: row.get(4)?,
    })
}

type ResponseParams = (
    i64,
    i64,
    String,
    String,
    String,
    f64,
    f64,
    i64,
    i64,
    i64,
    i64,
    f64,
    i64,
    String,
);

fn response_params(r: &Response) -> anyhow::Result<ResponseParams> {
    Ok((
        r.survey_id,
        r.question_id,
        r.subject_id.clone(),
        r.text.clone(),
        serde_json::to_string(&r.value)?,
        r.signals.sentiment,
        r.signals.intensity,
        r.signals.would_switch as i64,
        r.signals.fear as i64,
        r.tokens_in,
        r.tokens_out,
        r.cost_usd,
        r.latency_ms as i64,
        r.created_at.clone(),
    ))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
