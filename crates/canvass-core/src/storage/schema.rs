pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS surveys (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  status TEXT NOT NULL,
  cost_ceiling_usd REAL NOT NULL,
  progress REAL NOT NULL DEFAULT 0,
  total_cost_usd REAL NOT NULL DEFAULT 0,
  total_tokens INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  survey_id INTEGER NOT NULL REFERENCES surveys(id),
  text TEXT NOT NULL,
  qtype TEXT NOT NULL,
  options_json TEXT NOT NULL DEFAULT '[]',
  order_index INTEGER NOT NULL,
  UNIQUE (survey_id, order_index)
);

CREATE TABLE IF NOT EXISTS survey_subjects (
  survey_id INTEGER NOT NULL REFERENCES surveys(id),
  subject_id TEXT NOT NULL,
  display_name TEXT NOT NULL,
  PRIMARY KEY (survey_id, subject_id)
);

CREATE TABLE IF NOT EXISTS responses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  survey_id INTEGER NOT NULL REFERENCES surveys(id),
  question_id INTEGER NOT NULL REFERENCES questions(id),
  subject_id TEXT NOT NULL,
  text TEXT NOT NULL,
  value_json TEXT NOT NULL DEFAULT 'null',
  sentiment REAL NOT NULL DEFAULT 0,
  intensity REAL NOT NULL DEFAULT 0,
  would_switch INTEGER NOT NULL DEFAULT 0,
  fear INTEGER NOT NULL DEFAULT 0,
  tokens_in INTEGER NOT NULL DEFAULT 0,
  tokens_out INTEGER NOT NULL DEFAULT 0,
  cost_usd REAL NOT NULL DEFAULT 0,
  latency_ms INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  UNIQUE (survey_id, question_id, subject_id)
);

CREATE INDEX IF NOT EXISTS idx_responses_survey ON responses(survey_id);

CREATE TABLE IF NOT EXISTS analyses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  survey_id INTEGER NOT NULL REFERENCES surveys(id),
  version INTEGER NOT NULL,
  payload_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  UNIQUE (survey_id, version)
);
"#;
