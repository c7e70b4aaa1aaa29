#![allow(clippy::missing_errors_doc)]

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use student_risk_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, AssessmentFeatures, AssessmentFeaturesInput,
    EngagementFeatures, EngagementFeaturesInput, FeatureRow, FinalResult, Intervention,
    InterventionInput, InterventionStatus, Outcome, OutcomeRecord, PriorityLevel, RiskBandPolicy,
    RiskCategory, RiskDataError, RiskPrediction, RiskPredictionInput, Student, StudentId,
    StudentRecord,
};
use time::OffsetDateTime;
use ulid::Ulid;

type Result<T, E = RiskDataError> = std::result::Result<T, E>;

const RISK_MIGRATION_VERSION: i64 = 1;

const SCHEMA_RISK_V1: &str = r"
CREATE TABLE IF NOT EXISTS students (
  student_pk INTEGER PRIMARY KEY AUTOINCREMENT,
  id_student INTEGER NOT NULL UNIQUE,
  code_module TEXT NOT NULL,
  code_presentation TEXT NOT NULL,
  gender_code INTEGER NOT NULL CHECK (gender_code >= 0),
  region_code INTEGER NOT NULL CHECK (region_code >= 0),
  age_band_code INTEGER NOT NULL CHECK (age_band_code >= 0),
  education_code INTEGER NOT NULL CHECK (education_code >= 0),
  is_male INTEGER NOT NULL CHECK (is_male IN (0, 1)),
  has_disability INTEGER NOT NULL CHECK (has_disability IN (0, 1)),
  unregistered INTEGER NOT NULL CHECK (unregistered IN (0, 1)),
  studied_credits INTEGER NOT NULL CHECK (studied_credits >= 0),
  num_prev_attempts INTEGER NOT NULL CHECK (num_prev_attempts >= 0),
  registration_delay REAL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS engagement_features (
  student_pk INTEGER PRIMARY KEY REFERENCES students(student_pk) ON DELETE CASCADE,
  total_clicks INTEGER NOT NULL CHECK (total_clicks >= 0),
  mean_clicks REAL NOT NULL CHECK (mean_clicks >= 0.0),
  std_clicks REAL NOT NULL CHECK (std_clicks >= 0.0),
  max_clicks INTEGER NOT NULL CHECK (max_clicks >= 0),
  active_days INTEGER NOT NULL CHECK (active_days >= 0),
  first_access INTEGER NOT NULL,
  last_access INTEGER NOT NULL,
  click_consistency REAL NOT NULL,
  clicks_per_active_day REAL NOT NULL CHECK (clicks_per_active_day >= 0.0),
  engagement_range REAL NOT NULL CHECK (engagement_range >= 0.0),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assessment_features (
  student_pk INTEGER PRIMARY KEY REFERENCES students(student_pk) ON DELETE CASCADE,
  scores_count INTEGER NOT NULL CHECK (scores_count >= 0),
  avg_score REAL,
  std_score REAL,
  min_score REAL,
  max_score REAL,
  submitted_count INTEGER NOT NULL CHECK (submitted_count >= 0),
  missing_count INTEGER NOT NULL CHECK (missing_count >= 0),
  banked_count INTEGER NOT NULL CHECK (banked_count >= 0),
  total_weight REAL NOT NULL CHECK (total_weight >= 0.0),
  submission_rate REAL NOT NULL CHECK (submission_rate BETWEEN 0.0 AND 1.0),
  score_range REAL CHECK (score_range >= 0.0 OR score_range IS NULL),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS risk_predictions (
  prediction_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  prediction_id TEXT NOT NULL UNIQUE,
  student_pk INTEGER NOT NULL REFERENCES students(student_pk) ON DELETE CASCADE,
  risk_score REAL NOT NULL CHECK (risk_score BETWEEN 0.0 AND 1.0),
  risk_category TEXT NOT NULL CHECK (
    risk_category IN ('Low Risk', 'Medium Risk', 'High Risk')
  ),
  needs_intervention INTEGER NOT NULL CHECK (needs_intervention IN (0, 1)),
  model_version TEXT NOT NULL,
  confidence_score REAL CHECK (
    confidence_score BETWEEN 0.0 AND 1.0 OR confidence_score IS NULL
  ),
  scored_at TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS trg_risk_predictions_no_update
BEFORE UPDATE ON risk_predictions
BEGIN
  SELECT RAISE(FAIL, 'risk_predictions is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_risk_predictions_student_seq
  ON risk_predictions(student_pk, prediction_seq);

CREATE TABLE IF NOT EXISTS interventions (
  intervention_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  intervention_id TEXT NOT NULL UNIQUE,
  student_pk INTEGER NOT NULL REFERENCES students(student_pk) ON DELETE CASCADE,
  prediction_seq INTEGER REFERENCES risk_predictions(prediction_seq) ON DELETE CASCADE,
  intervention_type TEXT NOT NULL,
  description TEXT,
  priority_level TEXT NOT NULL CHECK (
    priority_level IN ('Low', 'Medium', 'High', 'Critical')
  ),
  status TEXT NOT NULL CHECK (
    status IN ('Recommended', 'In Progress', 'Completed', 'Cancelled')
  ),
  effectiveness_score REAL CHECK (
    effectiveness_score BETWEEN 0.0 AND 1.0 OR effectiveness_score IS NULL
  ),
  recommended_at TEXT NOT NULL,
  implemented_date TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_interventions_student_seq
  ON interventions(student_pk, intervention_seq);
CREATE INDEX IF NOT EXISTS idx_interventions_prediction
  ON interventions(prediction_seq);

CREATE TABLE IF NOT EXISTS outcomes (
  student_pk INTEGER PRIMARY KEY REFERENCES students(student_pk) ON DELETE CASCADE,
  final_result TEXT NOT NULL CHECK (
    final_result IN ('Pass', 'Fail', 'Withdrawn', 'Distinction')
  ),
  predicted_correctly INTEGER CHECK (
    predicted_correctly IN (0, 1) OR predicted_correctly IS NULL
  ),
  intervention_applied INTEGER NOT NULL CHECK (intervention_applied IN (0, 1)),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

pub struct SqliteRiskStore {
    conn: Connection,
    band_policy: RiskBandPolicy,
}

/// Per-table row counts removed by one student deletion.
///
/// Cascade deletion is irreversible; callers surface this report instead of
/// silently dropping dependents.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct DeletionReport {
    pub id_student: StudentId,
    pub engagement_rows: usize,
    pub assessment_rows: usize,
    pub prediction_rows: usize,
    pub intervention_rows: usize,
    pub outcome_rows: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub code: String,
    pub severity: IntegrityIssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub healthy: bool,
    pub student_rows: usize,
    pub feature_rows: usize,
    pub engagement_rows: usize,
    pub assessment_rows: usize,
    pub outcome_rows: usize,
    pub prediction_rows: usize,
    pub intervention_rows: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl SqliteRiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_policy(path, RiskBandPolicy::v1())
    }

    pub fn open_with_policy(path: &Path, band_policy: RiskBandPolicy) -> Result<Self> {
        band_policy.validate()?;

        let conn = Connection::open(path).map_err(|err| {
            RiskDataError::Storage(format!(
                "failed to open sqlite database at {}: {err}",
                path.display()
            ))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|err| RiskDataError::Storage(format!("failed to configure pragmas: {err}")))?;

        Ok(Self { conn, band_policy })
    }

    #[must_use]
    pub fn band_policy(&self) -> RiskBandPolicy {
        self.band_policy
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .map_err(|err| {
                RiskDataError::Storage(format!("failed to ensure schema_migrations: {err}"))
            })?;

        self.conn
            .execute_batch(SCHEMA_RISK_V1)
            .map_err(|err| RiskDataError::Storage(format!("failed to apply schema: {err}")))?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![RISK_MIGRATION_VERSION, now],
            )
            .map_err(|err| {
                RiskDataError::Storage(format!("failed to register schema migration: {err}"))
            })?;

        Ok(())
    }

    pub fn upsert_student(&mut self, record: &StudentRecord) -> Result<Student> {
        record.validate()?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO students(
                    id_student, code_module, code_presentation, gender_code, region_code,
                    age_band_code, education_code, is_male, has_disability, unregistered,
                    studied_credits, num_prev_attempts, registration_delay,
                    created_at, updated_at
                 ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13,
                    ?14, ?15
                 )
                 ON CONFLICT(id_student) DO UPDATE SET
                    code_module = excluded.code_module,
                    code_presentation = excluded.code_presentation,
                    gender_code = excluded.gender_code,
                    region_code = excluded.region_code,
                    age_band_code = excluded.age_band_code,
                    education_code = excluded.education_code,
                    is_male = excluded.is_male,
                    has_disability = excluded.has_disability,
                    unregistered = excluded.unregistered,
                    studied_credits = excluded.studied_credits,
                    num_prev_attempts = excluded.num_prev_attempts,
                    registration_delay = excluded.registration_delay,
                    updated_at = excluded.updated_at",
                params![
                    record.id_student.0,
                    record.code_module,
                    record.code_presentation,
                    record.gender_code,
                    record.region_code,
                    record.age_band_code,
                    record.education_code,
                    bool_to_sql(record.is_male),
                    bool_to_sql(record.has_disability),
                    bool_to_sql(record.unregistered),
                    record.studied_credits,
                    record.num_prev_attempts,
                    record.registration_delay,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to upsert student", &err))?;

        self.get_student(record.id_student)?.ok_or_else(|| {
            RiskDataError::Storage(format!(
                "student {} missing after upsert",
                record.id_student
            ))
        })
    }

    pub fn get_student(&self, id_student: StudentId) -> Result<Option<Student>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    id_student, code_module, code_presentation, gender_code, region_code,
                    age_band_code, education_code, is_male, has_disability, unregistered,
                    studied_credits, num_prev_attempts, registration_delay,
                    created_at, updated_at
                 FROM students
                 WHERE id_student = ?1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare student lookup", &err))?;

        stmt.query_row(params![id_student.0], parse_student_row)
            .optional()
            .map_err(|err| map_sqlite_error("failed to load student", &err))
    }

    pub fn list_students(&self) -> Result<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    id_student, code_module, code_presentation, gender_code, region_code,
                    age_band_code, education_code, is_male, has_disability, unregistered,
                    studied_credits, num_prev_attempts, registration_delay,
                    created_at, updated_at
                 FROM students
                 ORDER BY id_student ASC",
            )
            .map_err(|err| map_sqlite_error("failed to prepare student list", &err))?;

        let rows = stmt
            .query_map([], parse_student_row)
            .map_err(|err| map_sqlite_error("failed to list students", &err))?;

        collect_rows("failed to read student row", rows)
    }

    /// Deletes one student and, through the schema's cascades, every
    /// dependent row. Returns the per-table counts that were removed.
    pub fn delete_student(&mut self, id_student: StudentId) -> Result<DeletionReport> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| RiskDataError::Storage(format!("failed to start delete: {err}")))?;

        let student_pk = lookup_student_pk(&tx, id_student)?
            .ok_or_else(|| RiskDataError::Referential(format!("unknown student {id_student}")))?;

        let report = DeletionReport {
            id_student,
            engagement_rows: count_dependents(&tx, "engagement_features", student_pk)?,
            assessment_rows: count_dependents(&tx, "assessment_features", student_pk)?,
            prediction_rows: count_dependents(&tx, "risk_predictions", student_pk)?,
            intervention_rows: count_dependents(&tx, "interventions", student_pk)?,
            outcome_rows: count_dependents(&tx, "outcomes", student_pk)?,
        };

        tx.execute(
            "DELETE FROM students WHERE student_pk = ?1",
            params![student_pk],
        )
        .map_err(|err| map_sqlite_error("failed to delete student", &err))?;

        tx.commit()
            .map_err(|err| RiskDataError::Storage(format!("failed to commit delete: {err}")))?;

        Ok(report)
    }

    /// Unconditional insert; a second call for the same student fails with
    /// a uniqueness violation instead of replacing the singleton row.
    pub fn insert_engagement(
        &mut self,
        id_student: StudentId,
        input: &EngagementFeaturesInput,
    ) -> Result<EngagementFeatures> {
        input.validate()?;
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO engagement_features(
                    student_pk, total_clicks, mean_clicks, std_clicks, max_clicks,
                    active_days, first_access, last_access, click_consistency,
                    clicks_per_active_day, engagement_range, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    student_pk,
                    input.total_clicks,
                    input.mean_clicks,
                    input.std_clicks,
                    input.max_clicks,
                    input.active_days,
                    input.first_access,
                    input.last_access,
                    input.click_consistency,
                    input.clicks_per_active_day,
                    input.engagement_range,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to insert engagement features", &err))?;

        self.require_engagement(id_student)
    }

    pub fn upsert_engagement(
        &mut self,
        id_student: StudentId,
        input: &EngagementFeaturesInput,
    ) -> Result<EngagementFeatures> {
        input.validate()?;
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO engagement_features(
                    student_pk, total_clicks, mean_clicks, std_clicks, max_clicks,
                    active_days, first_access, last_access, click_consistency,
                    clicks_per_active_day, engagement_range, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(student_pk) DO UPDATE SET
                    total_clicks = excluded.total_clicks,
                    mean_clicks = excluded.mean_clicks,
                    std_clicks = excluded.std_clicks,
                    max_clicks = excluded.max_clicks,
                    active_days = excluded.active_days,
                    first_access = excluded.first_access,
                    last_access = excluded.last_access,
                    click_consistency = excluded.click_consistency,
                    clicks_per_active_day = excluded.clicks_per_active_day,
                    engagement_range = excluded.engagement_range,
                    updated_at = excluded.updated_at",
                params![
                    student_pk,
                    input.total_clicks,
                    input.mean_clicks,
                    input.std_clicks,
                    input.max_clicks,
                    input.active_days,
                    input.first_access,
                    input.last_access,
                    input.click_consistency,
                    input.clicks_per_active_day,
                    input.engagement_range,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to upsert engagement features", &err))?;

        self.require_engagement(id_student)
    }

    pub fn get_engagement(&self, id_student: StudentId) -> Result<Option<EngagementFeatures>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    s.id_student, e.total_clicks, e.mean_clicks, e.std_clicks, e.max_clicks,
                    e.active_days, e.first_access, e.last_access, e.click_consistency,
                    e.clicks_per_active_day, e.engagement_range, e.created_at, e.updated_at
                 FROM engagement_features e
                 JOIN students s ON s.student_pk = e.student_pk
                 WHERE s.id_student = ?1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare engagement lookup", &err))?;

        stmt.query_row(params![id_student.0], |row| {
            let id_student = StudentId(row.get(0)?);
            parse_engagement_at(row, 1, id_student)
        })
        .optional()
        .map_err(|err| map_sqlite_error("failed to load engagement features", &err))
    }

    pub fn insert_assessment(
        &mut self,
        id_student: StudentId,
        input: &AssessmentFeaturesInput,
    ) -> Result<AssessmentFeatures> {
        input.validate()?;
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO assessment_features(
                    student_pk, scores_count, avg_score, std_score, min_score, max_score,
                    submitted_count, missing_count, banked_count, total_weight,
                    submission_rate, score_range, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    student_pk,
                    input.scores_count,
                    input.avg_score,
                    input.std_score,
                    input.min_score,
                    input.max_score,
                    input.submitted_count,
                    input.missing_count,
                    input.banked_count,
                    input.total_weight,
                    input.submission_rate,
                    input.score_range,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to insert assessment features", &err))?;

        self.require_assessment(id_student)
    }

    pub fn upsert_assessment(
        &mut self,
        id_student: StudentId,
        input: &AssessmentFeaturesInput,
    ) -> Result<AssessmentFeatures> {
        input.validate()?;
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO assessment_features(
                    student_pk, scores_count, avg_score, std_score, min_score, max_score,
                    submitted_count, missing_count, banked_count, total_weight,
                    submission_rate, score_range, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(student_pk) DO UPDATE SET
                    scores_count = excluded.scores_count,
                    avg_score = excluded.avg_score,
                    std_score = excluded.std_score,
                    min_score = excluded.min_score,
                    max_score = excluded.max_score,
                    submitted_count = excluded.submitted_count,
                    missing_count = excluded.missing_count,
                    banked_count = excluded.banked_count,
                    total_weight = excluded.total_weight,
                    submission_rate = excluded.submission_rate,
                    score_range = excluded.score_range,
                    updated_at = excluded.updated_at",
                params![
                    student_pk,
                    input.scores_count,
                    input.avg_score,
                    input.std_score,
                    input.min_score,
                    input.max_score,
                    input.submitted_count,
                    input.missing_count,
                    input.banked_count,
                    input.total_weight,
                    input.submission_rate,
                    input.score_range,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to upsert assessment features", &err))?;

        self.require_assessment(id_student)
    }

    pub fn get_assessment(&self, id_student: StudentId) -> Result<Option<AssessmentFeatures>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    s.id_student, a.scores_count, a.avg_score, a.std_score, a.min_score,
                    a.max_score, a.submitted_count, a.missing_count, a.banked_count,
                    a.total_weight, a.submission_rate, a.score_range, a.created_at, a.updated_at
                 FROM assessment_features a
                 JOIN students s ON s.student_pk = a.student_pk
                 WHERE s.id_student = ?1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare assessment lookup", &err))?;

        stmt.query_row(params![id_student.0], |row| {
            let id_student = StudentId(row.get(0)?);
            parse_assessment_at(row, 1, id_student)
        })
        .optional()
        .map_err(|err| map_sqlite_error("failed to load assessment features", &err))
    }

    pub fn insert_outcome(
        &mut self,
        id_student: StudentId,
        record: &OutcomeRecord,
    ) -> Result<Outcome> {
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO outcomes(
                    student_pk, final_result, predicted_correctly, intervention_applied,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    student_pk,
                    record.final_result.as_str(),
                    record.predicted_correctly.map(bool_to_sql),
                    bool_to_sql(record.intervention_applied),
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to insert outcome", &err))?;

        self.require_outcome(id_student)
    }

    pub fn upsert_outcome(
        &mut self,
        id_student: StudentId,
        record: &OutcomeRecord,
    ) -> Result<Outcome> {
        let student_pk = self.require_student_pk(id_student)?;

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "INSERT INTO outcomes(
                    student_pk, final_result, predicted_correctly, intervention_applied,
                    created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(student_pk) DO UPDATE SET
                    final_result = excluded.final_result,
                    predicted_correctly = excluded.predicted_correctly,
                    intervention_applied = excluded.intervention_applied,
                    updated_at = excluded.updated_at",
                params![
                    student_pk,
                    record.final_result.as_str(),
                    record.predicted_correctly.map(bool_to_sql),
                    bool_to_sql(record.intervention_applied),
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to upsert outcome", &err))?;

        self.require_outcome(id_student)
    }

    pub fn get_outcome(&self, id_student: StudentId) -> Result<Option<Outcome>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    s.id_student, o.final_result, o.predicted_correctly,
                    o.intervention_applied, o.created_at, o.updated_at
                 FROM outcomes o
                 JOIN students s ON s.student_pk = o.student_pk
                 WHERE s.id_student = ?1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare outcome lookup", &err))?;

        stmt.query_row(params![id_student.0], |row| {
            let id_student = StudentId(row.get(0)?);
            parse_outcome_at(row, 1, id_student)
        })
        .optional()
        .map_err(|err| map_sqlite_error("failed to load outcome", &err))
    }

    /// Appends one scoring event. The row is immutable once written; the
    /// category/score pairing is checked against the configured band policy
    /// before anything touches the database.
    pub fn append_prediction(
        &mut self,
        id_student: StudentId,
        input: &RiskPredictionInput,
    ) -> Result<RiskPrediction> {
        input.validate()?;
        self.band_policy.check(input.risk_score, input.risk_category)?;

        let student_pk = self.require_student_pk(id_student)?;
        let prediction_id = match input.prediction_id {
            Some(value) => value,
            None => Ulid::new(),
        };
        let recorded_at = now_utc();

        let tx = self
            .conn
            .transaction()
            .map_err(|err| RiskDataError::Storage(format!("failed to start append: {err}")))?;

        tx.execute(
            "INSERT INTO risk_predictions(
                prediction_id, student_pk, risk_score, risk_category,
                needs_intervention, model_version, confidence_score,
                scored_at, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prediction_id.to_string(),
                student_pk,
                input.risk_score,
                input.risk_category.as_str(),
                bool_to_sql(input.needs_intervention),
                input.model_version,
                input.confidence_score,
                format_rfc3339(input.scored_at)?,
                format_rfc3339(recorded_at)?,
            ],
        )
        .map_err(|err| map_sqlite_error("failed to append prediction", &err))?;

        let prediction_seq = tx.last_insert_rowid();
        tx.commit()
            .map_err(|err| RiskDataError::Storage(format!("failed to commit append: {err}")))?;

        Ok(RiskPrediction {
            prediction_seq,
            prediction_id,
            id_student,
            risk_score: input.risk_score,
            risk_category: input.risk_category,
            needs_intervention: input.needs_intervention,
            model_version: input.model_version.clone(),
            confidence_score: input.confidence_score,
            scored_at: input.scored_at,
            recorded_at,
        })
    }

    pub fn latest_prediction(&self, id_student: StudentId) -> Result<Option<RiskPrediction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    p.prediction_seq, p.prediction_id, s.id_student, p.risk_score,
                    p.risk_category, p.needs_intervention, p.model_version,
                    p.confidence_score, p.scored_at, p.recorded_at
                 FROM risk_predictions p
                 JOIN students s ON s.student_pk = p.student_pk
                 WHERE s.id_student = ?1
                 ORDER BY p.prediction_seq DESC
                 LIMIT 1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare latest prediction", &err))?;

        stmt.query_row(params![id_student.0], parse_prediction_row)
            .optional()
            .map_err(|err| map_sqlite_error("failed to load latest prediction", &err))
    }

    pub fn list_predictions(
        &self,
        id_student: StudentId,
        limit: Option<usize>,
    ) -> Result<Vec<RiskPrediction>> {
        let mut query = "SELECT
                p.prediction_seq, p.prediction_id, s.id_student, p.risk_score,
                p.risk_category, p.needs_intervention, p.model_version,
                p.confidence_score, p.scored_at, p.recorded_at
             FROM risk_predictions p
             JOIN students s ON s.student_pk = p.student_pk
             WHERE s.id_student = ?1
             ORDER BY p.prediction_seq ASC"
            .to_string();

        if let Some(raw_limit) = limit {
            query.push_str(" LIMIT ");
            query.push_str(&raw_limit.to_string());
        }

        let mut stmt = self
            .conn
            .prepare(&query)
            .map_err(|err| map_sqlite_error("failed to prepare prediction list", &err))?;

        let rows = stmt
            .query_map(params![id_student.0], parse_prediction_row)
            .map_err(|err| map_sqlite_error("failed to list predictions", &err))?;

        collect_rows("failed to read prediction row", rows)
    }

    /// Records a new intervention. The initial status is always
    /// Recommended; an optional triggering prediction must exist and belong
    /// to the same student.
    pub fn create_intervention(
        &mut self,
        id_student: StudentId,
        input: &InterventionInput,
    ) -> Result<Intervention> {
        input.validate()?;
        let student_pk = self.require_student_pk(id_student)?;

        let prediction_seq = match input.prediction_id {
            Some(prediction_id) => {
                let row = self
                    .conn
                    .prepare(
                        "SELECT prediction_seq, student_pk
                         FROM risk_predictions
                         WHERE prediction_id = ?1",
                    )
                    .and_then(|mut stmt| {
                        stmt.query_row(params![prediction_id.to_string()], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                        })
                        .optional()
                    })
                    .map_err(|err| map_sqlite_error("failed to resolve prediction", &err))?;

                let (seq, owner_pk) = row.ok_or_else(|| {
                    RiskDataError::Referential(format!("unknown prediction {prediction_id}"))
                })?;

                if owner_pk != student_pk {
                    return Err(RiskDataError::Referential(format!(
                        "prediction {prediction_id} belongs to a different student"
                    )));
                }

                Some(seq)
            }
            None => None,
        };

        let intervention_id = match input.intervention_id {
            Some(value) => value,
            None => Ulid::new(),
        };
        let now = format_rfc3339(now_utc())?;

        self.conn
            .execute(
                "INSERT INTO interventions(
                    intervention_id, student_pk, prediction_seq, intervention_type,
                    description, priority_level, status, effectiveness_score,
                    recommended_at, implemented_date, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, NULL, ?9, ?10)",
                params![
                    intervention_id.to_string(),
                    student_pk,
                    prediction_seq,
                    input.intervention_type,
                    input.description,
                    input.priority_level.as_str(),
                    InterventionStatus::Recommended.as_str(),
                    format_rfc3339(input.recommended_at)?,
                    now,
                    now,
                ],
            )
            .map_err(|err| map_sqlite_error("failed to create intervention", &err))?;

        self.require_intervention(intervention_id)
    }

    /// Moves an intervention along its lifecycle. `implemented_date` is
    /// stamped exactly once, on Recommended -> In Progress;
    /// `effectiveness_score` is only accepted together with a transition
    /// into Completed.
    pub fn transition_intervention(
        &mut self,
        intervention_id: Ulid,
        target: InterventionStatus,
        effectiveness_score: Option<f64>,
    ) -> Result<Intervention> {
        if let Some(score) = effectiveness_score {
            if target != InterventionStatus::Completed {
                return Err(RiskDataError::Validation(
                    "effectiveness_score is only accepted when completing".to_string(),
                ));
            }
            if !(0.0..=1.0).contains(&score) {
                return Err(RiskDataError::Validation(
                    "effectiveness_score MUST be in [0.0, 1.0]".to_string(),
                ));
            }
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|err| RiskDataError::Storage(format!("failed to start transition: {err}")))?;

        let row = tx
            .prepare(
                "SELECT intervention_seq, status FROM interventions WHERE intervention_id = ?1",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![intervention_id.to_string()], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .optional()
            })
            .map_err(|err| map_sqlite_error("failed to load intervention", &err))?;

        let (intervention_seq, status_raw) = row.ok_or_else(|| {
            RiskDataError::Referential(format!("unknown intervention {intervention_id}"))
        })?;

        let current = InterventionStatus::parse(&status_raw).ok_or_else(|| {
            RiskDataError::Storage(format!("invalid stored status: {status_raw}"))
        })?;

        current.validate_transition(target)?;

        let now = format_rfc3339(now_utc())?;
        if current == InterventionStatus::Recommended && target == InterventionStatus::InProgress {
            tx.execute(
                "UPDATE interventions
                 SET status = ?1, implemented_date = ?2, updated_at = ?3
                 WHERE intervention_seq = ?4",
                params![target.as_str(), now, now, intervention_seq],
            )
            .map_err(|err| map_sqlite_error("failed to apply transition", &err))?;
        } else {
            tx.execute(
                "UPDATE interventions
                 SET status = ?1, effectiveness_score = ?2, updated_at = ?3
                 WHERE intervention_seq = ?4",
                params![target.as_str(), effectiveness_score, now, intervention_seq],
            )
            .map_err(|err| map_sqlite_error("failed to apply transition", &err))?;
        }

        tx.commit()
            .map_err(|err| RiskDataError::Storage(format!("failed to commit transition: {err}")))?;

        self.require_intervention(intervention_id)
    }

    /// Updates the effectiveness score of an intervention that has already
    /// reached Completed; any other status is rejected.
    pub fn set_effectiveness(
        &mut self,
        intervention_id: Ulid,
        effectiveness_score: f64,
    ) -> Result<Intervention> {
        if !(0.0..=1.0).contains(&effectiveness_score) {
            return Err(RiskDataError::Validation(
                "effectiveness_score MUST be in [0.0, 1.0]".to_string(),
            ));
        }

        let current = self.get_intervention(intervention_id)?.ok_or_else(|| {
            RiskDataError::Referential(format!("unknown intervention {intervention_id}"))
        })?;

        if current.status != InterventionStatus::Completed {
            return Err(RiskDataError::StateTransition(format!(
                "effectiveness_score can only be set while Completed, status is {}",
                current.status.as_str()
            )));
        }

        let now = format_rfc3339(now_utc())?;
        self.conn
            .execute(
                "UPDATE interventions
                 SET effectiveness_score = ?1, updated_at = ?2
                 WHERE intervention_id = ?3",
                params![effectiveness_score, now, intervention_id.to_string()],
            )
            .map_err(|err| map_sqlite_error("failed to set effectiveness", &err))?;

        self.require_intervention(intervention_id)
    }

    pub fn get_intervention(&self, intervention_id: Ulid) -> Result<Option<Intervention>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    i.intervention_seq, i.intervention_id, s.id_student, p.prediction_id,
                    i.intervention_type, i.description, i.priority_level, i.status,
                    i.effectiveness_score, i.recommended_at, i.implemented_date,
                    i.created_at, i.updated_at
                 FROM interventions i
                 JOIN students s ON s.student_pk = i.student_pk
                 LEFT JOIN risk_predictions p ON p.prediction_seq = i.prediction_seq
                 WHERE i.intervention_id = ?1",
            )
            .map_err(|err| map_sqlite_error("failed to prepare intervention lookup", &err))?;

        stmt.query_row(params![intervention_id.to_string()], parse_intervention_row)
            .optional()
            .map_err(|err| map_sqlite_error("failed to load intervention", &err))
    }

    pub fn list_interventions(&self, id_student: StudentId) -> Result<Vec<Intervention>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT
                    i.intervention_seq, i.intervention_id, s.id_student, p.prediction_id,
                    i.intervention_type, i.description, i.priority_level, i.status,
                    i.effectiveness_score, i.recommended_at, i.implemented_date,
                    i.created_at, i.updated_at
                 FROM interventions i
                 JOIN students s ON s.student_pk = i.student_pk
                 LEFT JOIN risk_predictions p ON p.prediction_seq = i.prediction_seq
                 WHERE s.id_student = ?1
                 ORDER BY i.intervention_seq ASC",
            )
            .map_err(|err| map_sqlite_error("failed to prepare intervention list", &err))?;

        let rows = stmt
            .query_map(params![id_student.0], parse_intervention_row)
            .map_err(|err| map_sqlite_error("failed to list interventions", &err))?;

        collect_rows("failed to read intervention row", rows)
    }

    /// One denormalized feature row, or `None` for an unknown student.
    /// Always a live read; missing dependents stay `None`, never zero.
    pub fn feature_row(&self, id_student: StudentId) -> Result<Option<FeatureRow>> {
        let mut stmt = self
            .conn
            .prepare(&feature_query("WHERE s.id_student = ?1"))
            .map_err(|err| map_sqlite_error("failed to prepare feature row", &err))?;

        stmt.query_row(params![id_student.0], parse_feature_row)
            .optional()
            .map_err(|err| map_sqlite_error("failed to load feature row", &err))
    }

    /// The full feature table: exactly one row per student, regardless of
    /// which dependents exist.
    pub fn feature_table(&self) -> Result<Vec<FeatureRow>> {
        let mut stmt = self
            .conn
            .prepare(&feature_query(""))
            .map_err(|err| map_sqlite_error("failed to prepare feature table", &err))?;

        let rows = stmt
            .query_map([], parse_feature_row)
            .map_err(|err| map_sqlite_error("failed to read feature table", &err))?;

        collect_rows("failed to read feature row", rows)
    }

    /// Read-only invariant sweep over the whole store.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let student_rows = self.count_table("students")?;
        let engagement_rows = self.count_table("engagement_features")?;
        let assessment_rows = self.count_table("assessment_features")?;
        let outcome_rows = self.count_table("outcomes")?;
        let prediction_rows = self.count_table("risk_predictions")?;
        let intervention_rows = self.count_table("interventions")?;
        let feature_rows = self.feature_table()?.len();

        let mut issues = Vec::new();

        if feature_rows != student_rows {
            issues.push(IntegrityIssue {
                code: "feature_view_parity".to_string(),
                severity: IntegrityIssueSeverity::Error,
                message: format!(
                    "feature view returned {feature_rows} rows for {student_rows} students"
                ),
            });
        }

        let misplaced_effectiveness = self.count_query(
            "SELECT COUNT(*) FROM interventions
             WHERE effectiveness_score IS NOT NULL AND status != 'Completed'",
        )?;
        if misplaced_effectiveness > 0 {
            issues.push(IntegrityIssue {
                code: "effectiveness_outside_completed".to_string(),
                severity: IntegrityIssueSeverity::Error,
                message: format!(
                    "{misplaced_effectiveness} interventions carry an effectiveness score without being Completed"
                ),
            });
        }

        let missing_implemented = self.count_query(
            "SELECT COUNT(*) FROM interventions
             WHERE status IN ('In Progress', 'Completed') AND implemented_date IS NULL",
        )?;
        if missing_implemented > 0 {
            issues.push(IntegrityIssue {
                code: "missing_implemented_date".to_string(),
                severity: IntegrityIssueSeverity::Error,
                message: format!(
                    "{missing_implemented} started interventions have no implemented_date"
                ),
            });
        }

        let premature_implemented = self.count_query(
            "SELECT COUNT(*) FROM interventions
             WHERE status = 'Recommended' AND implemented_date IS NOT NULL",
        )?;
        if premature_implemented > 0 {
            issues.push(IntegrityIssue {
                code: "implemented_before_start".to_string(),
                severity: IntegrityIssueSeverity::Error,
                message: format!(
                    "{premature_implemented} recommended interventions already carry an implemented_date"
                ),
            });
        }

        if self.band_policy.enforce {
            let mismatched = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM risk_predictions
                     WHERE (risk_score <= ?1 AND risk_category != 'Low Risk')
                        OR (risk_score > ?1 AND risk_score <= ?2 AND risk_category != 'Medium Risk')
                        OR (risk_score > ?2 AND risk_category != 'High Risk')",
                    params![self.band_policy.low_max, self.band_policy.medium_max],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(|err| map_sqlite_error("failed to count band mismatches", &err))?;

            if mismatched > 0 {
                // Historical rows may predate the current thresholds.
                issues.push(IntegrityIssue {
                    code: "band_mismatch".to_string(),
                    severity: IntegrityIssueSeverity::Warning,
                    message: format!(
                        "{mismatched} predictions disagree with the current band policy"
                    ),
                });
            }
        }

        let healthy = !issues
            .iter()
            .any(|issue| issue.severity == IntegrityIssueSeverity::Error);

        Ok(IntegrityReport {
            healthy,
            student_rows,
            feature_rows,
            engagement_rows,
            assessment_rows,
            outcome_rows,
            prediction_rows,
            intervention_rows,
            issues,
        })
    }

    fn require_student_pk(&self, id_student: StudentId) -> Result<i64> {
        lookup_student_pk(&self.conn, id_student)?
            .ok_or_else(|| RiskDataError::Referential(format!("unknown student {id_student}")))
    }

    fn require_engagement(&self, id_student: StudentId) -> Result<EngagementFeatures> {
        self.get_engagement(id_student)?.ok_or_else(|| {
            RiskDataError::Storage(format!(
                "engagement features missing after write for student {id_student}"
            ))
        })
    }

    fn require_assessment(&self, id_student: StudentId) -> Result<AssessmentFeatures> {
        self.get_assessment(id_student)?.ok_or_else(|| {
            RiskDataError::Storage(format!(
                "assessment features missing after write for student {id_student}"
            ))
        })
    }

    fn require_outcome(&self, id_student: StudentId) -> Result<Outcome> {
        self.get_outcome(id_student)?.ok_or_else(|| {
            RiskDataError::Storage(format!(
                "outcome missing after write for student {id_student}"
            ))
        })
    }

    fn require_intervention(&self, intervention_id: Ulid) -> Result<Intervention> {
        self.get_intervention(intervention_id)?.ok_or_else(|| {
            RiskDataError::Storage(format!(
                "intervention {intervention_id} missing after write"
            ))
        })
    }

    fn count_table(&self, table_name: &str) -> Result<usize> {
        self.count_query(&format!("SELECT COUNT(*) FROM {table_name}"))
    }

    fn count_query(&self, sql: &str) -> Result<usize> {
        let count = self
            .conn
            .query_row(sql, [], |row| row.get::<_, i64>(0))
            .map_err(|err| map_sqlite_error("failed to count rows", &err))?;

        usize::try_from(count)
            .map_err(|_| RiskDataError::Storage(format!("invalid row count: {count}")))
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn feature_query(filter: &str) -> String {
    format!(
        "SELECT
            s.id_student, s.code_module, s.code_presentation, s.gender_code, s.region_code,
            s.age_band_code, s.education_code, s.is_male, s.has_disability, s.unregistered,
            s.studied_credits, s.num_prev_attempts, s.registration_delay,
            s.created_at, s.updated_at,
            e.student_pk, e.total_clicks, e.mean_clicks, e.std_clicks, e.max_clicks,
            e.active_days, e.first_access, e.last_access, e.click_consistency,
            e.clicks_per_active_day, e.engagement_range, e.created_at, e.updated_at,
            a.student_pk, a.scores_count, a.avg_score, a.std_score, a.min_score,
            a.max_score, a.submitted_count, a.missing_count, a.banked_count,
            a.total_weight, a.submission_rate, a.score_range, a.created_at, a.updated_at,
            o.student_pk, o.final_result, o.predicted_correctly, o.intervention_applied,
            o.created_at, o.updated_at
         FROM students s
         LEFT JOIN engagement_features e ON e.student_pk = s.student_pk
         LEFT JOIN assessment_features a ON a.student_pk = s.student_pk
         LEFT JOIN outcomes o ON o.student_pk = s.student_pk
         {filter}
         ORDER BY s.id_student ASC"
    )
}

fn lookup_student_pk(conn: &Connection, id_student: StudentId) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT student_pk FROM students WHERE id_student = ?1",
        params![id_student.0],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map_err(|err| map_sqlite_error("failed to resolve student", &err))
}

fn count_dependents(conn: &Connection, table_name: &str, student_pk: i64) -> Result<usize> {
    let count = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {table_name} WHERE student_pk = ?1"),
            params![student_pk],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|err| map_sqlite_error("failed to count dependents", &err))?;

    usize::try_from(count)
        .map_err(|_| RiskDataError::Storage(format!("invalid dependent count: {count}")))
}

fn parse_student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id_student: StudentId(row.get(0)?),
        code_module: row.get(1)?,
        code_presentation: row.get(2)?,
        gender_code: row.get(3)?,
        region_code: row.get(4)?,
        age_band_code: row.get(5)?,
        education_code: row.get(6)?,
        is_male: row.get::<_, i64>(7)? == 1,
        has_disability: row.get::<_, i64>(8)? == 1,
        unregistered: row.get::<_, i64>(9)? == 1,
        studied_credits: row.get(10)?,
        num_prev_attempts: row.get(11)?,
        registration_delay: row.get(12)?,
        created_at: parse_ts(row, 13)?,
        updated_at: parse_ts(row, 14)?,
    })
}

fn parse_engagement_at(
    row: &rusqlite::Row<'_>,
    base: usize,
    id_student: StudentId,
) -> rusqlite::Result<EngagementFeatures> {
    Ok(EngagementFeatures {
        id_student,
        total_clicks: row.get(base)?,
        mean_clicks: row.get(base + 1)?,
        std_clicks: row.get(base + 2)?,
        max_clicks: row.get(base + 3)?,
        active_days: row.get(base + 4)?,
        first_access: row.get(base + 5)?,
        last_access: row.get(base + 6)?,
        click_consistency: row.get(base + 7)?,
        clicks_per_active_day: row.get(base + 8)?,
        engagement_range: row.get(base + 9)?,
        created_at: parse_ts(row, base + 10)?,
        updated_at: parse_ts(row, base + 11)?,
    })
}

fn parse_assessment_at(
    row: &rusqlite::Row<'_>,
    base: usize,
    id_student: StudentId,
) -> rusqlite::Result<AssessmentFeatures> {
    Ok(AssessmentFeatures {
        id_student,
        scores_count: row.get(base)?,
        avg_score: row.get(base + 1)?,
        std_score: row.get(base + 2)?,
        min_score: row.get(base + 3)?,
        max_score: row.get(base + 4)?,
        submitted_count: row.get(base + 5)?,
        missing_count: row.get(base + 6)?,
        banked_count: row.get(base + 7)?,
        total_weight: row.get(base + 8)?,
        submission_rate: row.get(base + 9)?,
        score_range: row.get(base + 10)?,
        created_at: parse_ts(row, base + 11)?,
        updated_at: parse_ts(row, base + 12)?,
    })
}

fn parse_outcome_at(
    row: &rusqlite::Row<'_>,
    base: usize,
    id_student: StudentId,
) -> rusqlite::Result<Outcome> {
    let final_result_raw: String = row.get(base)?;
    let final_result = FinalResult::parse(&final_result_raw)
        .ok_or_else(|| invalid_column(base, format!("invalid final_result: {final_result_raw}")))?;

    Ok(Outcome {
        id_student,
        final_result,
        predicted_correctly: row.get::<_, Option<i64>>(base + 1)?.map(|value| value == 1),
        intervention_applied: row.get::<_, i64>(base + 2)? == 1,
        created_at: parse_ts(row, base + 3)?,
        updated_at: parse_ts(row, base + 4)?,
    })
}

fn parse_prediction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RiskPrediction> {
    let prediction_id_raw: String = row.get(1)?;
    let prediction_id = Ulid::from_string(&prediction_id_raw).map_err(|_| {
        invalid_column(1, format!("invalid prediction_id ULID: {prediction_id_raw}"))
    })?;

    let risk_category_raw: String = row.get(4)?;
    let risk_category = RiskCategory::parse(&risk_category_raw)
        .ok_or_else(|| invalid_column(4, format!("invalid risk_category: {risk_category_raw}")))?;

    Ok(RiskPrediction {
        prediction_seq: row.get(0)?,
        prediction_id,
        id_student: StudentId(row.get(2)?),
        risk_score: row.get(3)?,
        risk_category,
        needs_intervention: row.get::<_, i64>(5)? == 1,
        model_version: row.get(6)?,
        confidence_score: row.get(7)?,
        scored_at: parse_ts(row, 8)?,
        recorded_at: parse_ts(row, 9)?,
    })
}

fn parse_intervention_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Intervention> {
    let intervention_id_raw: String = row.get(1)?;
    let intervention_id = Ulid::from_string(&intervention_id_raw).map_err(|_| {
        invalid_column(
            1,
            format!("invalid intervention_id ULID: {intervention_id_raw}"),
        )
    })?;

    let prediction_id = row
        .get::<_, Option<String>>(3)?
        .as_deref()
        .map(|raw| {
            Ulid::from_string(raw)
                .map_err(|_| invalid_column(3, format!("invalid prediction_id ULID: {raw}")))
        })
        .transpose()?;

    let priority_raw: String = row.get(6)?;
    let priority_level = PriorityLevel::parse(&priority_raw)
        .ok_or_else(|| invalid_column(6, format!("invalid priority_level: {priority_raw}")))?;

    let status_raw: String = row.get(7)?;
    let status = InterventionStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(7, format!("invalid status: {status_raw}")))?;

    Ok(Intervention {
        intervention_seq: row.get(0)?,
        intervention_id,
        id_student: StudentId(row.get(2)?),
        prediction_id,
        intervention_type: row.get(4)?,
        description: row.get(5)?,
        priority_level,
        status,
        effectiveness_score: row.get(8)?,
        recommended_at: parse_ts(row, 9)?,
        implemented_date: parse_ts_opt(row, 10)?,
        created_at: parse_ts(row, 11)?,
        updated_at: parse_ts(row, 12)?,
    })
}

fn parse_feature_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeatureRow> {
    let student = parse_student_row(row)?;
    let id_student = student.id_student;

    let engagement = match row.get::<_, Option<i64>>(15)? {
        Some(_) => Some(parse_engagement_at(row, 16, id_student)?),
        None => None,
    };

    let assessment = match row.get::<_, Option<i64>>(28)? {
        Some(_) => Some(parse_assessment_at(row, 29, id_student)?),
        None => None,
    };

    let outcome = match row.get::<_, Option<i64>>(42)? {
        Some(_) => Some(parse_outcome_at(row, 43, id_student)?),
        None => None,
    };

    Ok(FeatureRow {
        student,
        engagement,
        assessment,
        outcome,
    })
}

fn parse_ts(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<OffsetDateTime> {
    parse_rfc3339_utc(&row.get::<_, String>(index)?)
        .map_err(|err| invalid_column(index, err.to_string()))
}

fn parse_ts_opt(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    row.get::<_, Option<String>>(index)?
        .as_deref()
        .map(|value| parse_rfc3339_utc(value).map_err(|err| invalid_column(index, err.to_string())))
        .transpose()
}

fn invalid_column(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

fn map_sqlite_error(context: &str, err: &rusqlite::Error) -> RiskDataError {
    if let rusqlite::Error::SqliteFailure(code, message) = err {
        let detail = message.clone().unwrap_or_else(|| err.to_string());
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            return match code.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    RiskDataError::Uniqueness(format!("{context}: {detail}"))
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    RiskDataError::Referential(format!("{context}: {detail}"))
                }
                _ => RiskDataError::Validation(format!("{context}: {detail}")),
            };
        }
        return RiskDataError::Storage(format!("{context}: {detail}"));
    }

    RiskDataError::Storage(format!("{context}: {err}"))
}

fn collect_rows<T>(
    context: &str,
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row.map_err(|err| map_sqlite_error(context, &err))?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::too_many_lines)]

    use super::*;
    use proptest::prelude::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn fixture_store() -> SqliteRiskStore {
        let store = must(SqliteRiskStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn fixture_store_with_policy(policy: RiskBandPolicy) -> SqliteRiskStore {
        let store = must(SqliteRiskStore::open_with_policy(
            Path::new(":memory:"),
            policy,
        ));
        must(store.migrate());
        store
    }

    fn fixture_student(id_student: i64) -> StudentRecord {
        StudentRecord {
            id_student: StudentId(id_student),
            code_module: "AAA".to_string(),
            code_presentation: "2024B".to_string(),
            gender_code: 0,
            region_code: 4,
            age_band_code: 1,
            education_code: 2,
            is_male: false,
            has_disability: false,
            unregistered: false,
            studied_credits: 60,
            num_prev_attempts: 0,
            registration_delay: Some(-23.0),
        }
    }

    fn fixture_engagement() -> EngagementFeaturesInput {
        EngagementFeaturesInput {
            total_clicks: 120,
            mean_clicks: 4.0,
            std_clicks: 2.5,
            max_clicks: 18,
            active_days: 14,
            first_access: 0,
            last_access: 27,
            click_consistency: 0.62,
            clicks_per_active_day: 8.57,
            engagement_range: 27.0,
        }
    }

    fn fixture_assessment() -> AssessmentFeaturesInput {
        AssessmentFeaturesInput {
            scores_count: 3,
            avg_score: Some(71.5),
            std_score: Some(8.2),
            min_score: Some(62.0),
            max_score: Some(84.0),
            submitted_count: 3,
            missing_count: 1,
            banked_count: 0,
            total_weight: 30.0,
            submission_rate: 0.75,
            score_range: Some(22.0),
        }
    }

    fn fixture_prediction(risk_score: f64, risk_category: RiskCategory) -> RiskPredictionInput {
        RiskPredictionInput {
            prediction_id: None,
            risk_score,
            risk_category,
            needs_intervention: risk_category == RiskCategory::High,
            model_version: "gb-2024.1".to_string(),
            confidence_score: Some(0.9),
            scored_at: must(parse_rfc3339_utc("2024-03-01T12:00:00Z")),
        }
    }

    fn fixture_intervention(prediction_id: Option<Ulid>) -> InterventionInput {
        InterventionInput {
            intervention_id: None,
            prediction_id,
            intervention_type: "tutor outreach".to_string(),
            description: Some("weekly check-in call".to_string()),
            priority_level: PriorityLevel::High,
            recommended_at: must(parse_rfc3339_utc("2024-03-02T09:00:00Z")),
        }
    }

    fn seeded_student(store: &mut SqliteRiskStore, id_student: i64) -> StudentId {
        let student = must(store.upsert_student(&fixture_student(id_student)));
        student.id_student
    }

    #[test]
    fn migrate_is_idempotent() {
        let store = fixture_store();
        must(store.migrate());
    }

    #[test]
    fn upsert_student_preserves_created_at_and_refreshes_updated_at() {
        let mut store = fixture_store();
        let inserted = must(store.upsert_student(&fixture_student(1001)));

        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut changed = fixture_student(1001);
        changed.studied_credits = 120;
        let updated = must(store.upsert_student(&changed));

        assert_eq!(updated.created_at, inserted.created_at);
        assert!(updated.updated_at > inserted.updated_at);
        assert_eq!(updated.studied_credits, 120);
        assert_eq!(must(store.list_students()).len(), 1);
    }

    #[test]
    fn upsert_student_rejects_invalid_record() {
        let mut store = fixture_store();
        let mut record = fixture_student(1001);
        record.code_module = String::new();

        let result = store.upsert_student(&record);
        assert!(matches!(result, Err(RiskDataError::Validation(_))));
        assert_eq!(must(store.list_students()).len(), 0);
    }

    #[test]
    fn second_strict_engagement_insert_is_uniqueness_violation() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        must(store.insert_engagement(id, &fixture_engagement()));
        let result = store.insert_engagement(id, &fixture_engagement());

        assert!(matches!(result, Err(RiskDataError::Uniqueness(_))));
    }

    #[test]
    fn upsert_engagement_replaces_the_singleton_row() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let first = must(store.upsert_engagement(id, &fixture_engagement()));

        std::thread::sleep(std::time::Duration::from_millis(10));

        let mut replacement = fixture_engagement();
        replacement.total_clicks = 300;
        let second = must(store.upsert_engagement(id, &replacement));

        assert_eq!(second.total_clicks, 300);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let count = must(store.count_table("engagement_features"));
        assert_eq!(count, 1);
    }

    #[test]
    fn engagement_for_unknown_student_is_referential_error() {
        let mut store = fixture_store();
        let result = store.upsert_engagement(StudentId(404), &fixture_engagement());
        assert!(matches!(result, Err(RiskDataError::Referential(_))));
    }

    #[test]
    fn second_strict_outcome_insert_is_uniqueness_violation() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let record = OutcomeRecord {
            final_result: FinalResult::Pass,
            predicted_correctly: Some(true),
            intervention_applied: false,
        };
        must(store.insert_outcome(id, &record));

        let result = store.insert_outcome(id, &record);
        assert!(matches!(result, Err(RiskDataError::Uniqueness(_))));
    }

    #[test]
    fn schema_rejects_out_of_range_score_even_without_api_validation() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let student_pk = must(store.require_student_pk(id));

        let result = store.connection().execute(
            "INSERT INTO risk_predictions(
                prediction_id, student_pk, risk_score, risk_category,
                needs_intervention, model_version, confidence_score, scored_at, recorded_at
             ) VALUES (?1, ?2, 1.5, 'High Risk', 1, 'raw', NULL,
                       '2024-03-01T12:00:00Z', '2024-03-01T12:00:00Z')",
            params![Ulid::new().to_string(), student_pk],
        );

        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_unknown_risk_category_label() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let student_pk = must(store.require_student_pk(id));

        let result = store.connection().execute(
            "INSERT INTO risk_predictions(
                prediction_id, student_pk, risk_score, risk_category,
                needs_intervention, model_version, confidence_score, scored_at, recorded_at
             ) VALUES (?1, ?2, 0.5, 'Severe Risk', 0, 'raw', NULL,
                       '2024-03-01T12:00:00Z', '2024-03-01T12:00:00Z')",
            params![Ulid::new().to_string(), student_pk],
        );

        assert!(result.is_err());
    }

    #[test]
    fn append_prediction_rejects_out_of_range_score() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let result = store.append_prediction(id, &fixture_prediction(1.2, RiskCategory::High));
        assert!(matches!(result, Err(RiskDataError::Validation(_))));
    }

    #[test]
    fn append_prediction_rejects_band_mismatch() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let result = store.append_prediction(id, &fixture_prediction(0.9, RiskCategory::Low));
        assert!(matches!(result, Err(RiskDataError::Consistency(_))));
    }

    #[test]
    fn disabled_band_policy_accepts_any_pairing() {
        let mut store = fixture_store_with_policy(RiskBandPolicy::disabled());
        let id = seeded_student(&mut store, 1001);

        let prediction = must(store.append_prediction(id, &fixture_prediction(0.9, RiskCategory::Low)));
        assert_eq!(prediction.risk_category, RiskCategory::Low);
    }

    #[test]
    fn prediction_rows_are_immutable() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let prediction = must(store.append_prediction(id, &fixture_prediction(0.82, RiskCategory::High)));

        let result = store.connection().execute(
            "UPDATE risk_predictions SET risk_score = 0.1 WHERE prediction_seq = ?1",
            params![prediction.prediction_seq],
        );

        assert!(result.is_err());
    }

    #[test]
    fn prediction_for_unknown_student_is_referential_error() {
        let mut store = fixture_store();
        let result = store.append_prediction(
            StudentId(404),
            &fixture_prediction(0.82, RiskCategory::High),
        );
        assert!(matches!(result, Err(RiskDataError::Referential(_))));
    }

    #[test]
    fn latest_prediction_returns_newest_and_list_preserves_order() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let first = must(store.append_prediction(id, &fixture_prediction(0.2, RiskCategory::Low)));
        let second = must(store.append_prediction(id, &fixture_prediction(0.82, RiskCategory::High)));

        let latest = must(store.latest_prediction(id));
        assert_eq!(latest.as_ref().map(|p| p.prediction_seq), Some(second.prediction_seq));

        let all = must(store.list_predictions(id, None));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].prediction_seq, first.prediction_seq);

        let limited = must(store.list_predictions(id, Some(1)));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].prediction_seq, first.prediction_seq);
    }

    #[test]
    fn delete_student_cascades_to_every_dependent() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        must(store.upsert_engagement(id, &fixture_engagement()));
        must(store.upsert_assessment(id, &fixture_assessment()));
        must(store.upsert_outcome(
            id,
            &OutcomeRecord {
                final_result: FinalResult::Fail,
                predicted_correctly: Some(true),
                intervention_applied: true,
            },
        ));
        let prediction = must(store.append_prediction(id, &fixture_prediction(0.82, RiskCategory::High)));
        let intervention =
            must(store.create_intervention(id, &fixture_intervention(Some(prediction.prediction_id))));

        let report = must(store.delete_student(id));
        assert_eq!(report.engagement_rows, 1);
        assert_eq!(report.assessment_rows, 1);
        assert_eq!(report.prediction_rows, 1);
        assert_eq!(report.intervention_rows, 1);
        assert_eq!(report.outcome_rows, 1);

        assert!(must(store.get_student(id)).is_none());
        assert!(must(store.get_engagement(id)).is_none());
        assert!(must(store.get_assessment(id)).is_none());
        assert!(must(store.get_outcome(id)).is_none());
        assert!(must(store.latest_prediction(id)).is_none());
        assert!(must(store.get_intervention(intervention.intervention_id)).is_none());
        assert!(must(store.feature_table()).is_empty());
    }

    #[test]
    fn delete_unknown_student_is_referential_error() {
        let mut store = fixture_store();
        let result = store.delete_student(StudentId(404));
        assert!(matches!(result, Err(RiskDataError::Referential(_))));
    }

    #[test]
    fn feature_table_has_one_row_per_student() {
        let mut store = fixture_store();
        let full = seeded_student(&mut store, 1001);
        let partial = seeded_student(&mut store, 1002);
        let _bare = seeded_student(&mut store, 1003);

        must(store.upsert_engagement(full, &fixture_engagement()));
        must(store.upsert_assessment(full, &fixture_assessment()));
        must(store.upsert_engagement(partial, &fixture_engagement()));

        let table = must(store.feature_table());
        assert_eq!(table.len(), 3);
        assert_eq!(table.len(), must(store.list_students()).len());
    }

    #[test]
    fn feature_row_reports_absent_dependents_as_none() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let row = must(store.feature_row(id));
        let row = match row {
            Some(value) => value,
            None => panic!("expected a feature row for student 1001"),
        };

        assert_eq!(row.student.id_student, StudentId(1001));
        assert_eq!(row.student.code_module, "AAA");
        assert_eq!(row.student.studied_credits, 60);
        assert!(row.engagement.is_none());
        assert!(row.assessment.is_none());
        assert!(row.outcome.is_none());
    }

    #[test]
    fn feature_row_reflects_latest_committed_state() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let before = must(store.feature_row(id));
        assert!(before.and_then(|row| row.engagement).is_none());

        must(store.upsert_engagement(id, &fixture_engagement()));

        let after = must(store.feature_row(id));
        let engagement = match after.and_then(|row| row.engagement) {
            Some(value) => value,
            None => panic!("expected engagement after upsert"),
        };
        assert_eq!(engagement.total_clicks, 120);
    }

    #[test]
    fn intervention_lifecycle_happy_path() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let prediction = must(store.append_prediction(id, &fixture_prediction(0.82, RiskCategory::High)));

        let created =
            must(store.create_intervention(id, &fixture_intervention(Some(prediction.prediction_id))));
        assert_eq!(created.status, InterventionStatus::Recommended);
        assert!(created.implemented_date.is_none());
        assert_eq!(created.prediction_id, Some(prediction.prediction_id));

        let started = must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::InProgress,
            None,
        ));
        assert_eq!(started.status, InterventionStatus::InProgress);
        assert!(started.implemented_date.is_some());

        let completed = must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Completed,
            Some(0.7),
        ));
        assert_eq!(completed.status, InterventionStatus::Completed);
        assert_eq!(completed.effectiveness_score, Some(0.7));
        assert_eq!(completed.implemented_date, started.implemented_date);

        let revised = must(store.set_effectiveness(created.intervention_id, 0.9));
        assert_eq!(revised.effectiveness_score, Some(0.9));

        let reentry = store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Completed,
            None,
        );
        assert!(matches!(reentry, Err(RiskDataError::StateTransition(_))));
    }

    #[test]
    fn completed_to_in_progress_is_rejected() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::InProgress,
            None,
        ));
        must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Completed,
            None,
        ));

        let result = store.transition_intervention(
            created.intervention_id,
            InterventionStatus::InProgress,
            None,
        );
        assert!(matches!(result, Err(RiskDataError::StateTransition(_))));
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        let cancelled = must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Cancelled,
            None,
        ));
        assert_eq!(cancelled.status, InterventionStatus::Cancelled);
        assert!(cancelled.implemented_date.is_none());

        let result = store.transition_intervention(
            created.intervention_id,
            InterventionStatus::InProgress,
            None,
        );
        assert!(matches!(result, Err(RiskDataError::StateTransition(_))));
    }

    #[test]
    fn recommended_cannot_skip_to_completed() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        let result = store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Completed,
            None,
        );
        assert!(matches!(result, Err(RiskDataError::StateTransition(_))));
    }

    #[test]
    fn effectiveness_outside_completed_is_rejected() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        let result = store.set_effectiveness(created.intervention_id, 0.5);
        assert!(matches!(result, Err(RiskDataError::StateTransition(_))));
    }

    #[test]
    fn effectiveness_outside_unit_interval_is_rejected() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        must(store.transition_intervention(
            created.intervention_id,
            InterventionStatus::InProgress,
            None,
        ));
        let result = store.transition_intervention(
            created.intervention_id,
            InterventionStatus::Completed,
            Some(1.3),
        );
        assert!(matches!(result, Err(RiskDataError::Validation(_))));
    }

    #[test]
    fn intervention_must_reference_own_students_prediction() {
        let mut store = fixture_store();
        let owner = seeded_student(&mut store, 1001);
        let other = seeded_student(&mut store, 1002);
        let prediction = must(store.append_prediction(owner, &fixture_prediction(0.82, RiskCategory::High)));

        let result =
            store.create_intervention(other, &fixture_intervention(Some(prediction.prediction_id)));
        assert!(matches!(result, Err(RiskDataError::Referential(_))));
    }

    #[test]
    fn intervention_for_unknown_prediction_is_referential_error() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);

        let result = store.create_intervention(id, &fixture_intervention(Some(Ulid::new())));
        assert!(matches!(result, Err(RiskDataError::Referential(_))));
    }

    #[test]
    fn integrity_check_is_healthy_on_consistent_store() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        must(store.upsert_engagement(id, &fixture_engagement()));
        must(store.append_prediction(id, &fixture_prediction(0.82, RiskCategory::High)));

        let report = must(store.integrity_check());
        assert!(report.healthy);
        assert!(report.issues.is_empty());
        assert_eq!(report.student_rows, 1);
        assert_eq!(report.feature_rows, 1);
    }

    #[test]
    fn integrity_check_flags_effectiveness_outside_completed() {
        let mut store = fixture_store();
        let id = seeded_student(&mut store, 1001);
        let created = must(store.create_intervention(id, &fixture_intervention(None)));

        // Corrupt the row below the application layer.
        must(store
            .connection()
            .execute(
                "UPDATE interventions SET effectiveness_score = 0.4 WHERE intervention_id = ?1",
                params![created.intervention_id.to_string()],
            )
            .map_err(|err| map_sqlite_error("corrupt row", &err)));

        let report = must(store.integrity_check());
        assert!(!report.healthy);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.code == "effectiveness_outside_completed"));
    }

    #[test]
    fn integrity_check_warns_on_band_mismatch_in_history() {
        let db_path = std::env::temp_dir().join(format!("risk-band-{}.sqlite3", Ulid::new()));

        {
            let mut relaxed = must(SqliteRiskStore::open_with_policy(
                &db_path,
                RiskBandPolicy::disabled(),
            ));
            must(relaxed.migrate());
            let id = seeded_student(&mut relaxed, 1001);
            must(relaxed.append_prediction(id, &fixture_prediction(0.9, RiskCategory::Low)));
        }

        let strict = must(SqliteRiskStore::open(&db_path));
        let report = must(strict.integrity_check());

        // Historical rows written under a looser policy surface as a
        // warning, not a hard failure.
        assert!(report.healthy);
        assert!(report
            .issues
            .iter()
            .any(|issue| issue.code == "band_mismatch"
                && issue.severity == IntegrityIssueSeverity::Warning));

        let _ = std::fs::remove_file(&db_path);
    }

    proptest! {
        #[test]
        fn in_range_scores_always_append(scores in proptest::collection::vec(0.0f64..=1.0, 1..8)) {
            let mut store = fixture_store();
            let id = seeded_student(&mut store, 1001);
            let policy = store.band_policy();

            for score in &scores {
                let category = policy.category_for(*score);
                let prediction = must(store.append_prediction(id, &fixture_prediction(*score, category)));
                prop_assert!((0.0..=1.0).contains(&prediction.risk_score));
            }

            let listed = must(store.list_predictions(id, None));
            prop_assert_eq!(listed.len(), scores.len());
            for window in listed.windows(2) {
                prop_assert!(window[0].prediction_seq < window[1].prediction_seq);
            }
        }

        #[test]
        fn out_of_range_scores_never_append(score in 1.0001f64..10.0) {
            let mut store = fixture_store();
            let id = seeded_student(&mut store, 1001);

            let result = store.append_prediction(id, &fixture_prediction(score, RiskCategory::High));
            prop_assert!(result.is_err());
            prop_assert_eq!(must(store.list_predictions(id, None)).len(), 0);
        }
    }
}
