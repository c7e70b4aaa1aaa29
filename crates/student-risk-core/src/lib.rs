use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RiskDataError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("uniqueness violation: {0}")]
    Uniqueness(String),
    #[error("referential error: {0}")]
    Referential(String),
    #[error("state transition error: {0}")]
    StateTransition(String),
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// External student identifier, unique across the whole store.
///
/// All persisted dependents hang off an internal surrogate key; this id is
/// the only student handle callers ever see.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct StudentId(pub i64);

impl Display for StudentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RiskCategory {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low Risk" => Some(Self::Low),
            "Medium Risk" => Some(Self::Medium),
            "High Risk" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum InterventionStatus {
    Recommended,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl InterventionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recommended => "Recommended",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Recommended" => Some(Self::Recommended),
            "In Progress" => Some(Self::InProgress),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Checks one status edge of the intervention lifecycle.
    ///
    /// Legal edges: Recommended -> In Progress, Recommended -> Cancelled,
    /// In Progress -> Completed, In Progress -> Cancelled. Completed and
    /// Cancelled accept nothing, including re-entry into themselves.
    ///
    /// # Errors
    /// Returns [`RiskDataError::StateTransition`] for every other pair.
    pub fn validate_transition(self, target: Self) -> Result<(), RiskDataError> {
        let allowed = matches!(
            (self, target),
            (Self::Recommended, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Completed | Self::Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(RiskDataError::StateTransition(format!(
                "illegal intervention status change: {} -> {}",
                self.as_str(),
                target.as_str()
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FinalResult {
    Pass,
    Fail,
    Withdrawn,
    Distinction,
}

impl FinalResult {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Withdrawn => "Withdrawn",
            Self::Distinction => "Distinction",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pass" => Some(Self::Pass),
            "Fail" => Some(Self::Fail),
            "Withdrawn" => Some(Self::Withdrawn),
            "Distinction" => Some(Self::Distinction),
            _ => None,
        }
    }
}

/// Write-boundary policy mapping `risk_score` bands onto [`RiskCategory`].
///
/// The schema deliberately does not relate the two columns; the producing
/// model owns the mapping, so the thresholds here are configuration, not a
/// stored relationship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskBandPolicy {
    pub low_max: f64,
    pub medium_max: f64,
    pub enforce: bool,
}

impl RiskBandPolicy {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            low_max: 1.0 / 3.0,
            medium_max: 2.0 / 3.0,
            enforce: true,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enforce: false,
            ..Self::v1()
        }
    }

    /// Validates threshold ordering and bounds.
    ///
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when thresholds leave [0, 1]
    /// or are not ordered `low_max <= medium_max`.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        for (name, value) in [("low_max", self.low_max), ("medium_max", self.medium_max)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RiskDataError::Validation(format!(
                    "{name} MUST be in [0.0, 1.0]"
                )));
            }
        }

        if self.low_max > self.medium_max {
            return Err(RiskDataError::Validation(
                "low_max MUST NOT exceed medium_max".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn category_for(&self, risk_score: f64) -> RiskCategory {
        if risk_score <= self.low_max {
            RiskCategory::Low
        } else if risk_score <= self.medium_max {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }

    /// Checks a score/category pair against the configured bands.
    ///
    /// # Errors
    /// Returns [`RiskDataError::Consistency`] when enforcement is on and
    /// the category disagrees with the band the score falls into.
    pub fn check(&self, risk_score: f64, category: RiskCategory) -> Result<(), RiskDataError> {
        if !self.enforce {
            return Ok(());
        }

        let expected = self.category_for(risk_score);
        if expected == category {
            Ok(())
        } else {
            Err(RiskDataError::Consistency(format!(
                "risk_category '{}' does not match band '{}' for risk_score {risk_score}",
                category.as_str(),
                expected.as_str()
            )))
        }
    }
}

/// Demographic and enrollment facts for one student enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentRecord {
    pub id_student: StudentId,
    pub code_module: String,
    pub code_presentation: String,
    pub gender_code: i64,
    pub region_code: i64,
    pub age_band_code: i64,
    pub education_code: i64,
    pub is_male: bool,
    pub has_disability: bool,
    pub unregistered: bool,
    pub studied_credits: i64,
    pub num_prev_attempts: i64,
    /// Days relative to module start; negative means early registration.
    pub registration_delay: Option<f64>,
}

impl StudentRecord {
    /// Validates a student record before persistence.
    ///
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when enrollment context is
    /// missing or numeric fields are outside their domain.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        if self.code_module.trim().is_empty() {
            return Err(RiskDataError::Validation(
                "code_module MUST be provided".to_string(),
            ));
        }

        if self.code_presentation.trim().is_empty() {
            return Err(RiskDataError::Validation(
                "code_presentation MUST be provided".to_string(),
            ));
        }

        for (name, value) in [
            ("gender_code", self.gender_code),
            ("region_code", self.region_code),
            ("age_band_code", self.age_band_code),
            ("education_code", self.education_code),
            ("studied_credits", self.studied_credits),
            ("num_prev_attempts", self.num_prev_attempts),
        ] {
            if value < 0 {
                return Err(RiskDataError::Validation(format!("{name} MUST be >= 0")));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub id_student: StudentId,
    pub code_module: String,
    pub code_presentation: String,
    pub gender_code: i64,
    pub region_code: i64,
    pub age_band_code: i64,
    pub education_code: i64,
    pub is_male: bool,
    pub has_disability: bool,
    pub unregistered: bool,
    pub studied_credits: i64,
    pub num_prev_attempts: i64,
    pub registration_delay: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Early-window VLE click statistics; at most one row per student.
///
/// Absence of this record means "no early engagement data", which is not
/// the same as zero engagement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementFeaturesInput {
    pub total_clicks: i64,
    pub mean_clicks: f64,
    pub std_clicks: f64,
    pub max_clicks: i64,
    pub active_days: i64,
    pub first_access: i64,
    pub last_access: i64,
    pub click_consistency: f64,
    pub clicks_per_active_day: f64,
    pub engagement_range: f64,
}

impl EngagementFeaturesInput {
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when counts are negative or
    /// the access window is inverted.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        for (name, value) in [
            ("total_clicks", self.total_clicks),
            ("max_clicks", self.max_clicks),
            ("active_days", self.active_days),
        ] {
            if value < 0 {
                return Err(RiskDataError::Validation(format!("{name} MUST be >= 0")));
            }
        }

        for (name, value) in [
            ("mean_clicks", self.mean_clicks),
            ("std_clicks", self.std_clicks),
            ("clicks_per_active_day", self.clicks_per_active_day),
            ("engagement_range", self.engagement_range),
        ] {
            if value < 0.0 {
                return Err(RiskDataError::Validation(format!("{name} MUST be >= 0")));
            }
        }

        if self.first_access > self.last_access {
            return Err(RiskDataError::Validation(
                "first_access MUST NOT be after last_access".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementFeatures {
    pub id_student: StudentId,
    pub total_clicks: i64,
    pub mean_clicks: f64,
    pub std_clicks: f64,
    pub max_clicks: i64,
    pub active_days: i64,
    pub first_access: i64,
    pub last_access: i64,
    pub click_consistency: f64,
    pub clicks_per_active_day: f64,
    pub engagement_range: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Early-window assessment statistics; at most one row per student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentFeaturesInput {
    pub scores_count: i64,
    pub avg_score: Option<f64>,
    pub std_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub submitted_count: i64,
    pub missing_count: i64,
    pub banked_count: i64,
    pub total_weight: f64,
    pub submission_rate: f64,
    pub score_range: Option<f64>,
}

impl AssessmentFeaturesInput {
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when counts are negative,
    /// `submission_rate` leaves [0, 1], or score aggregates are
    /// inconsistent with `scores_count`.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        for (name, value) in [
            ("scores_count", self.scores_count),
            ("submitted_count", self.submitted_count),
            ("missing_count", self.missing_count),
            ("banked_count", self.banked_count),
        ] {
            if value < 0 {
                return Err(RiskDataError::Validation(format!("{name} MUST be >= 0")));
            }
        }

        if self.total_weight < 0.0 {
            return Err(RiskDataError::Validation(
                "total_weight MUST be >= 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.submission_rate) {
            return Err(RiskDataError::Validation(
                "submission_rate MUST be in [0.0, 1.0]".to_string(),
            ));
        }

        if self.scores_count > 0
            && (self.avg_score.is_none() || self.min_score.is_none() || self.max_score.is_none())
        {
            return Err(RiskDataError::Validation(
                "avg/min/max score are required when scores_count > 0".to_string(),
            ));
        }

        if let (Some(min), Some(max)) = (self.min_score, self.max_score) {
            if min > max {
                return Err(RiskDataError::Validation(
                    "min_score MUST NOT exceed max_score".to_string(),
                ));
            }
        }

        if let Some(range) = self.score_range {
            if range < 0.0 {
                return Err(RiskDataError::Validation(
                    "score_range MUST be >= 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentFeatures {
    pub id_student: StudentId,
    pub scores_count: i64,
    pub avg_score: Option<f64>,
    pub std_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub submitted_count: i64,
    pub missing_count: i64,
    pub banked_count: i64,
    pub total_weight: f64,
    pub submission_rate: f64,
    pub score_range: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Final course outcome; at most one row per student.
///
/// `predicted_correctly` is computed by the evaluating process against the
/// most recent risk category and merely stored here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub final_result: FinalResult,
    pub predicted_correctly: Option<bool>,
    pub intervention_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub id_student: StudentId,
    pub final_result: FinalResult,
    pub predicted_correctly: Option<bool>,
    pub intervention_applied: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskPredictionInput {
    pub prediction_id: Option<Ulid>,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub needs_intervention: bool,
    pub model_version: String,
    pub confidence_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub scored_at: OffsetDateTime,
}

impl RiskPredictionInput {
    /// Validates a prediction payload before append.
    ///
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when scores leave [0, 1],
    /// `model_version` is missing, or `scored_at` is not UTC.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        if !(0.0..=1.0).contains(&self.risk_score) {
            return Err(RiskDataError::Validation(
                "risk_score MUST be in [0.0, 1.0]".to_string(),
            ));
        }

        if let Some(confidence) = self.confidence_score {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(RiskDataError::Validation(
                    "confidence_score MUST be in [0.0, 1.0]".to_string(),
                ));
            }
        }

        if self.model_version.trim().is_empty() {
            return Err(RiskDataError::Validation(
                "model_version MUST be provided".to_string(),
            ));
        }

        if self.scored_at.offset() != UtcOffset::UTC {
            return Err(RiskDataError::Validation(
                "scored_at MUST be UTC (offset Z)".to_string(),
            ));
        }

        Ok(())
    }
}

/// One scoring event; immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskPrediction {
    pub prediction_seq: i64,
    pub prediction_id: Ulid,
    pub id_student: StudentId,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub needs_intervention: bool,
    pub model_version: String,
    pub confidence_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub scored_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionInput {
    pub intervention_id: Option<Ulid>,
    /// Public id of the prediction that triggered this action, if any.
    pub prediction_id: Option<Ulid>,
    pub intervention_type: String,
    pub description: Option<String>,
    pub priority_level: PriorityLevel,
    #[serde(with = "time::serde::rfc3339")]
    pub recommended_at: OffsetDateTime,
}

impl InterventionInput {
    /// # Errors
    /// Returns [`RiskDataError::Validation`] when the action type is
    /// missing or `recommended_at` is not UTC.
    pub fn validate(&self) -> Result<(), RiskDataError> {
        if self.intervention_type.trim().is_empty() {
            return Err(RiskDataError::Validation(
                "intervention_type MUST be provided".to_string(),
            ));
        }

        if self.recommended_at.offset() != UtcOffset::UTC {
            return Err(RiskDataError::Validation(
                "recommended_at MUST be UTC (offset Z)".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intervention {
    pub intervention_seq: i64,
    pub intervention_id: Ulid,
    pub id_student: StudentId,
    pub prediction_id: Option<Ulid>,
    pub intervention_type: String,
    pub description: Option<String>,
    pub priority_level: PriorityLevel,
    pub status: InterventionStatus,
    pub effectiveness_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub recommended_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub implemented_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Denormalized per-student record consumed by the prediction model.
///
/// Exactly one per student; missing dependents stay `None` end to end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub student: Student,
    pub engagement: Option<EngagementFeatures>,
    pub assessment: Option<AssessmentFeatures>,
    pub outcome: Option<Outcome>,
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`RiskDataError::Validation`] when parsing fails or the input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, RiskDataError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| RiskDataError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(RiskDataError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`RiskDataError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, RiskDataError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| RiskDataError::Validation(format!("failed to format timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
