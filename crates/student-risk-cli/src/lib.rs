//! Command surface for the student risk data store.
//!
//! Host processes can embed the store behavior through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command`] for direct command execution against an open store.
//!
//! Every command prints its result as pretty JSON on stdout; irreversible
//! deletions print the per-table cascade report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use student_risk_core::{
    now_utc, parse_rfc3339_utc, AssessmentFeaturesInput, EngagementFeaturesInput, FinalResult,
    InterventionInput, InterventionStatus, OutcomeRecord, PriorityLevel, RiskBandPolicy,
    RiskCategory, RiskPredictionInput, StudentId, StudentRecord,
};
use student_risk_store_sqlite::SqliteRiskStore;
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Parser)]
#[command(name = "sr")]
#[command(about = "Student-success risk data store CLI")]
pub struct Cli {
    #[arg(long, default_value = "./student_risk.sqlite3")]
    db: PathBuf,

    /// Skip the risk-band consistency check when appending predictions.
    #[arg(long)]
    no_band_check: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Student {
        #[command(subcommand)]
        command: Box<StudentCommand>,
    },
    Engagement {
        #[command(subcommand)]
        command: Box<EngagementCommand>,
    },
    Assessment {
        #[command(subcommand)]
        command: Box<AssessmentCommand>,
    },
    Outcome {
        #[command(subcommand)]
        command: Box<OutcomeCommand>,
    },
    Features {
        #[command(subcommand)]
        command: Box<FeaturesCommand>,
    },
    Prediction {
        #[command(subcommand)]
        command: Box<PredictionCommand>,
    },
    Intervention {
        #[command(subcommand)]
        command: Box<InterventionCommand>,
    },
    Check,
}

#[derive(Debug, Subcommand)]
pub enum StudentCommand {
    Upsert(StudentUpsertArgs),
    Show(StudentKeyArgs),
    List,
    Delete(StudentKeyArgs),
}

#[derive(Debug, Args)]
pub struct StudentKeyArgs {
    #[arg(long)]
    id_student: i64,
}

#[derive(Debug, Args)]
pub struct StudentUpsertArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    code_module: String,
    #[arg(long)]
    code_presentation: String,
    #[arg(long, default_value_t = 0)]
    gender_code: i64,
    #[arg(long, default_value_t = 0)]
    region_code: i64,
    #[arg(long, default_value_t = 0)]
    age_band_code: i64,
    #[arg(long, default_value_t = 0)]
    education_code: i64,
    #[arg(long)]
    is_male: bool,
    #[arg(long)]
    has_disability: bool,
    #[arg(long)]
    unregistered: bool,
    #[arg(long)]
    studied_credits: i64,
    #[arg(long, default_value_t = 0)]
    num_prev_attempts: i64,
    #[arg(long)]
    registration_delay: Option<f64>,
}

#[derive(Debug, Subcommand)]
pub enum EngagementCommand {
    Set(EngagementSetArgs),
    Show(StudentKeyArgs),
}

#[derive(Debug, Args)]
pub struct EngagementSetArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    total_clicks: i64,
    #[arg(long)]
    mean_clicks: f64,
    #[arg(long)]
    std_clicks: f64,
    #[arg(long)]
    max_clicks: i64,
    #[arg(long)]
    active_days: i64,
    #[arg(long)]
    first_access: i64,
    #[arg(long)]
    last_access: i64,
    #[arg(long)]
    click_consistency: f64,
    #[arg(long)]
    clicks_per_active_day: f64,
    #[arg(long)]
    engagement_range: f64,
    /// Fail instead of replacing an existing row.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Subcommand)]
pub enum AssessmentCommand {
    Set(AssessmentSetArgs),
    Show(StudentKeyArgs),
}

#[derive(Debug, Args)]
pub struct AssessmentSetArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    scores_count: i64,
    #[arg(long)]
    avg_score: Option<f64>,
    #[arg(long)]
    std_score: Option<f64>,
    #[arg(long)]
    min_score: Option<f64>,
    #[arg(long)]
    max_score: Option<f64>,
    #[arg(long)]
    submitted_count: i64,
    #[arg(long)]
    missing_count: i64,
    #[arg(long)]
    banked_count: i64,
    #[arg(long)]
    total_weight: f64,
    #[arg(long)]
    submission_rate: f64,
    #[arg(long)]
    score_range: Option<f64>,
    /// Fail instead of replacing an existing row.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Subcommand)]
pub enum OutcomeCommand {
    Set(OutcomeSetArgs),
    Show(StudentKeyArgs),
}

#[derive(Debug, Args)]
pub struct OutcomeSetArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    final_result: FinalResultArg,
    #[arg(long)]
    predicted_correctly: Option<bool>,
    #[arg(long)]
    intervention_applied: bool,
    /// Fail instead of replacing an existing row.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Subcommand)]
pub enum FeaturesCommand {
    Row(StudentKeyArgs),
    Table,
}

#[derive(Debug, Subcommand)]
pub enum PredictionCommand {
    Log(PredictionLogArgs),
    Latest(StudentKeyArgs),
    List(PredictionListArgs),
}

#[derive(Debug, Args)]
pub struct PredictionLogArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    risk_score: f64,
    #[arg(long)]
    risk_category: RiskCategoryArg,
    #[arg(long)]
    needs_intervention: bool,
    #[arg(long)]
    model_version: String,
    #[arg(long)]
    confidence_score: Option<f64>,
    #[arg(long)]
    scored_at: Option<String>,
}

#[derive(Debug, Args)]
pub struct PredictionListArgs {
    #[arg(long)]
    id_student: i64,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum InterventionCommand {
    Create(InterventionCreateArgs),
    Start(InterventionKeyArgs),
    Complete(InterventionCompleteArgs),
    Cancel(InterventionKeyArgs),
    SetEffectiveness(SetEffectivenessArgs),
    List(StudentKeyArgs),
}

#[derive(Debug, Args)]
pub struct InterventionCreateArgs {
    #[arg(long)]
    id_student: i64,
    /// Public id of the prediction that triggered this action.
    #[arg(long)]
    prediction_id: Option<String>,
    #[arg(long)]
    intervention_type: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    priority: PriorityArg,
    #[arg(long)]
    recommended_at: Option<String>,
}

#[derive(Debug, Args)]
pub struct InterventionKeyArgs {
    #[arg(long)]
    intervention_id: String,
}

#[derive(Debug, Args)]
pub struct InterventionCompleteArgs {
    #[arg(long)]
    intervention_id: String,
    #[arg(long)]
    effectiveness_score: Option<f64>,
}

#[derive(Debug, Args)]
pub struct SetEffectivenessArgs {
    #[arg(long)]
    intervention_id: String,
    #[arg(long)]
    score: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RiskCategoryArg {
    LowRisk,
    MediumRisk,
    HighRisk,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FinalResultArg {
    Pass,
    Fail,
    Withdrawn,
    Distinction,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate or command execution fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let policy = if cli.no_band_check {
        RiskBandPolicy::disabled()
    } else {
        RiskBandPolicy::v1()
    };

    let mut store = SqliteRiskStore::open_with_policy(&cli.db, policy)?;
    store.migrate()?;
    run_command(cli.command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, persistence, or retrieval fails.
pub fn run_command(command: Command, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        Command::Student { command } => run_student(*command, store),
        Command::Engagement { command } => run_engagement(*command, store),
        Command::Assessment { command } => run_assessment(*command, store),
        Command::Outcome { command } => run_outcome(*command, store),
        Command::Features { command } => run_features(*command, store),
        Command::Prediction { command } => run_prediction(*command, store),
        Command::Intervention { command } => run_intervention(*command, store),
        Command::Check => {
            let report = store.integrity_check()?;
            print_json(&report)
        }
    }
}

fn run_student(command: StudentCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        StudentCommand::Upsert(args) => {
            let record = StudentRecord {
                id_student: StudentId(args.id_student),
                code_module: args.code_module,
                code_presentation: args.code_presentation,
                gender_code: args.gender_code,
                region_code: args.region_code,
                age_band_code: args.age_band_code,
                education_code: args.education_code,
                is_male: args.is_male,
                has_disability: args.has_disability,
                unregistered: args.unregistered,
                studied_credits: args.studied_credits,
                num_prev_attempts: args.num_prev_attempts,
                registration_delay: args.registration_delay,
            };

            let student = store.upsert_student(&record)?;
            print_json(&student)
        }
        StudentCommand::Show(args) => {
            let student = store.get_student(StudentId(args.id_student))?;
            print_json(&student)
        }
        StudentCommand::List => {
            let students = store.list_students()?;
            print_json(&students)
        }
        StudentCommand::Delete(args) => {
            let report = store.delete_student(StudentId(args.id_student))?;
            print_json(&report)
        }
    }
}

fn run_engagement(command: EngagementCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        EngagementCommand::Set(args) => {
            let id_student = StudentId(args.id_student);
            let input = EngagementFeaturesInput {
                total_clicks: args.total_clicks,
                mean_clicks: args.mean_clicks,
                std_clicks: args.std_clicks,
                max_clicks: args.max_clicks,
                active_days: args.active_days,
                first_access: args.first_access,
                last_access: args.last_access,
                click_consistency: args.click_consistency,
                clicks_per_active_day: args.clicks_per_active_day,
                engagement_range: args.engagement_range,
            };

            let features = if args.strict {
                store.insert_engagement(id_student, &input)?
            } else {
                store.upsert_engagement(id_student, &input)?
            };
            print_json(&features)
        }
        EngagementCommand::Show(args) => {
            let features = store.get_engagement(StudentId(args.id_student))?;
            print_json(&features)
        }
    }
}

fn run_assessment(command: AssessmentCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        AssessmentCommand::Set(args) => {
            let id_student = StudentId(args.id_student);
            let input = AssessmentFeaturesInput {
                scores_count: args.scores_count,
                avg_score: args.avg_score,
                std_score: args.std_score,
                min_score: args.min_score,
                max_score: args.max_score,
                submitted_count: args.submitted_count,
                missing_count: args.missing_count,
                banked_count: args.banked_count,
                total_weight: args.total_weight,
                submission_rate: args.submission_rate,
                score_range: args.score_range,
            };

            let features = if args.strict {
                store.insert_assessment(id_student, &input)?
            } else {
                store.upsert_assessment(id_student, &input)?
            };
            print_json(&features)
        }
        AssessmentCommand::Show(args) => {
            let features = store.get_assessment(StudentId(args.id_student))?;
            print_json(&features)
        }
    }
}

fn run_outcome(command: OutcomeCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        OutcomeCommand::Set(args) => {
            let id_student = StudentId(args.id_student);
            let record = OutcomeRecord {
                final_result: map_final_result(args.final_result),
                predicted_correctly: args.predicted_correctly,
                intervention_applied: args.intervention_applied,
            };

            let outcome = if args.strict {
                store.insert_outcome(id_student, &record)?
            } else {
                store.upsert_outcome(id_student, &record)?
            };
            print_json(&outcome)
        }
        OutcomeCommand::Show(args) => {
            let outcome = store.get_outcome(StudentId(args.id_student))?;
            print_json(&outcome)
        }
    }
}

fn run_features(command: FeaturesCommand, store: &SqliteRiskStore) -> Result<()> {
    match command {
        FeaturesCommand::Row(args) => {
            let row = store.feature_row(StudentId(args.id_student))?;
            print_json(&row)
        }
        FeaturesCommand::Table => {
            let table = store.feature_table()?;
            print_json(&table)
        }
    }
}

fn run_prediction(command: PredictionCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        PredictionCommand::Log(args) => {
            let input = RiskPredictionInput {
                prediction_id: None,
                risk_score: args.risk_score,
                risk_category: map_risk_category(args.risk_category),
                needs_intervention: args.needs_intervention,
                model_version: args.model_version,
                confidence_score: args.confidence_score,
                scored_at: parse_optional_utc(args.scored_at.as_deref())?,
            };

            let prediction = store.append_prediction(StudentId(args.id_student), &input)?;
            print_json(&prediction)
        }
        PredictionCommand::Latest(args) => {
            let prediction = store.latest_prediction(StudentId(args.id_student))?;
            print_json(&prediction)
        }
        PredictionCommand::List(args) => {
            let predictions = store.list_predictions(StudentId(args.id_student), args.limit)?;
            print_json(&predictions)
        }
    }
}

fn run_intervention(command: InterventionCommand, store: &mut SqliteRiskStore) -> Result<()> {
    match command {
        InterventionCommand::Create(args) => {
            let prediction_id = args
                .prediction_id
                .as_deref()
                .map(parse_ulid)
                .transpose()?;

            let input = InterventionInput {
                intervention_id: None,
                prediction_id,
                intervention_type: args.intervention_type,
                description: args.description,
                priority_level: map_priority(args.priority),
                recommended_at: parse_optional_utc(args.recommended_at.as_deref())?,
            };

            let intervention = store.create_intervention(StudentId(args.id_student), &input)?;
            print_json(&intervention)
        }
        InterventionCommand::Start(args) => {
            let intervention = store.transition_intervention(
                parse_ulid(&args.intervention_id)?,
                InterventionStatus::InProgress,
                None,
            )?;
            print_json(&intervention)
        }
        InterventionCommand::Complete(args) => {
            let intervention = store.transition_intervention(
                parse_ulid(&args.intervention_id)?,
                InterventionStatus::Completed,
                args.effectiveness_score,
            )?;
            print_json(&intervention)
        }
        InterventionCommand::Cancel(args) => {
            let intervention = store.transition_intervention(
                parse_ulid(&args.intervention_id)?,
                InterventionStatus::Cancelled,
                None,
            )?;
            print_json(&intervention)
        }
        InterventionCommand::SetEffectiveness(args) => {
            let intervention =
                store.set_effectiveness(parse_ulid(&args.intervention_id)?, args.score)?;
            print_json(&intervention)
        }
        InterventionCommand::List(args) => {
            let interventions = store.list_interventions(StudentId(args.id_student))?;
            print_json(&interventions)
        }
    }
}

fn map_risk_category(arg: RiskCategoryArg) -> RiskCategory {
    match arg {
        RiskCategoryArg::LowRisk => RiskCategory::Low,
        RiskCategoryArg::MediumRisk => RiskCategory::Medium,
        RiskCategoryArg::HighRisk => RiskCategory::High,
    }
}

fn map_priority(arg: PriorityArg) -> PriorityLevel {
    match arg {
        PriorityArg::Low => PriorityLevel::Low,
        PriorityArg::Medium => PriorityLevel::Medium,
        PriorityArg::High => PriorityLevel::High,
        PriorityArg::Critical => PriorityLevel::Critical,
    }
}

fn map_final_result(arg: FinalResultArg) -> FinalResult {
    match arg {
        FinalResultArg::Pass => FinalResult::Pass,
        FinalResultArg::Fail => FinalResult::Fail,
        FinalResultArg::Withdrawn => FinalResult::Withdrawn,
        FinalResultArg::Distinction => FinalResult::Distinction,
    }
}

fn parse_ulid(raw: &str) -> Result<Ulid> {
    Ulid::from_string(raw).with_context(|| format!("invalid ULID: {raw}"))
}

fn parse_optional_utc(raw: Option<&str>) -> Result<OffsetDateTime> {
    match raw {
        Some(value) => Ok(parse_rfc3339_utc(value)?),
        None => Ok(now_utc()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
