//! Argument groups shared by the sizing subcommands.

use chrono::NaiveDate;
use clap::Args;
use tailor_core::config::MatchingRegime;
use tailor_core::domain::sizing::{BodyMeasurements, FitPreference};
use tailor_core::domain::student::{Sex, StudentInput};

#[derive(Debug, Clone, Args)]
pub struct BodyArgs {
    #[arg(long, value_parser = parse_sex, help = "M or F")]
    pub sex: Sex,
    #[arg(long, value_parser = parse_date, help = "Date of birth as YYYY-MM-DD")]
    pub date_of_birth: NaiveDate,
    #[arg(long)]
    pub height_cm: f64,
    #[arg(long)]
    pub weight_kg: f64,
}

#[derive(Debug, Clone, Args)]
pub struct StudentArgs {
    #[arg(long, help = "Roll or registration number")]
    pub external_id: String,
    #[arg(long)]
    pub full_name: String,
    #[arg(long, help = "Class and division, e.g. 5-A")]
    pub class_division: String,
    #[command(flatten)]
    pub body: BodyArgs,
}

impl StudentArgs {
    pub fn into_input(self) -> StudentInput {
        StudentInput {
            external_id: self.external_id,
            full_name: self.full_name,
            class_division: self.class_division,
            date_of_birth: self.body.date_of_birth,
            sex: self.body.sex,
            height_cm: self.body.height_cm,
            weight_kg: self.body.weight_kg,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct MeasurementArgs {
    #[arg(long)]
    pub chest_cm: Option<f64>,
    #[arg(long)]
    pub bust_cm: Option<f64>,
    #[arg(long)]
    pub waist_cm: Option<f64>,
    #[arg(long)]
    pub hip_cm: Option<f64>,
    #[arg(long)]
    pub shoulder_cm: Option<f64>,
    #[arg(long)]
    pub sleeve_length_cm: Option<f64>,
    #[arg(long)]
    pub top_length_cm: Option<f64>,
}

impl MeasurementArgs {
    /// `None` when no tape measurement was passed at all.
    pub fn into_measurements(self) -> Option<BodyMeasurements> {
        let measurements = BodyMeasurements {
            chest_cm: self.chest_cm,
            bust_cm: self.bust_cm,
            waist_cm: self.waist_cm,
            hip_cm: self.hip_cm,
            shoulder_cm: self.shoulder_cm,
            sleeve_length_cm: self.sleeve_length_cm,
            top_length_cm: self.top_length_cm,
        };
        (measurements != BodyMeasurements::default()).then_some(measurements)
    }
}

pub fn parse_sex(value: &str) -> Result<Sex, String> {
    Sex::parse(value).ok_or_else(|| format!("expected M or F, got `{value}`"))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|error| format!("expected YYYY-MM-DD, got `{value}`: {error}"))
}

pub fn parse_fit(value: &str) -> Result<FitPreference, String> {
    FitPreference::parse(value)
        .ok_or_else(|| format!("expected snug, standard or loose, got `{value}`"))
}

pub fn parse_regime(value: &str) -> Result<MatchingRegime, String> {
    value.parse::<MatchingRegime>().map_err(|error| error.to_string())
}
