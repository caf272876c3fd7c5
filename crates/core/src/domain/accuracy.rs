use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::measurement::{MeasurementKey, VALUE_EPSILON_CM};
use crate::domain::student::StudentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDirection {
    /// The autofilled value was smaller than the manual one.
    Underestimate,
    /// The autofilled value was larger than the manual one.
    Overestimate,
    Exact,
}

impl ErrorDirection {
    pub fn from_signed_difference(signed_difference: f64) -> Self {
        if signed_difference.abs() <= VALUE_EPSILON_CM {
            Self::Exact
        } else if signed_difference > 0.0 {
            Self::Underestimate
        } else {
            Self::Overestimate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Underestimate => "underestimate",
            Self::Overestimate => "overestimate",
            Self::Exact => "exact",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "underestimate" => Some(Self::Underestimate),
            "overestimate" => Some(Self::Overestimate),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

/// One manual-vs-autofill comparison. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyLogEntry {
    pub id: String,
    pub student_id: StudentId,
    pub key: MeasurementKey,
    pub manual_value_cm: f64,
    pub autofill_value_cm: f64,
    pub signed_difference: f64,
    pub percentage_difference: f64,
    pub direction: ErrorDirection,
    pub recorded_at: DateTime<Utc>,
}

/// Global learned correction for one (garment, measurement) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiasAdjustment {
    pub key: MeasurementKey,
    pub avg_error: f64,
    pub sample_count: u32,
    pub updated_at: DateTime<Utc>,
}
