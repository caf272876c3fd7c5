use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::student::StudentId;

/// Values closer than this are treated as the same measurement.
pub const VALUE_EPSILON_CM: f64 = 0.005;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasurementKey {
    pub garment_type: String,
    pub measurement_name: String,
}

impl MeasurementKey {
    pub fn new(garment_type: impl Into<String>, measurement_name: impl Into<String>) -> Self {
        Self { garment_type: garment_type.into(), measurement_name: measurement_name.into() }
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.garment_type, self.measurement_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementMethod {
    Manual,
    Auto,
    AiMl,
    Hybrid,
}

impl MeasurementMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::AiMl => "ai_ml",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            "ai_ml" => Some(Self::AiMl),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Current value for a (student, garment, measurement) key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub student_id: StudentId,
    pub key: MeasurementKey,
    pub value_cm: f64,
    pub method: MeasurementMethod,
    pub confidence: f64,
    pub source_student_id: Option<StudentId>,
    pub recorded_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The value propagated from a matched profile, kept apart from manual entries so
/// later corrections can be compared against it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutofillRecord {
    pub student_id: StudentId,
    pub key: MeasurementKey,
    pub value_cm: f64,
    pub raw_value_cm: f64,
    pub bias_applied_cm: f64,
    pub confidence: f64,
    pub source_student_id: StudentId,
    pub similarity_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MeasurementState {
    Unset,
    Autofilled { confidence: f64, source_student_id: StudentId },
    ManuallyConfirmed,
    ManuallyCorrected,
}

impl MeasurementState {
    pub fn resolve(
        measurement: Option<&MeasurementRecord>,
        autofill: Option<&AutofillRecord>,
    ) -> Self {
        match (measurement, autofill) {
            (None, None) => Self::Unset,
            (Some(record), autofill) if record.method == MeasurementMethod::Manual => {
                // Only a manual value entered over an earlier autofill corrects it.
                match autofill {
                    Some(fill)
                        if fill.created_at <= record.updated_at
                            && (fill.value_cm - record.value_cm).abs() > VALUE_EPSILON_CM =>
                    {
                        Self::ManuallyCorrected
                    }
                    _ => Self::ManuallyConfirmed,
                }
            }
            (_, Some(fill)) => Self::Autofilled {
                confidence: fill.confidence,
                source_student_id: fill.source_student_id,
            },
            (Some(record), None) => match record.source_student_id {
                Some(source) => {
                    Self::Autofilled { confidence: record.confidence, source_student_id: source }
                }
                None => Self::Unset,
            },
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::ManuallyConfirmed | Self::ManuallyCorrected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        AutofillRecord, MeasurementKey, MeasurementMethod, MeasurementRecord, MeasurementState,
    };
    use crate::domain::student::StudentId;

    fn record(method: MeasurementMethod, value_cm: f64) -> MeasurementRecord {
        MeasurementRecord {
            student_id: StudentId(2),
            key: MeasurementKey::new("shirt", "chest"),
            value_cm,
            method,
            confidence: 1.0,
            source_student_id: None,
            recorded_by: None,
            updated_at: Utc::now(),
        }
    }

    fn autofill(value_cm: f64) -> AutofillRecord {
        AutofillRecord {
            student_id: StudentId(2),
            key: MeasurementKey::new("shirt", "chest"),
            value_cm,
            raw_value_cm: value_cm,
            bias_applied_cm: 0.0,
            confidence: 0.9,
            source_student_id: StudentId(1),
            similarity_score: 90.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lifecycle_states_follow_the_stored_records() {
        assert_eq!(MeasurementState::resolve(None, None), MeasurementState::Unset);

        let fill = autofill(85.0);
        assert_eq!(
            MeasurementState::resolve(Some(&record(MeasurementMethod::Auto, 85.0)), Some(&fill)),
            MeasurementState::Autofilled { confidence: 0.9, source_student_id: StudentId(1) }
        );
        assert_eq!(
            MeasurementState::resolve(Some(&record(MeasurementMethod::Manual, 85.0)), Some(&fill)),
            MeasurementState::ManuallyConfirmed
        );
        assert_eq!(
            MeasurementState::resolve(Some(&record(MeasurementMethod::Manual, 86.5)), Some(&fill)),
            MeasurementState::ManuallyCorrected
        );
    }

    #[test]
    fn autofill_written_after_the_manual_value_is_not_a_correction() {
        let manual = record(MeasurementMethod::Manual, 88.0);
        let mut later_fill = autofill(85.0);
        later_fill.created_at = manual.updated_at + chrono::Duration::seconds(30);

        assert_eq!(
            MeasurementState::resolve(Some(&manual), Some(&later_fill)),
            MeasurementState::ManuallyConfirmed
        );
    }

    #[test]
    fn manual_entry_without_autofill_counts_as_confirmed() {
        let state = MeasurementState::resolve(Some(&record(MeasurementMethod::Manual, 70.0)), None);
        assert!(state.is_manual());
    }

    #[test]
    fn method_tags_round_trip_through_text() {
        for method in [
            MeasurementMethod::Manual,
            MeasurementMethod::Auto,
            MeasurementMethod::AiMl,
            MeasurementMethod::Hybrid,
        ] {
            assert_eq!(MeasurementMethod::parse(method.as_str()), Some(method));
        }
    }
}
