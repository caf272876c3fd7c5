use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::sizing::SizeCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub i64);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" => Some(Self::Male),
            "F" | "FEMALE" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Raw attributes submitted for a student before any derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentInput {
    /// Roll or registration number; the upsert key.
    pub external_id: String,
    pub full_name: String,
    pub class_division: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
}

/// Derived anthropometrics, rounded for reproducibility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyMetrics {
    pub age: u32,
    pub bmi: f64,
    pub ponderal_index: f64,
    pub height_percentile: Option<u8>,
    pub weight_percentile: Option<u8>,
    pub gpi: Option<f64>,
    pub bpc: f64,
}

/// A validated student ready to be upserted by external id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewStudentProfile {
    pub input: StudentInput,
    pub metrics: BodyMetrics,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub external_id: String,
    pub full_name: String,
    pub class_division: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub metrics: BodyMetrics,
    pub recommended_size: Option<SizeCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            sex: self.sex,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            bmi: self.metrics.bmi,
            age: self.metrics.age,
            bpc: self.metrics.bpc,
        }
    }
}

/// The slice of a profile that nearest-profile matching looks at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: StudentId,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub age: u32,
    pub bpc: f64,
}

#[cfg(test)]
mod tests {
    use super::Sex;

    #[test]
    fn sex_parses_codes_and_words() {
        assert_eq!(Sex::parse("m"), Some(Sex::Male));
        assert_eq!(Sex::parse(" Female "), Some(Sex::Female));
        assert_eq!(Sex::parse("x"), None);
        assert_eq!(Sex::Female.as_str(), "F");
    }
}
