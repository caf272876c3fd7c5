use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::student::{Sex, StudentId};

/// Garment sizes in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeCode {
    #[serde(rename = "small-")]
    SmallMinus,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "small+")]
    SmallPlus,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "medium+")]
    MediumPlus,
    #[serde(rename = "large")]
    Large,
    #[serde(rename = "large+")]
    LargePlus,
}

impl SizeCode {
    pub const ORDER: [SizeCode; 7] = [
        Self::SmallMinus,
        Self::Small,
        Self::SmallPlus,
        Self::Medium,
        Self::MediumPlus,
        Self::Large,
        Self::LargePlus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmallMinus => "small-",
            Self::Small => "small",
            Self::SmallPlus => "small+",
            Self::Medium => "medium",
            Self::MediumPlus => "medium+",
            Self::Large => "large",
            Self::LargePlus => "large+",
        }
    }

    /// Display name used when the size chart has no row for the code.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SmallMinus => "Small Minus",
            Self::Small => "Small",
            Self::SmallPlus => "Small Plus",
            Self::Medium => "Medium",
            Self::MediumPlus => "Medium Plus",
            Self::Large => "Large",
            Self::LargePlus => "Large Plus",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ORDER.into_iter().find(|code| code.as_str() == normalized)
    }

    fn position(&self) -> usize {
        *self as usize
    }

    pub fn step_up(&self) -> Option<Self> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn step_down(&self) -> Option<Self> {
        self.position().checked_sub(1).and_then(|index| Self::ORDER.get(index).copied())
    }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPreference {
    Snug,
    #[default]
    Standard,
    Loose,
}

impl FitPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snug => "snug",
            Self::Standard => "standard",
            Self::Loose => "loose",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "snug" => Some(Self::Snug),
            "standard" => Some(Self::Standard),
            "loose" => Some(Self::Loose),
            _ => None,
        }
    }
}

/// Optional tape measurements taken at submission time, in centimetres.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurements {
    pub chest_cm: Option<f64>,
    pub bust_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hip_cm: Option<f64>,
    pub shoulder_cm: Option<f64>,
    pub sleeve_length_cm: Option<f64>,
    pub top_length_cm: Option<f64>,
}

impl BodyMeasurements {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CmRange {
    pub min: f64,
    pub max: f64,
}

impl CmRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Admin-maintained size chart row. Read-only to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeChartEntry {
    pub gender: Sex,
    pub size_code: SizeCode,
    pub size_name: String,
    pub height_cm: CmRange,
    pub weight_kg: CmRange,
    pub chest_cm: Option<CmRange>,
    pub bust_cm: Option<CmRange>,
    pub waist_cm: Option<CmRange>,
    pub hip_cm: Option<CmRange>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMethod {
    RuleBased,
    MeasurementEnhanced,
}

impl RecommendationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::MeasurementEnhanced => "measurement_enhanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "rule_based" => Some(Self::RuleBased),
            "measurement_enhanced" => Some(Self::MeasurementEnhanced),
            _ => None,
        }
    }
}

/// A runner-up size offered next to the recommendation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeAlternative {
    pub size_code: SizeCode,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeRecommendation {
    pub size_code: SizeCode,
    pub size_name: String,
    pub confidence: f64,
    pub method_used: RecommendationMethod,
    pub reasoning: String,
    /// True when the chart had no row for the computed code and the default was used.
    pub defaulted: bool,
    pub fit_preference: FitPreference,
    /// Neighbouring sizes, best first.
    #[serde(default)]
    pub alternatives: Vec<SizeAlternative>,
}

/// Append-only history row written whenever a recommendation is persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeRecommendationRecord {
    pub student_id: StudentId,
    pub recommendation: SizeRecommendation,
    pub recorded_at: DateTime<Utc>,
}
