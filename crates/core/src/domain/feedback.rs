use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::sizing::SizeCode;
use crate::domain::student::StudentId;

pub const SATISFACTION_RANGE: (u8, u8) = (1, 5);

/// How a delivered garment fit, from the wearer's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitRating {
    TooSmall,
    SlightlySmall,
    Perfect,
    SlightlyLarge,
    TooLarge,
}

impl FitRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooSmall => "too_small",
            Self::SlightlySmall => "slightly_small",
            Self::Perfect => "perfect",
            Self::SlightlyLarge => "slightly_large",
            Self::TooLarge => "too_large",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "too_small" => Some(Self::TooSmall),
            "slightly_small" => Some(Self::SlightlySmall),
            "perfect" => Some(Self::Perfect),
            "slightly_large" => Some(Self::SlightlyLarge),
            "too_large" => Some(Self::TooLarge),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    #[default]
    PostDelivery,
    Fitting,
    Exchange,
}

impl FeedbackSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostDelivery => "post_delivery",
            Self::Fitting => "fitting",
            Self::Exchange => "exchange",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "post_delivery" => Some(Self::PostDelivery),
            "fitting" => Some(Self::Fitting),
            "exchange" => Some(Self::Exchange),
            _ => None,
        }
    }
}

/// A complaint about one area of the garment, e.g. `sleeves` / `slightly long`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitIssue {
    pub area: String,
    pub note: String,
}

/// Feedback as submitted. `size_code` falls back to the student's recommended size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitFeedbackInput {
    pub student_id: StudentId,
    pub garment_type: String,
    pub size_code: Option<SizeCode>,
    pub fit_rating: FitRating,
    #[serde(default)]
    pub specific_issues: Vec<FitIssue>,
    pub satisfaction_score: u8,
    pub comment: Option<String>,
    #[serde(default)]
    pub source: FeedbackSource,
    pub responded_by: Option<String>,
}

/// Stored post-delivery feedback. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitFeedback {
    pub id: String,
    pub student_id: StudentId,
    pub garment_type: String,
    pub size_code: Option<SizeCode>,
    pub fit_rating: FitRating,
    pub specific_issues: Vec<FitIssue>,
    pub satisfaction_score: u8,
    pub comment: Option<String>,
    pub source: FeedbackSource,
    pub responded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{FeedbackSource, FitRating};

    #[test]
    fn ratings_accept_dashed_and_cased_spellings() {
        assert_eq!(FitRating::parse("Slightly-Large"), Some(FitRating::SlightlyLarge));
        assert_eq!(FitRating::parse("perfect"), Some(FitRating::Perfect));
        assert_eq!(FitRating::parse("baggy"), None);
        assert_eq!(FeedbackSource::parse("post-delivery"), Some(FeedbackSource::PostDelivery));
        assert_eq!(FeedbackSource::default(), FeedbackSource::PostDelivery);
    }
}
