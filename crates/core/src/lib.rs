pub mod autofill;
pub mod config;
pub mod domain;
pub mod drafts;
pub mod errors;
pub mod service;
pub mod sizing;
pub mod store;

pub use autofill::{AutofillOutcome, CandidateFilter, MatchScorer, ProfileMatch};
pub use config::{AppConfig, LoadOptions, MatchingRegime};
pub use domain::accuracy::{AccuracyLogEntry, BiasAdjustment, ErrorDirection};
pub use domain::feedback::{FeedbackSource, FitFeedback, FitFeedbackInput, FitIssue, FitRating};
pub use domain::measurement::{
    AutofillRecord, MeasurementKey, MeasurementMethod, MeasurementRecord, MeasurementState,
};
pub use domain::sizing::{
    BodyMeasurements, FitPreference, RecommendationMethod, SizeAlternative, SizeChartEntry,
    SizeCode, SizeRecommendation,
};
pub use domain::student::{Sex, StudentId, StudentInput, StudentProfile};
pub use drafts::{Draft, DraftStore};
pub use errors::{ApplicationError, InterfaceError, SizingError, StoreError, ValidationError};
pub use service::{ManualMeasurement, SizingReport, SizingService};
pub use store::{SizingStore, SizingTransaction};
