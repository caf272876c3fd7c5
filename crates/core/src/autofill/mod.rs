pub mod learning;
pub mod matching;

use serde::{Deserialize, Serialize};

use crate::domain::measurement::{AutofillRecord, MeasurementKey};
use crate::domain::student::StudentId;

pub use learning::{apply_bias_correction, build_accuracy_entry, recompute_bias, BiasCorrection};
pub use matching::{CandidateFilter, MatchScorer, ProfileMatch, Window};

/// What an autofill run did. Finding nobody similar enough is a normal outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutofillOutcome {
    NoMatch,
    Filled {
        source_student_id: StudentId,
        similarity_score: f64,
        confidence: f64,
        records: Vec<AutofillRecord>,
        /// Keys already measured by hand for this student; their values were left alone.
        kept_manual: Vec<MeasurementKey>,
    },
}

impl AutofillOutcome {
    pub fn filled_count(&self) -> usize {
        match self {
            Self::NoMatch => 0,
            Self::Filled { records, .. } => records.len(),
        }
    }
}
