use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::autofill::CandidateFilter;
use crate::domain::accuracy::{AccuracyLogEntry, BiasAdjustment};
use crate::domain::feedback::FitFeedback;
use crate::domain::measurement::{AutofillRecord, MeasurementKey, MeasurementRecord};
use crate::domain::sizing::{SizeChartEntry, SizeCode, SizeRecommendationRecord};
use crate::domain::student::{NewStudentProfile, ProfileSummary, Sex, StudentId, StudentProfile};
use crate::errors::StoreError;

/// Opens units of work against sizing storage.
#[async_trait]
pub trait SizingStore: Send + Sync {
    type Tx: SizingTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One unit of work. Dropping it without `commit` discards every write made through it.
#[async_trait]
pub trait SizingTransaction: Send {
    /// Insert or update by external id; derived metrics are always overwritten.
    async fn upsert_profile(
        &mut self,
        profile: &NewStudentProfile,
    ) -> Result<StudentProfile, StoreError>;

    async fn get_profile(&mut self, id: StudentId) -> Result<Option<StudentProfile>, StoreError>;

    async fn get_profile_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<StudentProfile>, StoreError>;

    async fn set_recommended_size(
        &mut self,
        id: StudentId,
        size_code: SizeCode,
    ) -> Result<(), StoreError>;

    /// Removes the profile and everything recorded for it, then recomputes the bias
    /// aggregate of every key the student had logged corrections for.
    async fn delete_profile(&mut self, id: StudentId) -> Result<bool, StoreError>;

    /// Profiles inside the filter that have at least one manual measurement.
    async fn find_candidate_profiles(
        &mut self,
        filter: &CandidateFilter,
    ) -> Result<Vec<ProfileSummary>, StoreError>;

    async fn get_manual_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<(MeasurementKey, f64)>, StoreError>;

    async fn list_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<MeasurementRecord>, StoreError>;

    async fn get_measurement(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<MeasurementRecord>, StoreError>;

    async fn upsert_measurement(&mut self, record: &MeasurementRecord) -> Result<(), StoreError>;

    async fn get_autofill_record(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<AutofillRecord>, StoreError>;

    async fn upsert_autofill(&mut self, record: &AutofillRecord) -> Result<(), StoreError>;

    async fn get_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Option<BiasAdjustment>, StoreError>;

    async fn list_bias_adjustments(&mut self) -> Result<Vec<BiasAdjustment>, StoreError>;

    async fn append_accuracy_log(&mut self, entry: &AccuracyLogEntry) -> Result<(), StoreError>;

    async fn list_accuracy_log(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Vec<AccuracyLogEntry>, StoreError>;

    /// Replaces the aggregate with `AVG`/`COUNT` over the whole log for the key.
    /// A key with an empty log has no aggregate and yields `NotFound`.
    async fn recompute_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
        updated_at: DateTime<Utc>,
    ) -> Result<BiasAdjustment, StoreError>;

    async fn get_size_chart_entry(
        &mut self,
        gender: Sex,
        size_code: SizeCode,
    ) -> Result<Option<SizeChartEntry>, StoreError>;

    async fn append_size_recommendation(
        &mut self,
        record: &SizeRecommendationRecord,
    ) -> Result<(), StoreError>;

    async fn list_size_recommendations(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<SizeRecommendationRecord>, StoreError>;

    async fn append_fit_feedback(&mut self, feedback: &FitFeedback) -> Result<(), StoreError>;

    /// Oldest first.
    async fn list_fit_feedback(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<FitFeedback>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
