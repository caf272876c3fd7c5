use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::autofill::{
    apply_bias_correction, build_accuracy_entry, AutofillOutcome, CandidateFilter, MatchScorer,
};
use crate::config::{AppConfig, LearningConfig, MatchingConfig, MatchingRegime};
use crate::domain::accuracy::{AccuracyLogEntry, BiasAdjustment};
use crate::domain::feedback::{FitFeedback, FitFeedbackInput};
use crate::domain::measurement::{
    AutofillRecord, MeasurementKey, MeasurementMethod, MeasurementRecord, MeasurementState,
};
use crate::domain::sizing::{
    BodyMeasurements, FitPreference, SizeRecommendation, SizeRecommendationRecord,
};
use crate::domain::student::{NewStudentProfile, StudentId, StudentInput, StudentProfile};
use crate::drafts::DraftStore;
use crate::errors::{ApplicationError, InterfaceError, SizingError, StoreError};
use crate::sizing::{InputValidator, MetricsCalculator, RecommendationRequest, SizeRecommender};
use crate::store::{SizingStore, SizingTransaction};

/// A tailor-entered value for one garment measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualMeasurement {
    pub student_id: StudentId,
    pub garment_type: String,
    pub measurement_name: String,
    pub value_cm: f64,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

impl ManualMeasurement {
    pub fn key(&self) -> MeasurementKey {
        MeasurementKey::new(self.garment_type.trim(), self.measurement_name.trim())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningFeedback {
    pub entry: AccuracyLogEntry,
    pub bias: BiasAdjustment,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualSaveOutcome {
    pub record: MeasurementRecord,
    pub state: MeasurementState,
    /// `None` when nothing was autofilled for the key or the learning step failed.
    pub feedback: Option<LearningFeedback>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizingReport {
    pub student_id: StudentId,
    pub recommendation: SizeRecommendation,
    pub autofill: AutofillOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizedDraft {
    pub draft_id: String,
    pub profile: StudentProfile,
    pub report: SizingReport,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestStatus {
    Saved { outcome: ManualSaveOutcome },
    Failed { error_class: String, message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestItem {
    pub index: usize,
    pub student_id: StudentId,
    pub key: MeasurementKey,
    pub status: IngestStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub saved: usize,
    pub failed: usize,
    pub items: Vec<IngestItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementView {
    pub record: MeasurementRecord,
    pub autofill: Option<AutofillRecord>,
    pub state: MeasurementState,
}

/// Runs sizing operations against a store. Each public method is its own unit of work.
pub struct SizingService<S> {
    store: S,
    matching: MatchingConfig,
    learning: LearningConfig,
    recommender: SizeRecommender,
    validator: InputValidator,
    drafts: DraftStore,
    reference_date: Option<NaiveDate>,
}

impl<S: SizingStore> SizingService<S> {
    pub fn new(store: S, config: &AppConfig) -> Self {
        Self {
            store,
            matching: config.matching,
            learning: config.learning,
            recommender: SizeRecommender::new(&config.recommender),
            validator: InputValidator::new(&config.validation),
            drafts: DraftStore::new(&config.drafts),
            reference_date: None,
        }
    }

    /// Pins the date ages are computed against. Defaults to today in UTC.
    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = Some(reference_date);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn drafts(&self) -> &DraftStore {
        &self.drafts
    }

    fn calculator(&self) -> MetricsCalculator {
        MetricsCalculator::new(self.reference_date.unwrap_or_else(|| Utc::now().date_naive()))
    }

    /// Validates raw attributes and derives metrics without touching storage.
    pub fn prepare_profile(&self, input: StudentInput) -> Result<NewStudentProfile, SizingError> {
        let calculator = self.calculator();
        self.validator.validate_student(&input, &calculator)?;
        let metrics = calculator.compute(&input);
        Ok(NewStudentProfile { input, metrics })
    }

    pub async fn register_student(
        &self,
        input: StudentInput,
    ) -> Result<StudentProfile, SizingError> {
        let new_profile = self.prepare_profile(input)?;

        let mut tx = self.store.begin().await?;
        let profile = tx.upsert_profile(&new_profile).await?;
        tx.commit().await?;

        info!(
            event_name = "sizing.student.registered",
            student_id = profile.id.0,
            external_id = %profile.external_id,
            age = profile.metrics.age,
            bmi = profile.metrics.bmi,
            bpc = profile.metrics.bpc,
            "student profile saved"
        );
        Ok(profile)
    }

    pub async fn get_profile(&self, student_id: StudentId) -> Result<StudentProfile, SizingError> {
        let mut tx = self.store.begin().await?;
        load_profile(&mut tx, student_id).await
    }

    pub async fn delete_student(&self, student_id: StudentId) -> Result<bool, SizingError> {
        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_profile(student_id).await?;
        tx.commit().await?;
        info!(
            event_name = "sizing.student.deleted",
            student_id = student_id.0,
            deleted,
            "student profile removed"
        );
        Ok(deleted)
    }

    /// Recommendation for attributes that are not stored. Only reads the size chart.
    pub async fn preview_recommendation(
        &self,
        input: StudentInput,
        measurements: Option<BodyMeasurements>,
        fit_preference: FitPreference,
    ) -> Result<SizeRecommendation, SizingError> {
        let new_profile = self.prepare_profile(input)?;
        let measurements = self.checked_measurements(measurements)?;
        let request = RecommendationRequest {
            sex: new_profile.input.sex,
            age: new_profile.metrics.age,
            height_cm: new_profile.input.height_cm,
            bmi: new_profile.metrics.bmi,
            measurements,
            fit_preference,
        };
        let estimate = self.recommender.estimate(&request);

        let mut tx = self.store.begin().await?;
        let chart_entry = tx.get_size_chart_entry(request.sex, estimate.size_code).await?;

        Ok(self.recommender.resolve(request.sex, estimate, fit_preference, chart_entry.as_ref()))
    }

    pub async fn recommend_size(
        &self,
        student_id: StudentId,
        measurements: Option<BodyMeasurements>,
        fit_preference: FitPreference,
    ) -> Result<SizeRecommendation, SizingError> {
        let measurements = self.checked_measurements(measurements)?;

        let mut tx = self.store.begin().await?;
        let profile = load_profile(&mut tx, student_id).await?;
        let recommendation =
            self.recommend_in(&mut tx, &profile, measurements, fit_preference).await?;
        tx.commit().await?;

        Ok(recommendation)
    }

    pub async fn autofill_measurements(
        &self,
        student_id: StudentId,
        regime: Option<MatchingRegime>,
    ) -> Result<AutofillOutcome, SizingError> {
        let regime = regime.unwrap_or(self.matching.default_regime);

        let mut tx = self.store.begin().await?;
        let profile = load_profile(&mut tx, student_id).await?;
        let outcome = self.autofill_in(&mut tx, &profile, regime).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    /// Recommendation and autofill committed together or not at all.
    pub async fn size_student(
        &self,
        student_id: StudentId,
        measurements: Option<BodyMeasurements>,
        fit_preference: FitPreference,
        regime: Option<MatchingRegime>,
    ) -> Result<SizingReport, SizingError> {
        let measurements = self.checked_measurements(measurements)?;
        let regime = regime.unwrap_or(self.matching.default_regime);

        let mut tx = self.store.begin().await?;
        let profile = load_profile(&mut tx, student_id).await?;
        let recommendation =
            self.recommend_in(&mut tx, &profile, measurements, fit_preference).await?;
        let autofill = self.autofill_in(&mut tx, &profile, regime).await?;
        tx.commit().await?;

        Ok(SizingReport { student_id, recommendation, autofill })
    }

    /// Persists a finished draft as a profile and sizes it in the same unit of work.
    pub async fn finalize_draft(
        &self,
        draft_id: &str,
        regime: Option<MatchingRegime>,
    ) -> Result<FinalizedDraft, SizingError> {
        let completed = self.drafts.complete(draft_id, Utc::now())?;
        let new_profile = self.prepare_profile(completed.student)?;
        let measurements = self.checked_measurements(Some(completed.measurements))?;
        let regime = regime.unwrap_or(self.matching.default_regime);

        let mut tx = self.store.begin().await?;
        let mut profile = tx.upsert_profile(&new_profile).await?;
        let recommendation =
            self.recommend_in(&mut tx, &profile, measurements, completed.fit_preference).await?;
        let autofill = self.autofill_in(&mut tx, &profile, regime).await?;
        tx.commit().await?;

        self.drafts.discard(draft_id);
        profile.recommended_size = Some(recommendation.size_code);
        info!(
            event_name = "sizing.draft.finalized",
            draft_id,
            student_id = profile.id.0,
            "draft persisted and sized"
        );

        Ok(FinalizedDraft {
            draft_id: completed.draft_id,
            report: SizingReport { student_id: profile.id, recommendation, autofill },
            profile,
        })
    }

    /// Saves a manual value, then feeds the difference to the learning loop in a
    /// separate unit of work. Only the save that replaces an autofilled value is
    /// learned from. A learning failure never fails the save.
    pub async fn record_manual_measurement(
        &self,
        measurement: ManualMeasurement,
    ) -> Result<ManualSaveOutcome, SizingError> {
        let key = measurement.key();
        self.validator.validate_manual_value(&key, measurement.value_cm)?;

        let mut tx = self.store.begin().await?;
        load_profile(&mut tx, measurement.student_id).await?;
        let autofill = tx.get_autofill_record(measurement.student_id, &key).await?;
        let replaces_autofill = tx
            .get_measurement(measurement.student_id, &key)
            .await?
            .is_some_and(|current| current.method == MeasurementMethod::Auto);
        let record = MeasurementRecord {
            student_id: measurement.student_id,
            key: key.clone(),
            value_cm: measurement.value_cm,
            method: MeasurementMethod::Manual,
            confidence: 1.0,
            source_student_id: None,
            recorded_by: measurement.recorded_by,
            updated_at: Utc::now(),
        };
        tx.upsert_measurement(&record).await?;
        tx.commit().await?;

        let state = MeasurementState::resolve(Some(&record), autofill.as_ref());
        info!(
            event_name = "sizing.measurement.recorded",
            student_id = record.student_id.0,
            key = %key,
            value_cm = record.value_cm,
            corrected = matches!(state, MeasurementState::ManuallyCorrected),
            "manual measurement saved"
        );

        // Learning sees each autofill once, when a manual value first replaces it.
        let feedback = match autofill.as_ref().filter(|_| replaces_autofill) {
            None => None,
            Some(fill) => match self.learn_from_manual_value(&record, fill).await {
                Ok(feedback) => Some(feedback),
                Err(error) => {
                    warn!(
                        event_name = "sizing.learning.feedback_failed",
                        student_id = record.student_id.0,
                        key = %key,
                        error = %error,
                        "accuracy log or bias recompute failed, manual value kept"
                    );
                    None
                }
            },
        };

        Ok(ManualSaveOutcome { record, state, feedback })
    }

    async fn learn_from_manual_value(
        &self,
        record: &MeasurementRecord,
        autofill: &AutofillRecord,
    ) -> Result<LearningFeedback, StoreError> {
        let now = Utc::now();
        let entry = build_accuracy_entry(
            record.student_id,
            record.key.clone(),
            record.value_cm,
            autofill.value_cm,
            now,
        );

        // The log insert comes first so the write lock is held before the aggregate is read.
        let mut tx = self.store.begin().await?;
        tx.append_accuracy_log(&entry).await?;
        let bias = tx.recompute_bias_adjustment(&record.key, now).await?;
        tx.commit().await?;

        info!(
            event_name = "sizing.learning.bias_recomputed",
            key = %bias.key,
            avg_error = bias.avg_error,
            sample_count = bias.sample_count,
            direction = entry.direction.as_str(),
            "bias adjustment recomputed"
        );
        Ok(LearningFeedback { entry, bias })
    }

    /// Each correction is saved on its own; one failure does not stop the rest.
    pub async fn ingest_corrections(&self, corrections: Vec<ManualMeasurement>) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, correction) in corrections.into_iter().enumerate() {
            let student_id = correction.student_id;
            let key = correction.key();
            let status = match self.record_manual_measurement(correction).await {
                Ok(outcome) => {
                    report.saved += 1;
                    IngestStatus::Saved { outcome }
                }
                Err(error) => {
                    report.failed += 1;
                    let interface = InterfaceError::from(ApplicationError::from(error.clone()));
                    IngestStatus::Failed {
                        error_class: interface.error_class().to_owned(),
                        message: error.to_string(),
                    }
                }
            };
            report.items.push(IngestItem { index, student_id, key, status });
        }

        info!(
            event_name = "sizing.corrections.ingested",
            saved = report.saved,
            failed = report.failed,
            "correction batch processed"
        );
        report
    }

    pub async fn measurement_states(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<MeasurementView>, SizingError> {
        let mut tx = self.store.begin().await?;
        load_profile(&mut tx, student_id).await?;

        let mut views = Vec::new();
        for record in tx.list_measurements(student_id).await? {
            let autofill = tx.get_autofill_record(student_id, &record.key).await?;
            let state = MeasurementState::resolve(Some(&record), autofill.as_ref());
            views.push(MeasurementView { record, autofill, state });
        }
        Ok(views)
    }

    pub async fn bias_adjustments(&self) -> Result<Vec<BiasAdjustment>, SizingError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_bias_adjustments().await?)
    }

    pub async fn recommendation_history(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<SizeRecommendationRecord>, SizingError> {
        let mut tx = self.store.begin().await?;
        load_profile(&mut tx, student_id).await?;
        Ok(tx.list_size_recommendations(student_id).await?)
    }

    /// Stores post-delivery fit feedback. The size defaults to the one last recommended.
    pub async fn record_fit_feedback(
        &self,
        input: FitFeedbackInput,
    ) -> Result<FitFeedback, SizingError> {
        self.validator.validate_fit_feedback(&input)?;

        let mut tx = self.store.begin().await?;
        let profile = load_profile(&mut tx, input.student_id).await?;
        let feedback = FitFeedback {
            id: Uuid::new_v4().to_string(),
            student_id: input.student_id,
            garment_type: input.garment_type.trim().to_owned(),
            size_code: input.size_code.or(profile.recommended_size),
            fit_rating: input.fit_rating,
            specific_issues: input.specific_issues,
            satisfaction_score: input.satisfaction_score,
            comment: input.comment.filter(|comment| !comment.trim().is_empty()),
            source: input.source,
            responded_by: input.responded_by,
            recorded_at: Utc::now(),
        };
        tx.append_fit_feedback(&feedback).await?;
        tx.commit().await?;

        info!(
            event_name = "sizing.fit_feedback.recorded",
            student_id = feedback.student_id.0,
            garment_type = %feedback.garment_type,
            size_code = feedback.size_code.map(|code| code.as_str()),
            fit_rating = feedback.fit_rating.as_str(),
            satisfaction_score = feedback.satisfaction_score,
            source = feedback.source.as_str(),
            "fit feedback saved"
        );
        Ok(feedback)
    }

    pub async fn fit_feedback(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<FitFeedback>, SizingError> {
        let mut tx = self.store.begin().await?;
        load_profile(&mut tx, student_id).await?;
        Ok(tx.list_fit_feedback(student_id).await?)
    }

    fn checked_measurements(
        &self,
        measurements: Option<BodyMeasurements>,
    ) -> Result<Option<BodyMeasurements>, SizingError> {
        match measurements {
            Some(measurements) if !measurements.is_empty() => {
                self.validator.validate_measurements(&measurements)?;
                Ok(Some(measurements))
            }
            _ => Ok(None),
        }
    }

    async fn recommend_in(
        &self,
        tx: &mut S::Tx,
        profile: &StudentProfile,
        measurements: Option<BodyMeasurements>,
        fit_preference: FitPreference,
    ) -> Result<SizeRecommendation, SizingError> {
        let request = RecommendationRequest {
            sex: profile.sex,
            age: profile.metrics.age,
            height_cm: profile.height_cm,
            bmi: profile.metrics.bmi,
            measurements,
            fit_preference,
        };
        let estimate = self.recommender.estimate(&request);
        let chart_entry = tx.get_size_chart_entry(profile.sex, estimate.size_code).await?;
        let recommendation =
            self.recommender.resolve(profile.sex, estimate, fit_preference, chart_entry.as_ref());

        tx.set_recommended_size(profile.id, recommendation.size_code).await?;
        tx.append_size_recommendation(&SizeRecommendationRecord {
            student_id: profile.id,
            recommendation: recommendation.clone(),
            recorded_at: Utc::now(),
        })
        .await?;

        info!(
            event_name = "sizing.recommendation.computed",
            student_id = profile.id.0,
            size_code = recommendation.size_code.as_str(),
            method = recommendation.method_used.as_str(),
            confidence = recommendation.confidence,
            defaulted = recommendation.defaulted,
            "size recommended"
        );
        Ok(recommendation)
    }

    async fn autofill_in(
        &self,
        tx: &mut S::Tx,
        profile: &StudentProfile,
        regime: MatchingRegime,
    ) -> Result<AutofillOutcome, SizingError> {
        let tolerances = self.matching.tolerances(regime);
        let scorer = MatchScorer::new(tolerances, self.matching.penalties);
        let target = profile.summary();

        let filter = CandidateFilter::around(&target, &tolerances);
        let candidates = tx.find_candidate_profiles(&filter).await?;
        let Some(found) = scorer.select_best(&target, &candidates) else {
            info!(
                event_name = "sizing.autofill.no_match",
                student_id = profile.id.0,
                regime = regime.as_str(),
                candidates = candidates.len(),
                "no profile similar enough to copy measurements from"
            );
            return Ok(AutofillOutcome::NoMatch);
        };

        let confidence = found.confidence();
        let now = Utc::now();
        let mut records = Vec::new();
        let mut kept_manual = Vec::new();

        for (key, raw_value_cm) in tx.get_manual_measurements(found.student_id).await? {
            let bias = tx.get_bias_adjustment(&key).await?;
            let correction = apply_bias_correction(raw_value_cm, bias.as_ref(), &self.learning);
            let record = AutofillRecord {
                student_id: profile.id,
                key: key.clone(),
                value_cm: correction.value_cm,
                raw_value_cm,
                bias_applied_cm: correction.applied_cm,
                confidence,
                source_student_id: found.student_id,
                similarity_score: found.score,
                created_at: now,
            };
            tx.upsert_autofill(&record).await?;

            let existing = tx.get_measurement(profile.id, &key).await?;
            if existing.is_some_and(|current| current.method == MeasurementMethod::Manual) {
                kept_manual.push(key);
            } else {
                tx.upsert_measurement(&MeasurementRecord {
                    student_id: profile.id,
                    key,
                    value_cm: record.value_cm,
                    method: MeasurementMethod::Auto,
                    confidence,
                    source_student_id: Some(found.student_id),
                    recorded_by: None,
                    updated_at: now,
                })
                .await?;
            }
            records.push(record);
        }

        info!(
            event_name = "sizing.autofill.matched",
            student_id = profile.id.0,
            source_student_id = found.student_id.0,
            regime = regime.as_str(),
            similarity_score = found.score,
            filled = records.len(),
            kept_manual = kept_manual.len(),
            "measurements propagated from the closest profile"
        );

        Ok(AutofillOutcome::Filled {
            source_student_id: found.student_id,
            similarity_score: found.score,
            confidence,
            records,
            kept_manual,
        })
    }
}

async fn load_profile<T: SizingTransaction>(
    tx: &mut T,
    student_id: StudentId,
) -> Result<StudentProfile, SizingError> {
    tx.get_profile(student_id).await?.ok_or(SizingError::StudentNotFound(student_id))
}
