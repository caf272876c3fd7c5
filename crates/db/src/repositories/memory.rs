use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use tailor_core::autofill::{recompute_bias, CandidateFilter};
use tailor_core::domain::accuracy::{AccuracyLogEntry, BiasAdjustment};
use tailor_core::domain::feedback::FitFeedback;
use tailor_core::domain::measurement::{
    AutofillRecord, MeasurementKey, MeasurementMethod, MeasurementRecord,
};
use tailor_core::domain::sizing::{CmRange, SizeChartEntry, SizeCode, SizeRecommendationRecord};
use tailor_core::domain::student::{
    NewStudentProfile, ProfileSummary, Sex, StudentId, StudentProfile,
};
use tailor_core::errors::StoreError;
use tailor_core::store::{SizingStore, SizingTransaction};

type RecordKey = (StudentId, MeasurementKey);

#[derive(Clone, Default)]
struct SizingState {
    next_profile_id: i64,
    profiles: BTreeMap<StudentId, StudentProfile>,
    measurements: BTreeMap<RecordKey, MeasurementRecord>,
    autofill: BTreeMap<RecordKey, AutofillRecord>,
    accuracy_log: Vec<AccuracyLogEntry>,
    bias: BTreeMap<MeasurementKey, BiasAdjustment>,
    size_chart: Vec<SizeChartEntry>,
    recommendations: Vec<SizeRecommendationRecord>,
    fit_feedback: Vec<FitFeedback>,
}

/// Process-local store with the same semantics as the SQLite one. Transactions are
/// serialised and work on a copy that replaces the shared state on commit.
#[derive(Clone)]
pub struct InMemorySizingStore {
    state: Arc<Mutex<SizingState>>,
}

impl Default for InMemorySizingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySizingStore {
    /// Store seeded with the same size chart the migrations install.
    pub fn new() -> Self {
        Self::with_size_chart(seeded_size_chart())
    }

    pub fn with_size_chart(size_chart: Vec<SizeChartEntry>) -> Self {
        let state = SizingState { next_profile_id: 1, size_chart, ..SizingState::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }
}

#[async_trait]
impl SizingStore for InMemorySizingStore {
    type Tx = InMemorySizingTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemorySizingTransaction { guard, working })
    }
}

pub struct InMemorySizingTransaction {
    guard: OwnedMutexGuard<SizingState>,
    working: SizingState,
}

impl InMemorySizingTransaction {
    fn has_manual_measurement(&self, student_id: StudentId) -> bool {
        self.working.measurements.values().any(|record| {
            record.student_id == student_id && record.method == MeasurementMethod::Manual
        })
    }

    fn rebuild_bias(&mut self, key: &MeasurementKey, updated_at: DateTime<Utc>) {
        let bias = recompute_bias(key, &self.working.accuracy_log, updated_at);
        if bias.sample_count == 0 {
            self.working.bias.remove(key);
        } else {
            self.working.bias.insert(key.clone(), bias);
        }
    }
}

#[async_trait]
impl SizingTransaction for InMemorySizingTransaction {
    async fn upsert_profile(
        &mut self,
        profile: &NewStudentProfile,
    ) -> Result<StudentProfile, StoreError> {
        let input = &profile.input;
        let now = Utc::now();
        let existing = self
            .working
            .profiles
            .values()
            .find(|stored| stored.external_id == input.external_id)
            .map(|stored| (stored.id, stored.created_at, stored.recommended_size));

        let (id, created_at, recommended_size) = match existing {
            Some(found) => found,
            None => {
                let id = StudentId(self.working.next_profile_id);
                self.working.next_profile_id += 1;
                (id, now, None)
            }
        };

        let stored = StudentProfile {
            id,
            external_id: input.external_id.clone(),
            full_name: input.full_name.clone(),
            class_division: input.class_division.clone(),
            date_of_birth: input.date_of_birth,
            sex: input.sex,
            height_cm: input.height_cm,
            weight_kg: input.weight_kg,
            metrics: profile.metrics.clone(),
            recommended_size,
            created_at,
            updated_at: now,
        };
        self.working.profiles.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_profile(&mut self, id: StudentId) -> Result<Option<StudentProfile>, StoreError> {
        Ok(self.working.profiles.get(&id).cloned())
    }

    async fn get_profile_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<StudentProfile>, StoreError> {
        Ok(self
            .working
            .profiles
            .values()
            .find(|profile| profile.external_id == external_id)
            .cloned())
    }

    async fn set_recommended_size(
        &mut self,
        id: StudentId,
        size_code: SizeCode,
    ) -> Result<(), StoreError> {
        let profile = self
            .working
            .profiles
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("student profile {id}")))?;
        profile.recommended_size = Some(size_code);
        profile.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_profile(&mut self, id: StudentId) -> Result<bool, StoreError> {
        if self.working.profiles.remove(&id).is_none() {
            return Ok(false);
        }

        let state = &mut self.working;
        state.measurements.retain(|(student_id, _), _| *student_id != id);
        for record in state.measurements.values_mut() {
            if record.source_student_id == Some(id) {
                record.source_student_id = None;
            }
        }
        state.autofill.retain(|(student_id, _), _| *student_id != id);
        let logged_keys: BTreeSet<MeasurementKey> = state
            .accuracy_log
            .iter()
            .filter(|entry| entry.student_id == id)
            .map(|entry| entry.key.clone())
            .collect();
        state.accuracy_log.retain(|entry| entry.student_id != id);
        state.recommendations.retain(|record| record.student_id != id);
        state.fit_feedback.retain(|feedback| feedback.student_id != id);

        let now = Utc::now();
        for key in &logged_keys {
            self.rebuild_bias(key, now);
        }
        Ok(true)
    }

    async fn find_candidate_profiles(
        &mut self,
        filter: &CandidateFilter,
    ) -> Result<Vec<ProfileSummary>, StoreError> {
        Ok(self
            .working
            .profiles
            .values()
            .map(StudentProfile::summary)
            .filter(|summary| filter.matches(summary) && self.has_manual_measurement(summary.id))
            .collect())
    }

    async fn get_manual_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<(MeasurementKey, f64)>, StoreError> {
        Ok(self
            .working
            .measurements
            .values()
            .filter(|record| {
                record.student_id == student_id && record.method == MeasurementMethod::Manual
            })
            .map(|record| (record.key.clone(), record.value_cm))
            .collect())
    }

    async fn list_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        Ok(self
            .working
            .measurements
            .values()
            .filter(|record| record.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn get_measurement(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<MeasurementRecord>, StoreError> {
        Ok(self.working.measurements.get(&(student_id, key.clone())).cloned())
    }

    async fn upsert_measurement(&mut self, record: &MeasurementRecord) -> Result<(), StoreError> {
        if !self.working.profiles.contains_key(&record.student_id) {
            return Err(StoreError::Database(format!(
                "FOREIGN KEY constraint failed: student profile {}",
                record.student_id
            )));
        }
        self.working
            .measurements
            .insert((record.student_id, record.key.clone()), record.clone());
        Ok(())
    }

    async fn get_autofill_record(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<AutofillRecord>, StoreError> {
        Ok(self.working.autofill.get(&(student_id, key.clone())).cloned())
    }

    async fn upsert_autofill(&mut self, record: &AutofillRecord) -> Result<(), StoreError> {
        if !self.working.profiles.contains_key(&record.student_id) {
            return Err(StoreError::Database(format!(
                "FOREIGN KEY constraint failed: student profile {}",
                record.student_id
            )));
        }
        self.working.autofill.insert((record.student_id, record.key.clone()), record.clone());
        Ok(())
    }

    async fn get_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Option<BiasAdjustment>, StoreError> {
        Ok(self.working.bias.get(key).cloned())
    }

    async fn list_bias_adjustments(&mut self) -> Result<Vec<BiasAdjustment>, StoreError> {
        Ok(self.working.bias.values().cloned().collect())
    }

    async fn append_accuracy_log(&mut self, entry: &AccuracyLogEntry) -> Result<(), StoreError> {
        if self.working.accuracy_log.iter().any(|logged| logged.id == entry.id) {
            return Err(StoreError::Database(format!(
                "UNIQUE constraint failed: accuracy_log.id `{}`",
                entry.id
            )));
        }
        self.working.accuracy_log.push(entry.clone());
        Ok(())
    }

    async fn list_accuracy_log(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Vec<AccuracyLogEntry>, StoreError> {
        Ok(self.working.accuracy_log.iter().filter(|entry| &entry.key == key).cloned().collect())
    }

    async fn recompute_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
        updated_at: DateTime<Utc>,
    ) -> Result<BiasAdjustment, StoreError> {
        self.rebuild_bias(key, updated_at);
        self.working
            .bias
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("bias adjustment for {key}")))
    }

    async fn get_size_chart_entry(
        &mut self,
        gender: Sex,
        size_code: SizeCode,
    ) -> Result<Option<SizeChartEntry>, StoreError> {
        Ok(self
            .working
            .size_chart
            .iter()
            .find(|entry| entry.gender == gender && entry.size_code == size_code)
            .cloned())
    }

    async fn append_size_recommendation(
        &mut self,
        record: &SizeRecommendationRecord,
    ) -> Result<(), StoreError> {
        self.working.recommendations.push(record.clone());
        Ok(())
    }

    async fn list_size_recommendations(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<SizeRecommendationRecord>, StoreError> {
        Ok(self
            .working
            .recommendations
            .iter()
            .filter(|record| record.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn append_fit_feedback(&mut self, feedback: &FitFeedback) -> Result<(), StoreError> {
        if !self.working.profiles.contains_key(&feedback.student_id) {
            return Err(StoreError::NotFound(format!("student profile {}", feedback.student_id)));
        }
        self.working.fit_feedback.push(feedback.clone());
        Ok(())
    }

    async fn list_fit_feedback(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<FitFeedback>, StoreError> {
        Ok(self
            .working
            .fit_feedback
            .iter()
            .filter(|feedback| feedback.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        *self.guard = self.working;
        Ok(())
    }
}

/// Rows installed by the size chart seed migration.
pub fn seeded_size_chart() -> Vec<SizeChartEntry> {
    let boys = [
        (SizeCode::Small, "Boys Small", (100.0, 119.9), (14.0, 24.0), (52.0, 64.9), (48.0, 58.0)),
        (SizeCode::Medium, "Boys Medium", (120.0, 139.9), (22.0, 36.0), (65.0, 74.9), (56.0, 66.0)),
        (SizeCode::Large, "Boys Large", (140.0, 159.9), (32.0, 55.0), (75.0, 84.9), (64.0, 76.0)),
        (
            SizeCode::LargePlus,
            "Boys Large Plus",
            (160.0, 185.0),
            (48.0, 90.0),
            (85.0, 105.0),
            (72.0, 95.0),
        ),
    ];
    let girls = [
        (
            SizeCode::Small,
            "Girls Small",
            (100.0, 119.9),
            (14.0, 24.0),
            (52.0, 64.9),
            (48.0, 58.0),
            (54.0, 66.0),
        ),
        (
            SizeCode::Medium,
            "Girls Medium",
            (120.0, 139.9),
            (22.0, 36.0),
            (65.0, 74.9),
            (56.0, 66.0),
            (64.0, 78.0),
        ),
        (
            SizeCode::Large,
            "Girls Large",
            (140.0, 159.9),
            (32.0, 55.0),
            (75.0, 84.9),
            (62.0, 74.0),
            (76.0, 92.0),
        ),
        (
            SizeCode::LargePlus,
            "Girls Large Plus",
            (160.0, 180.0),
            (45.0, 85.0),
            (85.0, 102.0),
            (70.0, 90.0),
            (88.0, 108.0),
        ),
    ];

    let range = |(min, max): (f64, f64)| CmRange { min, max };
    let mut chart: Vec<SizeChartEntry> = boys
        .into_iter()
        .map(|(size_code, size_name, height, weight, chest, waist)| SizeChartEntry {
            gender: Sex::Male,
            size_code,
            size_name: size_name.to_string(),
            height_cm: range(height),
            weight_kg: range(weight),
            chest_cm: Some(range(chest)),
            bust_cm: None,
            waist_cm: Some(range(waist)),
            hip_cm: None,
        })
        .collect();
    chart.extend(girls.into_iter().map(
        |(size_code, size_name, height, weight, bust, waist, hip)| SizeChartEntry {
            gender: Sex::Female,
            size_code,
            size_name: size_name.to_string(),
            height_cm: range(height),
            weight_kg: range(weight),
            chest_cm: None,
            bust_cm: Some(range(bust)),
            waist_cm: Some(range(waist)),
            hip_cm: Some(range(hip)),
        },
    ));
    chart
}
