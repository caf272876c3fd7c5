use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DraftConfig;
use crate::domain::sizing::{BodyMeasurements, FitPreference};
use crate::domain::student::StudentInput;
use crate::errors::SizingError;

/// Multi-step submission held in memory until it is finalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub student: Option<StudentInput>,
    pub measurements: BodyMeasurements,
    pub fit_preference: FitPreference,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything a draft must carry before it can be persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedDraft {
    pub draft_id: String,
    pub student: StudentInput,
    pub measurements: BodyMeasurements,
    pub fit_preference: FitPreference,
}

/// Drafts expire `ttl_secs` after their last update. Nothing here touches storage.
#[derive(Clone)]
pub struct DraftStore {
    ttl_secs: i64,
    drafts: Arc<Mutex<HashMap<String, Draft>>>,
}

impl DraftStore {
    pub fn new(config: &DraftConfig) -> Self {
        Self {
            ttl_secs: i64::try_from(config.ttl_secs).unwrap_or(i64::MAX),
            drafts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Draft>> {
        match self.drafts.lock() {
            Ok(drafts) => drafts,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_expired(&self, draft: &Draft, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(draft.updated_at).num_seconds() >= self.ttl_secs
    }

    pub fn create(&self, now: DateTime<Utc>) -> Draft {
        let draft = Draft {
            id: Uuid::new_v4().to_string(),
            student: None,
            measurements: BodyMeasurements::default(),
            fit_preference: FitPreference::default(),
            created_at: now,
            updated_at: now,
        };
        let mut drafts = self.lock();
        self.sweep(&mut drafts, now);
        drafts.insert(draft.id.clone(), draft.clone());
        draft
    }

    pub fn get(&self, draft_id: &str, now: DateTime<Utc>) -> Result<Draft, SizingError> {
        let mut drafts = self.lock();
        self.live_draft(&mut drafts, draft_id, now).map(|draft| draft.clone())
    }

    pub fn set_student(
        &self,
        draft_id: &str,
        student: StudentInput,
        now: DateTime<Utc>,
    ) -> Result<Draft, SizingError> {
        let mut drafts = self.lock();
        let draft = self.live_draft(&mut drafts, draft_id, now)?;
        draft.student = Some(student);
        draft.updated_at = now;
        Ok(draft.clone())
    }

    pub fn set_measurements(
        &self,
        draft_id: &str,
        measurements: BodyMeasurements,
        fit_preference: FitPreference,
        now: DateTime<Utc>,
    ) -> Result<Draft, SizingError> {
        let mut drafts = self.lock();
        let draft = self.live_draft(&mut drafts, draft_id, now)?;
        draft.measurements = measurements;
        draft.fit_preference = fit_preference;
        draft.updated_at = now;
        Ok(draft.clone())
    }

    /// Read a finished draft without removing it; the caller discards it after persisting.
    pub fn complete(
        &self,
        draft_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletedDraft, SizingError> {
        let mut drafts = self.lock();
        let draft = self.live_draft(&mut drafts, draft_id, now)?;
        let student = draft.student.clone().ok_or_else(|| SizingError::DraftIncomplete {
            draft_id: draft_id.to_owned(),
            missing: "student details".to_owned(),
        })?;

        Ok(CompletedDraft {
            draft_id: draft.id.clone(),
            student,
            measurements: draft.measurements.clone(),
            fit_preference: draft.fit_preference,
        })
    }

    pub fn discard(&self, draft_id: &str) -> bool {
        self.lock().remove(draft_id).is_some()
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut drafts = self.lock();
        self.sweep(&mut drafts, now)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn sweep(&self, drafts: &mut HashMap<String, Draft>, now: DateTime<Utc>) -> usize {
        let before = drafts.len();
        drafts.retain(|_, draft| !self.is_expired(draft, now));
        before - drafts.len()
    }

    /// Every access drops abandoned drafts, not only the one asked for.
    fn live_draft<'a>(
        &self,
        drafts: &'a mut HashMap<String, Draft>,
        draft_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&'a mut Draft, SizingError> {
        self.sweep(drafts, now);
        drafts.get_mut(draft_id).ok_or_else(|| SizingError::DraftNotFound(draft_id.to_owned()))
    }
}
