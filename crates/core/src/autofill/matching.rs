use serde::{Deserialize, Serialize};

use crate::config::{PenaltyConfig, ToleranceConfig};
use crate::domain::student::{ProfileSummary, Sex, StudentId};
use crate::sizing::metrics::round_dp;

const HEIGHT_WEIGHT: f64 = 0.3;
const WEIGHT_WEIGHT: f64 = 0.3;
const BMI_WEIGHT: f64 = 0.3;
const AGE_WEIGHT: f64 = 0.1;

/// Inclusive numeric window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub min: f64,
    pub max: f64,
}

impl Window {
    pub fn around(center: f64, tolerance: f64) -> Self {
        Self { min: center - tolerance, max: center + tolerance }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Candidate search expressed as data. Stores turn it into a parameterised query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub sex: Sex,
    pub exclude_student_id: StudentId,
    pub height_cm: Window,
    pub weight_kg: Window,
    pub bmi: Window,
    pub min_age: u32,
    pub max_age: u32,
    pub bpc: Option<Window>,
}

impl CandidateFilter {
    pub fn around(target: &ProfileSummary, tolerances: &ToleranceConfig) -> Self {
        Self {
            sex: target.sex,
            exclude_student_id: target.id,
            height_cm: Window::around(target.height_cm, tolerances.height_cm),
            weight_kg: Window::around(target.weight_kg, tolerances.weight_kg),
            bmi: Window::around(target.bmi, tolerances.bmi),
            min_age: target.age.saturating_sub(tolerances.age_years),
            max_age: target.age.saturating_add(tolerances.age_years),
            bpc: tolerances.bpc.map(|bpc| Window::around(target.bpc, bpc)),
        }
    }

    /// Profile-level part of the filter. The manual-measurement requirement is the store's job.
    pub fn matches(&self, candidate: &ProfileSummary) -> bool {
        candidate.id != self.exclude_student_id
            && candidate.sex == self.sex
            && self.height_cm.contains(candidate.height_cm)
            && self.weight_kg.contains(candidate.weight_kg)
            && self.bmi.contains(candidate.bmi)
            && (self.min_age..=self.max_age).contains(&candidate.age)
            && self.bpc.map_or(true, |window| window.contains(candidate.bpc))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatch {
    pub student_id: StudentId,
    /// Similarity on a 0..=100 scale.
    pub score: f64,
}

impl ProfileMatch {
    pub fn confidence(&self) -> f64 {
        round_dp(self.score / 100.0, 4)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MatchScorer {
    tolerances: ToleranceConfig,
    penalties: PenaltyConfig,
}

impl MatchScorer {
    pub fn new(tolerances: ToleranceConfig, penalties: PenaltyConfig) -> Self {
        Self { tolerances, penalties }
    }

    /// Weighted similarity. Exactly 0 when any dimension is outside its tolerance.
    pub fn score(&self, target: &ProfileSummary, candidate: &ProfileSummary) -> f64 {
        if target.sex != candidate.sex {
            return 0.0;
        }

        let height_diff = (target.height_cm - candidate.height_cm).abs();
        let weight_diff = (target.weight_kg - candidate.weight_kg).abs();
        let bmi_diff = (target.bmi - candidate.bmi).abs();
        let age_diff = target.age.abs_diff(candidate.age);

        let outside_bpc =
            self.tolerances.bpc.is_some_and(|bpc| (target.bpc - candidate.bpc).abs() > bpc);
        if height_diff > self.tolerances.height_cm
            || weight_diff > self.tolerances.weight_kg
            || bmi_diff > self.tolerances.bmi
            || age_diff > self.tolerances.age_years
            || outside_bpc
        {
            return 0.0;
        }

        let score = HEIGHT_WEIGHT * sub_score(height_diff, self.penalties.height_per_cm)
            + WEIGHT_WEIGHT * sub_score(weight_diff, self.penalties.weight_per_kg)
            + BMI_WEIGHT * sub_score(bmi_diff, self.penalties.bmi_per_unit)
            + AGE_WEIGHT * sub_score(f64::from(age_diff), self.penalties.age_per_year);
        let score = round_dp(score, 2);

        debug_assert!((0.0..=100.0).contains(&score));
        score
    }

    /// Highest eligible score wins; equal scores go to the lowest student id.
    pub fn select_best(
        &self,
        target: &ProfileSummary,
        candidates: &[ProfileSummary],
    ) -> Option<ProfileMatch> {
        let mut best: Option<ProfileMatch> = None;

        for candidate in candidates.iter().filter(|candidate| candidate.id != target.id) {
            let score = self.score(target, candidate);
            if score <= 0.0 || score < self.tolerances.min_score {
                continue;
            }

            let replaces = match best {
                None => true,
                Some(current) => {
                    score > current.score
                        || (score == current.score && candidate.id < current.student_id)
                }
            };
            if replaces {
                best = Some(ProfileMatch { student_id: candidate.id, score });
            }
        }

        best
    }
}

fn sub_score(diff: f64, penalty: f64) -> f64 {
    (100.0 - diff * penalty).max(0.0)
}
