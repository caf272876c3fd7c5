use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::LearningConfig;
use crate::domain::accuracy::{AccuracyLogEntry, BiasAdjustment, ErrorDirection};
use crate::domain::measurement::MeasurementKey;
use crate::domain::student::StudentId;
use crate::sizing::metrics::round_dp;

/// Result of running a raw propagated value through the learned bias.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiasCorrection {
    pub value_cm: f64,
    pub applied_cm: f64,
}

/// Adds the learned average error once enough material samples exist.
pub fn apply_bias_correction(
    raw_value_cm: f64,
    bias: Option<&BiasAdjustment>,
    config: &LearningConfig,
) -> BiasCorrection {
    match bias {
        Some(bias)
            if bias.sample_count >= config.min_samples
                && bias.avg_error.abs() > config.materiality_cm =>
        {
            BiasCorrection {
                value_cm: round_dp(raw_value_cm + bias.avg_error, 2),
                applied_cm: round_dp(bias.avg_error, 2),
            }
        }
        _ => BiasCorrection { value_cm: raw_value_cm, applied_cm: 0.0 },
    }
}

pub fn percentage_difference(manual_value_cm: f64, autofill_value_cm: f64) -> f64 {
    if autofill_value_cm == 0.0 {
        return 0.0;
    }
    round_dp((manual_value_cm - autofill_value_cm).abs() / autofill_value_cm * 100.0, 2)
}

/// Comparison row for a manual value that replaced an autofilled one.
pub fn build_accuracy_entry(
    student_id: StudentId,
    key: MeasurementKey,
    manual_value_cm: f64,
    autofill_value_cm: f64,
    recorded_at: DateTime<Utc>,
) -> AccuracyLogEntry {
    let signed_difference = round_dp(manual_value_cm - autofill_value_cm, 2);
    AccuracyLogEntry {
        id: Uuid::new_v4().to_string(),
        student_id,
        key,
        manual_value_cm,
        autofill_value_cm,
        signed_difference,
        percentage_difference: percentage_difference(manual_value_cm, autofill_value_cm),
        direction: ErrorDirection::from_signed_difference(signed_difference),
        recorded_at,
    }
}

/// Full recompute over every logged difference for one key. Stores run the same
/// aggregation in SQL; this is the reference used by the in-memory store.
pub fn recompute_bias<'a>(
    key: &MeasurementKey,
    entries: impl IntoIterator<Item = &'a AccuracyLogEntry>,
    updated_at: DateTime<Utc>,
) -> BiasAdjustment {
    let (sum, count) = entries
        .into_iter()
        .filter(|entry| &entry.key == key)
        .fold((0.0_f64, 0_u32), |(sum, count), entry| {
            (sum + entry.signed_difference, count + 1)
        });

    let avg_error = if count == 0 { 0.0 } else { sum / f64::from(count) };
    BiasAdjustment { key: key.clone(), avg_error, sample_count: count, updated_at }
}
