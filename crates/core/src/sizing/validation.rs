use crate::config::ValidationConfig;
use crate::domain::feedback::{FitFeedbackInput, SATISFACTION_RANGE};
use crate::domain::measurement::MeasurementKey;
use crate::domain::sizing::BodyMeasurements;
use crate::domain::student::StudentInput;
use crate::errors::{ValidationError, ViolationCollector};
use crate::sizing::metrics::MetricsCalculator;

pub const HEIGHT_RANGE_CM: (f64, f64) = (80.0, 250.0);
pub const WEIGHT_RANGE_KG: (f64, f64) = (10.0, 200.0);
pub const MANUAL_VALUE_RANGE_CM: (f64, f64) = (1.0, 250.0);

pub const FEEDBACK_COMMENT_MAX_CHARS: usize = 1000;

const CIRCUMFERENCE_RANGE_CM: (f64, f64) = (40.0, 140.0);
const HIP_RANGE_CM: (f64, f64) = (40.0, 160.0);
const SHOULDER_RANGE_CM: (f64, f64) = (28.0, 50.0);
const SLEEVE_RANGE_CM: (f64, f64) = (15.0, 65.0);
const TOP_LENGTH_RANGE_CM: (f64, f64) = (30.0, 80.0);

/// Plausibility ceilings for young children, as (max age, max weight kg, max height cm).
const AGE_CONTEXT_LIMITS: [(u32, f64, f64); 2] = [(5, 30.0, 130.0), (10, 60.0, 160.0)];

/// Checks raw inputs and reports every broken constraint at once. Never clamps.
#[derive(Clone, Copy, Debug)]
pub struct InputValidator {
    min_age: u32,
    max_age: u32,
}

impl InputValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self { min_age: config.min_age, max_age: config.max_age }
    }

    pub fn validate_student(
        &self,
        input: &StudentInput,
        calculator: &MetricsCalculator,
    ) -> Result<(), ValidationError> {
        let mut violations = ViolationCollector::default();

        require_text(&mut violations, "external_id", &input.external_id);
        require_text(&mut violations, "full_name", &input.full_name);
        require_text(&mut violations, "class_division", &input.class_division);

        check_range(&mut violations, "height_cm", input.height_cm, HEIGHT_RANGE_CM, "cm");
        check_range(&mut violations, "weight_kg", input.weight_kg, WEIGHT_RANGE_KG, "kg");

        match calculator.age_on_reference(input.date_of_birth) {
            None => violations.push(
                "date_of_birth",
                format!("must not be after {}", calculator.reference_date()),
            ),
            Some(age) => {
                if age < self.min_age || age > self.max_age {
                    violations.push(
                        "age",
                        format!(
                            "must be between {} and {} years (was {age})",
                            self.min_age, self.max_age
                        ),
                    );
                }
                check_age_context(&mut violations, age, input.height_cm, input.weight_kg);
            }
        }

        violations.finish()
    }

    pub fn validate_measurements(
        &self,
        measurements: &BodyMeasurements,
    ) -> Result<(), ValidationError> {
        let mut violations = ViolationCollector::default();
        let checks = [
            ("chest_cm", measurements.chest_cm, CIRCUMFERENCE_RANGE_CM),
            ("bust_cm", measurements.bust_cm, CIRCUMFERENCE_RANGE_CM),
            ("waist_cm", measurements.waist_cm, CIRCUMFERENCE_RANGE_CM),
            ("hip_cm", measurements.hip_cm, HIP_RANGE_CM),
            ("shoulder_cm", measurements.shoulder_cm, SHOULDER_RANGE_CM),
            ("sleeve_length_cm", measurements.sleeve_length_cm, SLEEVE_RANGE_CM),
            ("top_length_cm", measurements.top_length_cm, TOP_LENGTH_RANGE_CM),
        ];
        for (field, value, range) in checks {
            if let Some(value) = value {
                check_range(&mut violations, field, value, range, "cm");
            }
        }
        violations.finish()
    }

    /// A single tailor-recorded value for one garment measurement.
    pub fn validate_manual_value(
        &self,
        key: &MeasurementKey,
        value_cm: f64,
    ) -> Result<(), ValidationError> {
        let mut violations = ViolationCollector::default();
        require_text(&mut violations, "garment_type", &key.garment_type);
        require_text(&mut violations, "measurement_name", &key.measurement_name);
        check_range(&mut violations, "value_cm", value_cm, MANUAL_VALUE_RANGE_CM, "cm");
        violations.finish()
    }

    pub fn validate_fit_feedback(&self, input: &FitFeedbackInput) -> Result<(), ValidationError> {
        let mut violations = ViolationCollector::default();
        require_text(&mut violations, "garment_type", &input.garment_type);

        let (min, max) = SATISFACTION_RANGE;
        if !(min..=max).contains(&input.satisfaction_score) {
            violations.push(
                "satisfaction_score",
                format!("must be between {min} and {max} (was {})", input.satisfaction_score),
            );
        }
        for (index, issue) in input.specific_issues.iter().enumerate() {
            require_text(&mut violations, &format!("specific_issues[{index}].area"), &issue.area);
        }
        if let Some(comment) = &input.comment {
            let length = comment.chars().count();
            if length > FEEDBACK_COMMENT_MAX_CHARS {
                violations.push(
                    "comment",
                    format!("must be at most {FEEDBACK_COMMENT_MAX_CHARS} characters (was {length})"),
                );
            }
        }
        violations.finish()
    }
}

fn require_text(violations: &mut ViolationCollector, field: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(field, "must not be blank");
    }
}

fn check_range(
    violations: &mut ViolationCollector,
    field: &str,
    value: f64,
    (min, max): (f64, f64),
    unit: &str,
) {
    if !(min..=max).contains(&value) {
        violations.push(field, format!("must be between {min} and {max} {unit} (was {value})"));
    }
}

fn check_age_context(
    violations: &mut ViolationCollector,
    age: u32,
    height_cm: f64,
    weight_kg: f64,
) {
    let Some((limit_age, max_weight, max_height)) =
        AGE_CONTEXT_LIMITS.iter().copied().find(|(limit_age, _, _)| age <= *limit_age)
    else {
        return;
    };

    if weight_kg > max_weight {
        violations.push(
            "weight_kg",
            format!(
                "{weight_kg} kg is implausible at age {age} (limit {max_weight} kg up to age {limit_age})"
            ),
        );
    }
    if height_cm > max_height {
        violations.push(
            "height_cm",
            format!(
                "{height_cm} cm is implausible at age {age} (limit {max_height} cm up to age {limit_age})"
            ),
        );
    }
}
