use chrono::{Datelike, NaiveDate};

use crate::domain::student::{BodyMetrics, Sex, StudentInput};

/// Ages the linear growth model is defined for.
pub const GROWTH_MODEL_MIN_AGE: u32 = 2;
pub const GROWTH_MODEL_MAX_AGE: u32 = 20;

const PI_WEIGHT: f64 = 0.6;
const GPI_WEIGHT: f64 = 0.4;

/// Linear growth reference `mean = intercept + slope * age` with a fixed spread.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GrowthReference {
    intercept: f64,
    slope: f64,
    std_dev: f64,
}

impl GrowthReference {
    fn height(sex: Sex) -> Self {
        match sex {
            Sex::Male => Self { intercept: 77.0, slope: 6.0, std_dev: 7.0 },
            Sex::Female => Self { intercept: 76.0, slope: 6.0, std_dev: 7.0 },
        }
    }

    fn weight(sex: Sex) -> Self {
        match sex {
            Sex::Male => Self { intercept: 2.0, slope: 3.0, std_dev: 6.0 },
            Sex::Female => Self { intercept: 1.0, slope: 3.0, std_dev: 6.0 },
        }
    }

    fn percentile(&self, age: u32, value: f64) -> Option<u8> {
        if !(GROWTH_MODEL_MIN_AGE..=GROWTH_MODEL_MAX_AGE).contains(&age) {
            return None;
        }
        let mean = self.intercept + self.slope * f64::from(age);
        Some(percentile_from_z((value - mean) / self.std_dev))
    }
}

/// Derives body metrics against a fixed reference date so results are reproducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsCalculator {
    reference_date: NaiveDate,
}

impl MetricsCalculator {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self { reference_date }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Whole years lived on the reference date, or `None` for a birth date after it.
    pub fn age_on_reference(&self, date_of_birth: NaiveDate) -> Option<u32> {
        whole_years_between(date_of_birth, self.reference_date)
    }

    pub fn compute(&self, input: &StudentInput) -> BodyMetrics {
        let age = self.age_on_reference(input.date_of_birth).unwrap_or(0);
        let bmi = bmi(input.height_cm, input.weight_kg);
        let ponderal_index = ponderal_index(input.height_cm, input.weight_kg);
        let height_percentile = GrowthReference::height(input.sex).percentile(age, input.height_cm);
        let weight_percentile = GrowthReference::weight(input.sex).percentile(age, input.weight_kg);
        let gpi = growth_percentile_index(height_percentile, weight_percentile);
        let bpc = body_proportion_coefficient(ponderal_index, gpi);

        BodyMetrics { age, bmi, ponderal_index, height_percentile, weight_percentile, gpi, bpc }
    }
}

pub fn whole_years_between(from: NaiveDate, to: NaiveDate) -> Option<u32> {
    if from > to {
        return None;
    }
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

pub fn round_dp(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn bmi(height_cm: f64, weight_kg: f64) -> f64 {
    let height_m = height_cm / 100.0;
    round_dp(weight_kg / (height_m * height_m), 2)
}

pub fn ponderal_index(height_cm: f64, weight_kg: f64) -> f64 {
    round_dp(height_cm / weight_kg.cbrt(), 4)
}

pub fn percentile_from_z(z: f64) -> u8 {
    if z < -2.0 {
        5
    } else if z < -1.0 {
        15
    } else if z < 0.0 {
        50
    } else if z < 1.0 {
        85
    } else if z < 2.0 {
        95
    } else {
        99
    }
}

pub fn height_percentile(sex: Sex, age: u32, height_cm: f64) -> Option<u8> {
    GrowthReference::height(sex).percentile(age, height_cm)
}

pub fn weight_percentile(sex: Sex, age: u32, weight_kg: f64) -> Option<u8> {
    GrowthReference::weight(sex).percentile(age, weight_kg)
}

pub fn growth_percentile_index(
    height_percentile: Option<u8>,
    weight_percentile: Option<u8>,
) -> Option<f64> {
    match (height_percentile, weight_percentile) {
        (Some(height), Some(weight)) if weight > 0 => {
            Some(round_dp(f64::from(height) / f64::from(weight), 4))
        }
        _ => None,
    }
}

pub fn body_proportion_coefficient(ponderal_index: f64, gpi: Option<f64>) -> f64 {
    match gpi {
        Some(gpi) => round_dp(PI_WEIGHT * ponderal_index + GPI_WEIGHT * gpi, 4),
        None => round_dp(ponderal_index, 4),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        bmi, body_proportion_coefficient, growth_percentile_index, height_percentile,
        percentile_from_z, ponderal_index, weight_percentile, whole_years_between,
        MetricsCalculator,
    };
    use crate::domain::student::{Sex, StudentInput};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn input(height_cm: f64, weight_kg: f64, date_of_birth: NaiveDate) -> StudentInput {
        StudentInput {
            external_id: "R-001".to_owned(),
            full_name: "Asha Rao".to_owned(),
            class_division: "5-A".to_owned(),
            date_of_birth,
            sex: Sex::Male,
            height_cm,
            weight_kg,
        }
    }

    #[test]
    fn bmi_is_weight_over_height_squared_rounded() {
        assert_eq!(bmi(145.0, 55.0), 26.16);
        assert_eq!(bmi(150.0, 45.0), 20.0);
        assert_eq!(bmi(120.0, 30.0), 20.83);
    }

    #[test]
    fn ponderal_index_uses_cube_root_of_weight() {
        assert_eq!(ponderal_index(150.0, 27.0), 50.0);
        assert_eq!(ponderal_index(145.0, 55.0), 38.1283);
    }

    #[test]
    fn age_counts_completed_birthdays_only() {
        assert_eq!(whole_years_between(date(2014, 6, 15), date(2024, 6, 14)), Some(9));
        assert_eq!(whole_years_between(date(2014, 6, 15), date(2024, 6, 15)), Some(10));
        assert_eq!(whole_years_between(date(2024, 6, 16), date(2024, 6, 15)), None);
    }

    #[test]
    fn z_scores_fall_into_fixed_buckets() {
        assert_eq!(percentile_from_z(-2.5), 5);
        assert_eq!(percentile_from_z(-1.5), 15);
        assert_eq!(percentile_from_z(-0.1), 50);
        assert_eq!(percentile_from_z(0.0), 85);
        assert_eq!(percentile_from_z(1.0), 95);
        assert_eq!(percentile_from_z(2.0), 99);
    }

    #[test]
    fn percentiles_follow_the_sex_specific_growth_model() {
        // Mean male height at 10 is 137 cm, so 145 cm sits between +1 and +2 sd.
        assert_eq!(height_percentile(Sex::Male, 10, 145.0), Some(95));
        // Mean female height at 10 is 136 cm.
        assert_eq!(height_percentile(Sex::Female, 10, 136.0), Some(85));
        // Mean male weight at 10 is 32 kg; 55 kg is far above +2 sd.
        assert_eq!(weight_percentile(Sex::Male, 10, 55.0), Some(99));
        assert_eq!(weight_percentile(Sex::Female, 10, 24.0), Some(15));
    }

    #[test]
    fn percentiles_are_undefined_outside_the_model_ages() {
        assert_eq!(height_percentile(Sex::Male, 1, 80.0), None);
        assert_eq!(weight_percentile(Sex::Female, 21, 60.0), None);
        assert_eq!(height_percentile(Sex::Male, 20, 197.0), Some(85));
    }

    #[test]
    fn gpi_and_bpc_fall_back_when_percentiles_are_missing() {
        assert_eq!(growth_percentile_index(Some(95), Some(99)), Some(0.9596));
        assert_eq!(growth_percentile_index(None, Some(50)), None);
        assert_eq!(growth_percentile_index(Some(50), Some(0)), None);

        assert_eq!(body_proportion_coefficient(40.0, None), 40.0);
        assert_eq!(body_proportion_coefficient(40.0, Some(1.0)), 24.4);
    }

    #[test]
    fn compute_is_reproducible_for_a_fixed_reference_date() {
        let calculator = MetricsCalculator::new(date(2024, 9, 1));
        let student = input(145.0, 55.0, date(2014, 3, 10));

        let first = calculator.compute(&student);
        let second = calculator.compute(&student);

        assert_eq!(first, second);
        assert_eq!(first.age, 10);
        assert_eq!(first.bmi, 26.16);
        assert_eq!(first.height_percentile, Some(95));
        assert_eq!(first.weight_percentile, Some(99));
        assert_eq!(first.gpi, Some(0.9596));
        assert_eq!(first.bpc, 23.2608);
    }
}
