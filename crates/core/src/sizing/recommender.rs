use tracing::warn;

use crate::config::RecommenderConfig;
use crate::domain::sizing::{
    BodyMeasurements, FitPreference, RecommendationMethod, SizeAlternative, SizeChartEntry,
    SizeCode, SizeRecommendation,
};
use crate::domain::student::Sex;
use crate::sizing::metrics::round_dp;

pub const RULE_BASED_CONFIDENCE: f64 = 0.85;
pub const MEASUREMENT_CONFIDENCE: f64 = 0.90;
/// Applied to the confidence whenever a fit preference moves the size.
pub const FIT_ADJUSTMENT_FACTOR: f64 = 0.9;
/// Younger children are never sized down for a snug fit.
pub const SNUG_MIN_AGE: u32 = 10;

/// Size decision before it is resolved against the chart.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeEstimate {
    pub size_code: SizeCode,
    pub confidence: f64,
    pub method: RecommendationMethod,
    pub reasoning: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecommendationRequest {
    pub sex: Sex,
    pub age: u32,
    pub height_cm: f64,
    pub bmi: f64,
    pub measurements: Option<BodyMeasurements>,
    pub fit_preference: FitPreference,
}

/// Height bucket, then BMI override, then age override. Later rules win.
pub fn recommend_rule_based(height_cm: f64, bmi: f64, age: u32) -> SizeEstimate {
    let mut steps = Vec::with_capacity(3);

    let mut size_code = if height_cm < 120.0 {
        SizeCode::Small
    } else if height_cm < 140.0 {
        SizeCode::Medium
    } else if height_cm < 160.0 {
        SizeCode::Large
    } else {
        SizeCode::LargePlus
    };
    steps.push(format!("height {height_cm} cm suggests {size_code}"));

    if bmi > 25.0 {
        size_code = SizeCode::LargePlus;
        steps.push(format!("BMI {bmi} above 25 moves to {size_code}"));
    } else if bmi < 16.0 {
        size_code = SizeCode::Small;
        steps.push(format!("BMI {bmi} below 16 moves to {size_code}"));
    }

    if age < 8 {
        size_code = SizeCode::Small;
        steps.push(format!("age {age} under 8 sets {size_code}"));
    } else if age < 12 && size_code == SizeCode::LargePlus {
        size_code = SizeCode::Large;
        steps.push(format!("age {age} under 12 caps at {size_code}"));
    }

    SizeEstimate {
        size_code,
        confidence: RULE_BASED_CONFIDENCE,
        method: RecommendationMethod::RuleBased,
        reasoning: steps.join("; "),
    }
}

/// Sizes from the largest body circumference. Needs chest for boys and bust for girls.
pub fn recommend_from_measurements(
    sex: Sex,
    measurements: &BodyMeasurements,
) -> Option<SizeEstimate> {
    let mut circumferences = match sex {
        Sex::Male => vec![("chest", measurements.chest_cm?)],
        Sex::Female => vec![("bust", measurements.bust_cm?)],
    };
    circumferences.extend(measurements.waist_cm.map(|value| ("waist", value)));
    if sex == Sex::Female {
        circumferences.extend(measurements.hip_cm.map(|value| ("hip", value)));
    }

    let (widest_name, widest) = circumferences
        .into_iter()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })?;

    let size_code = if widest < 65.0 {
        SizeCode::Small
    } else if widest < 75.0 {
        SizeCode::Medium
    } else if widest < 85.0 {
        SizeCode::Large
    } else {
        SizeCode::LargePlus
    };

    Some(SizeEstimate {
        size_code,
        confidence: MEASUREMENT_CONFIDENCE,
        method: RecommendationMethod::MeasurementEnhanced,
        reasoning: format!(
            "widest circumference is {widest_name} at {widest} cm, fits {size_code}"
        ),
    })
}

/// Higher confidence wins; a tie keeps the rule-based estimate.
pub fn reconcile(rule_based: SizeEstimate, measured: Option<SizeEstimate>) -> SizeEstimate {
    match measured {
        Some(measured) if measured.confidence > rule_based.confidence => measured,
        _ => rule_based,
    }
}

pub fn apply_fit_preference(
    mut estimate: SizeEstimate,
    preference: FitPreference,
    age: u32,
) -> SizeEstimate {
    let nudged = match preference {
        FitPreference::Standard => None,
        FitPreference::Loose => estimate.size_code.step_up(),
        FitPreference::Snug if age >= SNUG_MIN_AGE => estimate.size_code.step_down(),
        FitPreference::Snug => None,
    };

    if let Some(size_code) = nudged {
        estimate.reasoning = format!(
            "{}; adjusted from {} for {} fit",
            estimate.reasoning,
            estimate.size_code,
            preference.as_str()
        );
        estimate.size_code = size_code;
        estimate.confidence *= FIT_ADJUSTMENT_FACTOR;
    }
    estimate
}

/// The sizes either side of `size_code`, larger first, splitting the confidence the
/// recommendation leaves unclaimed.
pub fn size_alternatives(size_code: SizeCode, confidence: f64) -> Vec<SizeAlternative> {
    let neighbours: Vec<SizeCode> =
        [size_code.step_up(), size_code.step_down()].into_iter().flatten().collect();
    if neighbours.is_empty() {
        return Vec::new();
    }

    let share = round_dp((1.0 - confidence).max(0.0) / neighbours.len() as f64, 4);
    neighbours
        .into_iter()
        .map(|size_code| SizeAlternative { size_code, confidence: share })
        .collect()
}

#[derive(Clone, Copy, Debug)]
pub struct SizeRecommender {
    default_size_code: SizeCode,
}

impl SizeRecommender {
    pub fn new(config: &RecommenderConfig) -> Self {
        Self { default_size_code: config.default_size_code }
    }

    /// Pure part of a recommendation: both strategies, reconciliation and the fit nudge.
    pub fn estimate(&self, request: &RecommendationRequest) -> SizeEstimate {
        let rule_based = recommend_rule_based(request.height_cm, request.bmi, request.age);
        let measured = request
            .measurements
            .as_ref()
            .and_then(|measurements| recommend_from_measurements(request.sex, measurements));
        let chosen = reconcile(rule_based, measured);
        let estimate = apply_fit_preference(chosen, request.fit_preference, request.age);

        debug_assert!((0.0..=1.0).contains(&estimate.confidence));
        estimate
    }

    /// Maps the estimate to a chart row. A missing row falls back to the default code.
    pub fn resolve(
        &self,
        sex: Sex,
        estimate: SizeEstimate,
        fit_preference: FitPreference,
        chart_entry: Option<&SizeChartEntry>,
    ) -> SizeRecommendation {
        match chart_entry {
            Some(entry) => SizeRecommendation {
                size_code: estimate.size_code,
                size_name: entry.size_name.clone(),
                confidence: estimate.confidence,
                method_used: estimate.method,
                reasoning: estimate.reasoning,
                defaulted: false,
                fit_preference,
                alternatives: size_alternatives(estimate.size_code, estimate.confidence),
            },
            None => {
                warn!(
                    event_name = "sizing.size_chart.lookup_miss",
                    gender = sex.as_str(),
                    size_code = estimate.size_code.as_str(),
                    default_size_code = self.default_size_code.as_str(),
                    "size chart has no row for the computed size, using the default"
                );
                SizeRecommendation {
                    size_code: self.default_size_code,
                    size_name: self.default_size_code.label().to_owned(),
                    confidence: estimate.confidence,
                    method_used: estimate.method,
                    reasoning: format!(
                        "{}; no chart row for {}, defaulted to {}",
                        estimate.reasoning, estimate.size_code, self.default_size_code
                    ),
                    defaulted: true,
                    fit_preference,
                    alternatives: size_alternatives(self.default_size_code, estimate.confidence),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        apply_fit_preference, reconcile, recommend_from_measurements, recommend_rule_based,
        size_alternatives, RecommendationRequest, SizeEstimate, SizeRecommender,
        MEASUREMENT_CONFIDENCE, RULE_BASED_CONFIDENCE,
    };
    use crate::config::RecommenderConfig;
    use crate::domain::sizing::{
        BodyMeasurements, CmRange, FitPreference, RecommendationMethod, SizeChartEntry, SizeCode,
    };
    use crate::domain::student::Sex;

    fn chart_entry(size_code: SizeCode, size_name: &str) -> SizeChartEntry {
        SizeChartEntry {
            gender: Sex::Male,
            size_code,
            size_name: size_name.to_owned(),
            height_cm: CmRange { min: 140.0, max: 160.0 },
            weight_kg: CmRange { min: 35.0, max: 60.0 },
            chest_cm: None,
            bust_cm: None,
            waist_cm: None,
            hip_cm: None,
        }
    }

    #[test]
    fn ten_year_old_boy_at_145_cm_and_55_kg_gets_large() {
        let estimate = recommend_rule_based(145.0, 26.16, 10);

        assert_eq!(estimate.size_code, SizeCode::Large);
        assert_eq!(estimate.confidence, RULE_BASED_CONFIDENCE);
        assert_eq!(estimate.method, RecommendationMethod::RuleBased);
        assert!(estimate.reasoning.contains("caps at large"));
    }

    #[test]
    fn rule_based_recommendation_is_pure() {
        let inputs = [(110.0, 15.0, 7), (130.0, 18.0, 9), (155.0, 21.0, 13), (171.0, 27.5, 16)];
        for (height_cm, bmi, age) in inputs {
            assert_eq!(
                recommend_rule_based(height_cm, bmi, age),
                recommend_rule_based(height_cm, bmi, age)
            );
        }
    }

    #[test]
    fn later_rules_override_earlier_ones() {
        assert_eq!(recommend_rule_based(130.0, 18.0, 13).size_code, SizeCode::Medium);
        assert_eq!(recommend_rule_based(130.0, 15.5, 13).size_code, SizeCode::Small);
        assert_eq!(recommend_rule_based(165.0, 20.0, 14).size_code, SizeCode::LargePlus);
        assert_eq!(recommend_rule_based(165.0, 20.0, 11).size_code, SizeCode::Large);
        assert_eq!(recommend_rule_based(150.0, 26.0, 7).size_code, SizeCode::Small);
    }

    #[test]
    fn alternatives_are_the_neighbouring_sizes() {
        let middle = size_alternatives(SizeCode::Medium, 0.85);
        let codes: Vec<SizeCode> = middle.iter().map(|alternative| alternative.size_code).collect();
        assert_eq!(codes, vec![SizeCode::MediumPlus, SizeCode::SmallPlus]);
        assert!(middle.iter().all(|alternative| (alternative.confidence - 0.075).abs() < 1e-9));

        let top = size_alternatives(SizeCode::LargePlus, 0.9);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].size_code, SizeCode::Large);
        assert!((top[0].confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn measurements_need_the_sex_specific_anchor() {
        let boy = BodyMeasurements { waist_cm: Some(70.0), ..BodyMeasurements::default() };
        assert_eq!(recommend_from_measurements(Sex::Male, &boy), None);

        let girl = BodyMeasurements { chest_cm: Some(70.0), ..BodyMeasurements::default() };
        assert_eq!(recommend_from_measurements(Sex::Female, &girl), None);
    }

    #[test]
    fn measurements_size_from_the_widest_circumference() {
        let girl = BodyMeasurements {
            bust_cm: Some(72.0),
            waist_cm: Some(64.0),
            hip_cm: Some(86.0),
            ..BodyMeasurements::default()
        };
        let estimate = recommend_from_measurements(Sex::Female, &girl).expect("bust present");
        assert_eq!(estimate.size_code, SizeCode::LargePlus);
        assert_eq!(estimate.confidence, MEASUREMENT_CONFIDENCE);
        assert!(estimate.reasoning.contains("hip"));

        // Hip is ignored for boys.
        let boy = BodyMeasurements {
            chest_cm: Some(68.0),
            hip_cm: Some(90.0),
            ..BodyMeasurements::default()
        };
        let estimate = recommend_from_measurements(Sex::Male, &boy).expect("chest present");
        assert_eq!(estimate.size_code, SizeCode::Medium);
    }

    #[test]
    fn reconciliation_prefers_confidence_and_breaks_ties_toward_rules() {
        let rule = recommend_rule_based(145.0, 20.0, 13);
        let measured = SizeEstimate {
            size_code: SizeCode::Medium,
            confidence: MEASUREMENT_CONFIDENCE,
            method: RecommendationMethod::MeasurementEnhanced,
            reasoning: String::new(),
        };
        assert_eq!(reconcile(rule.clone(), Some(measured.clone())).size_code, SizeCode::Medium);

        let tied = SizeEstimate { confidence: RULE_BASED_CONFIDENCE, ..measured };
        assert_eq!(reconcile(rule.clone(), Some(tied)).method, RecommendationMethod::RuleBased);
        assert_eq!(reconcile(rule, None).method, RecommendationMethod::RuleBased);
    }

    #[test]
    fn fit_preference_nudges_within_bounds() {
        let base = recommend_rule_based(145.0, 20.0, 13);

        let loose = apply_fit_preference(base.clone(), FitPreference::Loose, 13);
        assert_eq!(loose.size_code, SizeCode::LargePlus);
        assert!((loose.confidence - RULE_BASED_CONFIDENCE * 0.9).abs() < 1e-12);
        assert!(loose.reasoning.contains("loose fit"));

        let snug = apply_fit_preference(base.clone(), FitPreference::Snug, 13);
        assert_eq!(snug.size_code, SizeCode::MediumPlus);

        let young_snug = apply_fit_preference(base.clone(), FitPreference::Snug, 9);
        assert_eq!(young_snug, base);

        let top = recommend_rule_based(170.0, 20.0, 15);
        assert_eq!(apply_fit_preference(top.clone(), FitPreference::Loose, 15), top);
    }

    #[test]
    fn resolution_uses_the_chart_name_or_falls_back_to_the_default() {
        let recommender = SizeRecommender::new(&RecommenderConfig::default());
        let estimate = recommend_rule_based(145.0, 26.16, 10);

        let found = recommender.resolve(
            Sex::Male,
            estimate.clone(),
            FitPreference::Standard,
            Some(&chart_entry(SizeCode::Large, "Boys Large")),
        );
        assert_eq!(found.size_code, SizeCode::Large);
        assert_eq!(found.size_name, "Boys Large");
        assert!(!found.defaulted);

        let missing = recommender.resolve(Sex::Male, estimate, FitPreference::Standard, None);
        assert_eq!(missing.size_code, SizeCode::Medium);
        assert_eq!(missing.size_name, "Medium");
        assert!(missing.defaulted);
        assert_eq!(missing.alternatives[0].size_code, SizeCode::MediumPlus);
        assert_eq!(found.alternatives[0].size_code, SizeCode::LargePlus);
    }

    #[test]
    fn estimate_combines_strategies_and_fit() {
        let recommender = SizeRecommender::new(&RecommenderConfig::default());
        let request = RecommendationRequest {
            sex: Sex::Male,
            age: 13,
            height_cm: 150.0,
            bmi: 20.0,
            measurements: Some(BodyMeasurements {
                chest_cm: Some(70.0),
                ..BodyMeasurements::default()
            }),
            fit_preference: FitPreference::Loose,
        };

        let estimate = recommender.estimate(&request);
        assert_eq!(estimate.method, RecommendationMethod::MeasurementEnhanced);
        assert_eq!(estimate.size_code, SizeCode::MediumPlus);
        assert!((estimate.confidence - 0.81).abs() < 1e-9);
    }
}
