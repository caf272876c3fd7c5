//! End-to-end sizing flows run against both the SQLite store and the in-memory store.

use chrono::NaiveDate;

use tailor_core::autofill::AutofillOutcome;
use tailor_core::config::{AppConfig, MatchingRegime};
use tailor_core::domain::feedback::{FeedbackSource, FitFeedbackInput, FitIssue, FitRating};
use tailor_core::domain::measurement::{MeasurementKey, MeasurementMethod, MeasurementState};
use tailor_core::domain::sizing::{BodyMeasurements, FitPreference, RecommendationMethod, SizeCode};
use tailor_core::domain::student::{Sex, StudentId, StudentInput, StudentProfile};
use tailor_core::errors::SizingError;
use tailor_core::service::{IngestStatus, ManualMeasurement};
use tailor_core::store::{SizingStore, SizingTransaction};
use tailor_core::SizingService;
use tailor_db::{connect_with_settings, migrations, InMemorySizingStore, SqlSizingStore};

macro_rules! for_each_store {
    ($($scenario:ident),* $(,)?) => {
        mod sql_store {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(super::sql_service().await).await;
                }
            )*
        }

        mod memory_store {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario(super::memory_service()).await;
                }
            )*
        }
    };
}

for_each_store!(
    autofill_copies_the_nearest_manual_profile,
    rule_based_recommendation_is_persisted_with_history,
    snug_fit_into_a_chart_gap_falls_back_to_the_default,
    autofill_is_idempotent,
    bias_converges_and_applies_after_enough_samples,
    autofill_never_sources_from_autofilled_profiles,
    manual_values_are_never_replaced_by_autofill,
    resaving_a_manual_value_is_learned_once,
    dropped_transactions_leave_no_trace,
    deleting_a_student_removes_dependent_rows,
    ingest_reports_each_correction,
    finalized_draft_is_persisted_and_sized,
    unknown_students_are_reported_as_not_found,
    fit_feedback_is_kept_against_the_recommended_size,
);

fn config() -> AppConfig {
    AppConfig::default()
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date")
}

async fn sql_service() -> SizingService<SqlSizingStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    SizingService::new(SqlSizingStore::new(pool), &config()).with_reference_date(reference_date())
}

fn memory_service() -> SizingService<InMemorySizingStore> {
    SizingService::new(InMemorySizingStore::new(), &config()).with_reference_date(reference_date())
}

fn student(
    external_id: &str,
    sex: Sex,
    born: (i32, u32, u32),
    height_cm: f64,
    weight_kg: f64,
) -> StudentInput {
    StudentInput {
        external_id: external_id.to_string(),
        full_name: format!("Student {external_id}"),
        class_division: "8-B".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(born.0, born.1, born.2).expect("valid date"),
        sex,
        height_cm,
        weight_kg,
    }
}

/// Fourteen on the reference date.
const BORN_2012: (i32, u32, u32) = (2012, 3, 10);
/// Ten on the reference date.
const BORN_2016: (i32, u32, u32) = (2016, 2, 1);

fn manual(student_id: StudentId, value_cm: f64) -> ManualMeasurement {
    ManualMeasurement {
        student_id,
        garment_type: "shirt".to_string(),
        measurement_name: "chest".to_string(),
        value_cm,
        recorded_by: Some("tailor-7".to_string()),
    }
}

fn chest() -> MeasurementKey {
    MeasurementKey::new("shirt", "chest")
}

async fn register<S: SizingStore>(
    service: &SizingService<S>,
    external_id: &str,
    height_cm: f64,
    weight_kg: f64,
) -> StudentProfile {
    service
        .register_student(student(external_id, Sex::Male, BORN_2012, height_cm, weight_kg))
        .await
        .expect("register student")
}

async fn chest_value<S: SizingStore>(
    service: &SizingService<S>,
    student_id: StudentId,
) -> Option<(f64, MeasurementMethod)> {
    let mut tx = service.store().begin().await.expect("begin");
    tx.get_measurement(student_id, &chest())
        .await
        .expect("read measurement")
        .map(|record| (record.value_cm, record.method))
}

async fn autofill_copies_the_nearest_manual_profile<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-1", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-1", 160.5, 50.5).await;

    let outcome =
        service.autofill_measurements(b.id, Some(MatchingRegime::Tight)).await.expect("autofill");

    let AutofillOutcome::Filled {
        source_student_id,
        similarity_score,
        confidence,
        records,
        kept_manual,
    } = outcome
    else {
        panic!("B should match A");
    };
    assert_eq!(source_student_id, a.id);
    assert_eq!(similarity_score, 98.29);
    assert_eq!(confidence, 0.9829);
    assert!(kept_manual.is_empty());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, chest());
    assert_eq!(records[0].value_cm, 85.0);
    assert_eq!(records[0].bias_applied_cm, 0.0);

    let views = service.measurement_states(b.id).await.expect("states");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].record.method, MeasurementMethod::Auto);
    assert_eq!(
        views[0].state,
        MeasurementState::Autofilled { confidence: 0.9829, source_student_id: a.id }
    );
}

async fn rule_based_recommendation_is_persisted_with_history<S: SizingStore>(
    service: SizingService<S>,
) {
    let profile = service
        .register_student(student("R-145", Sex::Male, BORN_2016, 145.0, 55.0))
        .await
        .expect("register");
    assert_eq!(profile.metrics.age, 10);
    assert_eq!(profile.metrics.bmi, 26.16);
    assert_eq!(profile.metrics.bpc, 23.2608);

    let recommendation =
        service.recommend_size(profile.id, None, FitPreference::Standard).await.expect("recommend");

    assert_eq!(recommendation.size_code, SizeCode::Large);
    assert_eq!(recommendation.size_name, "Boys Large");
    assert_eq!(recommendation.method_used, RecommendationMethod::RuleBased);
    assert_eq!(recommendation.confidence, 0.85);
    assert!(!recommendation.defaulted);
    let alternatives: Vec<(SizeCode, f64)> = recommendation
        .alternatives
        .iter()
        .map(|alternative| (alternative.size_code, alternative.confidence))
        .collect();
    assert_eq!(alternatives, vec![(SizeCode::LargePlus, 0.075), (SizeCode::MediumPlus, 0.075)]);

    let stored = service.get_profile(profile.id).await.expect("profile");
    assert_eq!(stored.recommended_size, Some(SizeCode::Large));

    let history = service.recommendation_history(profile.id).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].recommendation, recommendation);
}

async fn snug_fit_into_a_chart_gap_falls_back_to_the_default<S: SizingStore>(
    service: SizingService<S>,
) {
    let profile = service
        .register_student(student("R-146", Sex::Male, BORN_2016, 145.0, 55.0))
        .await
        .expect("register");

    let recommendation =
        service.recommend_size(profile.id, None, FitPreference::Snug).await.expect("recommend");

    assert!(recommendation.defaulted);
    assert_eq!(recommendation.size_code, SizeCode::Medium);
    assert_eq!(recommendation.size_name, "Medium");
    assert!((recommendation.confidence - 0.765).abs() < 1e-9);
    assert_eq!(recommendation.fit_preference, FitPreference::Snug);
}

async fn autofill_is_idempotent<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-2", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-2", 160.5, 50.5).await;

    let first = service.autofill_measurements(b.id, None).await.expect("first run");
    let after_first = service.measurement_states(b.id).await.expect("states");
    let second = service.autofill_measurements(b.id, None).await.expect("second run");
    let after_second = service.measurement_states(b.id).await.expect("states");

    assert_eq!(first.filled_count(), second.filled_count());
    let summarize = |views: &[tailor_core::service::MeasurementView]| -> Vec<_> {
        views
            .iter()
            .map(|view| {
                (
                    view.record.key.clone(),
                    view.record.value_cm,
                    view.record.method,
                    view.record.source_student_id,
                    view.state.clone(),
                )
            })
            .collect()
    };
    assert_eq!(summarize(&after_first), summarize(&after_second));
}

async fn bias_converges_and_applies_after_enough_samples<S: SizingStore>(
    service: SizingService<S>,
) {
    let source = register(&service, "SRC", 160.0, 50.0).await;
    service.record_manual_measurement(manual(source.id, 85.0)).await.expect("source chest");

    let mut targets = Vec::new();
    for (index, height_cm) in [160.2, 160.4, 160.6].into_iter().enumerate() {
        let target = register(&service, &format!("T-{index}"), height_cm, 50.0).await;
        let outcome = service.autofill_measurements(target.id, None).await.expect("autofill");
        assert_eq!(outcome.filled_count(), 1);
        targets.push(target);
    }
    let newcomer = register(&service, "NEWCOMER", 160.0, 50.0).await;

    for target in &targets[..2] {
        let saved = service.record_manual_measurement(manual(target.id, 86.0)).await.expect("fix");
        assert_eq!(saved.state, MeasurementState::ManuallyCorrected);
    }
    service.autofill_measurements(newcomer.id, None).await.expect("newcomer autofill");
    assert_eq!(
        chest_value(&service, newcomer.id).await,
        Some((85.0, MeasurementMethod::Auto)),
        "two samples are below the threshold"
    );

    let saved = service.record_manual_measurement(manual(targets[2].id, 86.0)).await.expect("fix");
    let feedback = saved.feedback.expect("learning feedback");
    assert_eq!(feedback.entry.signed_difference, 1.0);
    assert_eq!(feedback.bias.sample_count, 3);
    assert!((feedback.bias.avg_error - 1.0).abs() < 1e-9);

    let outcome = service.autofill_measurements(newcomer.id, None).await.expect("newcomer autofill");
    let AutofillOutcome::Filled { source_student_id, records, .. } = outcome else {
        panic!("newcomer should match the source profile");
    };
    assert_eq!(source_student_id, source.id);
    assert_eq!(records[0].raw_value_cm, 85.0);
    assert_eq!(records[0].bias_applied_cm, 1.0);
    assert_eq!(records[0].value_cm, 86.0);

    let biases = service.bias_adjustments().await.expect("biases");
    assert_eq!(biases.len(), 1);
    assert_eq!(biases[0].key, chest());
}

async fn autofill_never_sources_from_autofilled_profiles<S: SizingStore>(
    service: SizingService<S>,
) {
    let a = register(&service, "A-3", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-3", 160.5, 50.5).await;
    service.autofill_measurements(b.id, None).await.expect("autofill B");

    // Closer to B than to A, so only the manual-measurement rule keeps B out.
    service.delete_student(a.id).await.expect("delete A");
    let c = register(&service, "C-3", 160.6, 50.6).await;

    let outcome = service.autofill_measurements(c.id, None).await.expect("autofill C");
    assert_eq!(outcome, AutofillOutcome::NoMatch);
    assert_eq!(chest_value(&service, c.id).await, None);
}

async fn manual_values_are_never_replaced_by_autofill<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-4", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-4", 160.5, 50.5).await;
    service.record_manual_measurement(manual(b.id, 83.5)).await.expect("B chest");

    let outcome = service.autofill_measurements(b.id, None).await.expect("autofill");

    let AutofillOutcome::Filled { kept_manual, records, .. } = outcome else {
        panic!("B should still match A");
    };
    assert_eq!(kept_manual, vec![chest()]);
    assert_eq!(records[0].value_cm, 85.0);
    assert_eq!(chest_value(&service, b.id).await, Some((83.5, MeasurementMethod::Manual)));

    // The autofill came after the tape measurement, so nothing was corrected.
    let views = service.measurement_states(b.id).await.expect("states");
    assert_eq!(views[0].state, MeasurementState::ManuallyConfirmed);
}

async fn resaving_a_manual_value_is_learned_once<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-8", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-8", 160.5, 50.5).await;
    service.size_student(b.id, None, FitPreference::Standard, None).await.expect("size B");

    let first = service.record_manual_measurement(manual(b.id, 87.0)).await.expect("first save");
    assert_eq!(first.state, MeasurementState::ManuallyCorrected);
    assert_eq!(first.feedback.expect("learned").bias.sample_count, 1);

    for _ in 0..2 {
        let again = service.record_manual_measurement(manual(b.id, 87.0)).await.expect("re-save");
        assert_eq!(again.feedback, None);
    }

    let biases = service.bias_adjustments().await.expect("biases");
    assert_eq!(biases.len(), 1);
    assert_eq!((biases[0].avg_error, biases[0].sample_count), (2.0, 1));
    let mut tx = service.store().begin().await.expect("begin");
    assert_eq!(tx.list_accuracy_log(&chest()).await.expect("log").len(), 1);
}

async fn dropped_transactions_leave_no_trace<S: SizingStore>(service: SizingService<S>) {
    let prepared = service
        .prepare_profile(student("GHOST", Sex::Female, BORN_2012, 152.0, 44.0))
        .expect("valid input");

    {
        let mut tx = service.store().begin().await.expect("begin");
        let profile = tx.upsert_profile(&prepared).await.expect("upsert");
        tx.set_recommended_size(profile.id, SizeCode::Large).await.expect("size");
    }

    let mut tx = service.store().begin().await.expect("begin");
    assert_eq!(tx.get_profile_by_external_id("GHOST").await.expect("lookup"), None);
}

async fn deleting_a_student_removes_dependent_rows<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-5", 160.0, 50.0).await;
    service.record_manual_measurement(manual(a.id, 85.0)).await.expect("A chest");
    let b = register(&service, "B-5", 160.5, 50.5).await;
    service.size_student(b.id, None, FitPreference::Standard, None).await.expect("size B");
    let c = register(&service, "C-5", 159.5, 49.5).await;
    service.size_student(c.id, None, FitPreference::Standard, None).await.expect("size C");
    service.record_manual_measurement(manual(b.id, 86.0)).await.expect("B correction");
    service.record_manual_measurement(manual(c.id, 88.0)).await.expect("C correction");

    let before = service.bias_adjustments().await.expect("bias");
    assert_eq!(before.len(), 1);
    assert_eq!((before[0].avg_error, before[0].sample_count), (2.0, 2));

    assert!(service.delete_student(b.id).await.expect("delete"));
    assert!(!service.delete_student(b.id).await.expect("second delete"));

    let mut tx = service.store().begin().await.expect("begin");
    assert!(tx.list_measurements(b.id).await.expect("list").is_empty());
    assert_eq!(tx.get_autofill_record(b.id, &chest()).await.expect("autofill"), None);
    assert_eq!(tx.list_accuracy_log(&chest()).await.expect("log").len(), 1);
    assert!(tx.list_size_recommendations(b.id).await.expect("history").is_empty());
    assert_eq!(tx.list_measurements(a.id).await.expect("list").len(), 1);
    let bias = tx.get_bias_adjustment(&chest()).await.expect("bias").expect("C still logged");
    assert_eq!((bias.avg_error, bias.sample_count), (3.0, 1));
    drop(tx);

    assert!(service.delete_student(c.id).await.expect("delete C"));
    let mut tx = service.store().begin().await.expect("begin");
    assert!(tx.list_accuracy_log(&chest()).await.expect("log").is_empty());
    assert_eq!(tx.get_bias_adjustment(&chest()).await.expect("bias"), None);
}

async fn ingest_reports_each_correction<S: SizingStore>(service: SizingService<S>) {
    let a = register(&service, "A-6", 160.0, 50.0).await;

    let report = service
        .ingest_corrections(vec![
            manual(a.id, 84.0),
            manual(a.id, -3.0),
            manual(StudentId(999), 80.0),
        ])
        .await;

    assert_eq!(report.saved, 1);
    assert_eq!(report.failed, 2);
    assert!(matches!(report.items[0].status, IngestStatus::Saved { .. }));
    let classes: Vec<&str> = report.items[1..]
        .iter()
        .map(|item| match &item.status {
            IngestStatus::Failed { error_class, .. } => error_class.as_str(),
            IngestStatus::Saved { .. } => "saved",
        })
        .collect();
    assert_eq!(classes, vec!["validation", "not_found"]);
    assert_eq!(chest_value(&service, a.id).await, Some((84.0, MeasurementMethod::Manual)));
}

async fn finalized_draft_is_persisted_and_sized<S: SizingStore>(service: SizingService<S>) {
    let now = chrono::Utc::now();
    let draft = service.drafts().create(now);
    service
        .drafts()
        .set_student(&draft.id, student("D-1", Sex::Female, BORN_2012, 150.0, 42.0), now)
        .expect("student step");
    service
        .drafts()
        .set_measurements(
            &draft.id,
            BodyMeasurements { bust_cm: Some(78.0), ..BodyMeasurements::default() },
            FitPreference::Standard,
            now,
        )
        .expect("measurement step");

    let finalized = service.finalize_draft(&draft.id, None).await.expect("finalize");

    assert_eq!(finalized.profile.external_id, "D-1");
    assert_eq!(finalized.report.recommendation.size_code, SizeCode::Large);
    assert_eq!(
        finalized.report.recommendation.method_used,
        RecommendationMethod::MeasurementEnhanced
    );
    assert_eq!(finalized.report.autofill, AutofillOutcome::NoMatch);
    assert!(service.drafts().is_empty());

    let stored = service.get_profile(finalized.profile.id).await.expect("stored");
    assert_eq!(stored.recommended_size, Some(SizeCode::Large));

    let again = service.finalize_draft(&draft.id, None).await;
    assert!(matches!(again, Err(SizingError::DraftNotFound(_))));
}

async fn unknown_students_are_reported_as_not_found<S: SizingStore>(service: SizingService<S>) {
    let missing = StudentId(4242);

    assert_eq!(
        service.recommend_size(missing, None, FitPreference::Standard).await,
        Err(SizingError::StudentNotFound(missing))
    );
    assert_eq!(
        service.autofill_measurements(missing, None).await,
        Err(SizingError::StudentNotFound(missing))
    );
    assert!(matches!(
        service.record_manual_measurement(manual(missing, 80.0)).await,
        Err(SizingError::StudentNotFound(_))
    ));
}

async fn fit_feedback_is_kept_against_the_recommended_size<S: SizingStore>(
    service: SizingService<S>,
) {
    let profile = service
        .register_student(student("F-1", Sex::Male, BORN_2016, 145.0, 55.0))
        .await
        .expect("register");
    service.recommend_size(profile.id, None, FitPreference::Standard).await.expect("recommend");

    let input = FitFeedbackInput {
        student_id: profile.id,
        garment_type: "shirt".to_string(),
        size_code: None,
        fit_rating: FitRating::SlightlyLarge,
        specific_issues: vec![FitIssue {
            area: "sleeves".to_string(),
            note: "slightly long".to_string(),
        }],
        satisfaction_score: 4,
        comment: Some("good fit apart from the sleeves".to_string()),
        source: FeedbackSource::PostDelivery,
        responded_by: Some("parent".to_string()),
    };
    let saved = service.record_fit_feedback(input.clone()).await.expect("feedback");
    assert_eq!(saved.size_code, Some(SizeCode::Large));

    let rejected = service
        .record_fit_feedback(FitFeedbackInput { satisfaction_score: 0, ..input.clone() })
        .await;
    assert!(matches!(rejected, Err(SizingError::Validation(_))));
    let missing = service
        .record_fit_feedback(FitFeedbackInput { student_id: StudentId(999), ..input })
        .await;
    assert!(matches!(missing, Err(SizingError::StudentNotFound(_))));

    let listed = service.fit_feedback(profile.id).await.expect("list feedback");
    assert_eq!(listed, vec![saved]);

    service.delete_student(profile.id).await.expect("delete");
    let mut tx = service.store().begin().await.expect("begin");
    assert!(tx.list_fit_feedback(profile.id).await.expect("list").is_empty());
}
