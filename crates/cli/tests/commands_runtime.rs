use std::env;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

use chrono::{Months, Utc};
use serde_json::Value;
use tailor_cli::commands::args::{BodyArgs, MeasurementArgs, StudentArgs};
use tailor_cli::commands::corrections::CorrectArgs;
use tailor_cli::commands::feedback::FeedbackArgs;
use tailor_cli::commands::recommend::RecommendArgs;
use tailor_cli::commands::students::SizeStudentArgs;
use tailor_cli::commands::{
    bias, config, corrections, feedback, migrate, recommend, seed, students, EXIT_CONFIG,
    EXIT_INVALID_INPUT, EXIT_NOT_FOUND,
};
use tailor_core::domain::feedback::{FeedbackSource, FitIssue, FitRating};
use tailor_core::domain::sizing::FitPreference;
use tailor_core::domain::student::Sex;

const MEMORY_DB: &[(&str, &str)] =
    &[("TAILOR_DATABASE_URL", "sqlite::memory:"), ("TAILOR_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_bad_override() {
    with_env(
        &[("TAILOR_DATABASE_URL", "sqlite::memory:"), ("TAILOR_DATABASE_MAX_CONNECTIONS", "many")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, EXIT_CONFIG, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("TAILOR_LEARNING_MIN_SAMPLES", "5"), ("TAILOR_LOG_LEVEL", "debug")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message
            .contains("- learning.min_samples = 5 (source: env (TAILOR_LEARNING_MIN_SAMPLES))"));
        assert!(message.contains("- logging.level = debug (source: env (TAILOR_LOG_LEVEL))"));
        assert!(message.contains("- drafts.ttl_secs = 1800 (source: default)"));
    });
}

#[test]
fn seed_loads_demo_cohort_idempotently() {
    with_env(MEMORY_DB, || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected seed success: {}", first.output);
        let payload = parse_payload(&first.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let students = payload["data"]["students"].as_array().cloned().unwrap_or_default();
        assert_eq!(students.len(), 5);
        assert_eq!(students[0]["external_id"], "DEMO-001");
        assert_eq!(students[4]["manual_measurements"], 0);

        let second = seed::run();
        assert_eq!(parse_payload(&second.output)["data"], payload["data"]);
    });
}

#[test]
fn recommend_previews_chart_backed_size() {
    with_env(MEMORY_DB, || {
        let result = recommend::run(RecommendArgs {
            body: body(Sex::Female, 150.0, 42.0),
            measurements: MeasurementArgs { bust_cm: Some(78.0), ..MeasurementArgs::default() },
            fit: FitPreference::Standard,
        });
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let data = &parse_payload(&result.output)["data"];
        assert_eq!(data["size_code"], "large");
        assert_eq!(data["size_name"], "Girls Large");
    });
}

#[test]
fn recommend_rejects_out_of_range_height() {
    with_env(MEMORY_DB, || {
        let result = recommend::run(RecommendArgs {
            body: body(Sex::Male, 20.0, 30.0),
            measurements: MeasurementArgs::default(),
            fit: FitPreference::Standard,
        });
        assert_eq!(result.exit_code, EXIT_INVALID_INPUT);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("correlation_id=cli-"));
    });
}

#[test]
fn unknown_student_is_not_found() {
    with_env(MEMORY_DB, || {
        let result = students::size(SizeStudentArgs {
            student_id: 404,
            measurements: MeasurementArgs::default(),
            fit: FitPreference::Standard,
            regime: None,
        });
        assert_eq!(result.exit_code, EXIT_NOT_FOUND);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");

        let correction = corrections::correct(CorrectArgs {
            student_id: 404,
            garment_type: "shirt".to_string(),
            measurement_name: "chest".to_string(),
            value_cm: 70.0,
            recorded_by: None,
        });
        assert_eq!(correction.exit_code, EXIT_NOT_FOUND);
    });
}

#[test]
fn register_returns_profile_with_metrics() {
    with_env(MEMORY_DB, || {
        let result = students::register(StudentArgs {
            external_id: "R-17".to_string(),
            full_name: "Test Student".to_string(),
            class_division: "4-B".to_string(),
            body: body(Sex::Male, 145.0, 55.0),
        });
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let data = &parse_payload(&result.output)["data"];
        assert_eq!(data["external_id"], "R-17");
        assert!(data["id"].as_i64().is_some());
    });
}

#[test]
fn ingest_reports_per_item_failures_without_aborting() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"[
            {{"student_id": 1, "garment_type": "shirt", "measurement_name": "chest", "value_cm": -4.0}},
            {{"student_id": 99, "garment_type": "shirt", "measurement_name": "chest", "value_cm": 70.0}}
        ]"#
    )
    .expect("write corrections");

    with_env(MEMORY_DB, || {
        let result = corrections::ingest(file.path().to_path_buf());
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let data = &parse_payload(&result.output)["data"];
        assert_eq!(data["saved"], 0);
        assert_eq!(data["failed"], 2);
        assert_eq!(data["items"][0]["status"]["status"], "failed");
        assert_eq!(data["items"][0]["status"]["error_class"], "validation");
        assert_eq!(data["items"][1]["status"]["error_class"], "not_found");
    });
}

#[test]
fn ingest_rejects_missing_file() {
    with_env(MEMORY_DB, || {
        let result = corrections::ingest("does-not-exist/corrections.json".into());
        assert_eq!(result.exit_code, EXIT_INVALID_INPUT);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ingest-corrections");
        assert!(payload["message"].as_str().unwrap_or_default().contains("could not read"));
    });
}

#[test]
fn bias_is_empty_on_fresh_database() {
    with_env(MEMORY_DB, || {
        let result = bias::run();
        assert_eq!(result.exit_code, 0, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["data"], serde_json::json!([]));
    });
}

#[test]
fn feedback_is_recorded_and_listed_for_a_stored_student() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("tailor.db").display());

    with_env(&[("TAILOR_DATABASE_URL", url.as_str())], || {
        let registered = students::register(StudentArgs {
            external_id: "R-21".to_string(),
            full_name: "Feedback Student".to_string(),
            class_division: "6-A".to_string(),
            body: body(Sex::Male, 145.0, 40.0),
        });
        assert_eq!(registered.exit_code, 0, "{}", registered.output);
        let student_id =
            parse_payload(&registered.output)["data"]["id"].as_i64().expect("student id");

        let args = FeedbackArgs {
            student_id,
            garment_type: "shirt".to_string(),
            rating: FitRating::SlightlyLarge,
            satisfaction: 4,
            issues: vec![FitIssue {
                area: "sleeves".to_string(),
                note: "slightly long".to_string(),
            }],
            size_code: None,
            comment: None,
            source: FeedbackSource::PostDelivery,
            responded_by: Some("parent".to_string()),
        };
        let out_of_range = feedback::record(FeedbackArgs { satisfaction: 9, ..args.clone() });
        assert_eq!(out_of_range.exit_code, EXIT_INVALID_INPUT);

        let saved = feedback::record(args);
        assert_eq!(saved.exit_code, 0, "{}", saved.output);
        assert_eq!(parse_payload(&saved.output)["data"]["fit_rating"], "slightly_large");

        let listed = feedback::list(student_id);
        let data = &parse_payload(&listed.output)["data"];
        assert_eq!(data.as_array().map(Vec::len), Some(1));
        assert_eq!(data[0]["specific_issues"][0]["area"], "sleeves");

        assert_eq!(feedback::list(student_id + 1).exit_code, EXIT_NOT_FOUND);
    });
}

fn body(sex: Sex, height_cm: f64, weight_kg: f64) -> BodyArgs {
    BodyArgs {
        sex,
        // Twelve years old whenever the suite runs.
        date_of_birth: Utc::now()
            .date_naive()
            .checked_sub_months(Months::new(12 * 12 + 1))
            .expect("date in range"),
        height_cm,
        weight_kg,
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TAILOR_DATABASE_URL",
        "TAILOR_DATABASE_MAX_CONNECTIONS",
        "TAILOR_DATABASE_TIMEOUT_SECS",
        "TAILOR_MATCHING_DEFAULT_REGIME",
        "TAILOR_LEARNING_MIN_SAMPLES",
        "TAILOR_LEARNING_MATERIALITY_CM",
        "TAILOR_RECOMMENDER_DEFAULT_SIZE_CODE",
        "TAILOR_VALIDATION_MIN_AGE",
        "TAILOR_VALIDATION_MAX_AGE",
        "TAILOR_DRAFTS_TTL_SECS",
        "TAILOR_LOGGING_LEVEL",
        "TAILOR_LOGGING_FORMAT",
        "TAILOR_LOG_LEVEL",
        "TAILOR_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
