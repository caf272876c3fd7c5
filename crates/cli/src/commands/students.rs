use clap::Args;
use tailor_core::config::MatchingRegime;
use tailor_core::domain::sizing::FitPreference;
use tailor_core::domain::student::StudentId;

use crate::commands::args::{parse_fit, parse_regime, MeasurementArgs, StudentArgs};
use crate::commands::{run_with_service, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct SizeStudentArgs {
    #[arg(long)]
    pub student_id: i64,
    #[command(flatten)]
    pub measurements: MeasurementArgs,
    #[arg(long, value_parser = parse_fit, default_value = "standard")]
    pub fit: FitPreference,
    #[arg(long, value_parser = parse_regime, help = "tight or loose; defaults to the configured regime")]
    pub regime: Option<MatchingRegime>,
}

pub fn register(args: StudentArgs) -> CommandResult {
    let input = args.into_input();
    run_with_service("register", move |service| async move {
        service.register_student(input).await.map_err(CommandFailure::from)
    })
}

/// Recommendation and autofill for a stored student in one unit of work.
pub fn size(args: SizeStudentArgs) -> CommandResult {
    let measurements = args.measurements.into_measurements();
    run_with_service("size-student", move |service| async move {
        service
            .size_student(StudentId(args.student_id), measurements, args.fit, args.regime)
            .await
            .map_err(CommandFailure::from)
    })
}

pub fn show(student_id: i64) -> CommandResult {
    run_with_service("show", move |service| async move {
        service.get_profile(StudentId(student_id)).await.map_err(CommandFailure::from)
    })
}

pub fn measurements(student_id: i64) -> CommandResult {
    run_with_service("measurements", move |service| async move {
        service.measurement_states(StudentId(student_id)).await.map_err(CommandFailure::from)
    })
}

pub fn history(student_id: i64) -> CommandResult {
    run_with_service("history", move |service| async move {
        service.recommendation_history(StudentId(student_id)).await.map_err(CommandFailure::from)
    })
}

pub fn delete(student_id: i64) -> CommandResult {
    run_with_service("delete", move |service| async move {
        let deleted = service.delete_student(StudentId(student_id)).await?;
        Ok::<_, CommandFailure>(serde_json::json!({ "student_id": student_id, "deleted": deleted }))
    })
}
