use tailor_core::config::MatchingRegime;
use tailor_core::domain::student::StudentId;

use crate::commands::{run_with_service, CommandFailure, CommandResult};

pub fn run(student_id: i64, regime: Option<MatchingRegime>) -> CommandResult {
    run_with_service("autofill", move |service| async move {
        service
            .autofill_measurements(StudentId(student_id), regime)
            .await
            .map_err(CommandFailure::from)
    })
}
