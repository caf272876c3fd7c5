//! Size preview for a student who is not on file. Nothing is written.

use clap::Args;
use tailor_core::domain::sizing::FitPreference;
use tailor_core::domain::student::StudentInput;

use crate::commands::args::{parse_fit, BodyArgs, MeasurementArgs};
use crate::commands::{run_with_service, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct RecommendArgs {
    #[command(flatten)]
    pub body: BodyArgs,
    #[command(flatten)]
    pub measurements: MeasurementArgs,
    #[arg(long, value_parser = parse_fit, default_value = "standard")]
    pub fit: FitPreference,
}

pub fn run(args: RecommendArgs) -> CommandResult {
    let input = StudentInput {
        external_id: "preview".to_string(),
        full_name: "preview".to_string(),
        class_division: "preview".to_string(),
        date_of_birth: args.body.date_of_birth,
        sex: args.body.sex,
        height_cm: args.body.height_cm,
        weight_kg: args.body.weight_kg,
    };
    let measurements = args.measurements.into_measurements();
    let fit = args.fit;

    run_with_service("recommend", move |service| async move {
        service
            .preview_recommendation(input, measurements, fit)
            .await
            .map_err(CommandFailure::from)
    })
}
