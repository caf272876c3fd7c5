//! Manual tape measurements. Each save feeds the bias learning loop when it
//! overrides an autofilled value.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tailor_core::domain::student::StudentId;
use tailor_core::service::ManualMeasurement;

use crate::commands::{run_with_service, CommandFailure, CommandResult, EXIT_INVALID_INPUT};

#[derive(Debug, Clone, Args)]
pub struct CorrectArgs {
    #[arg(long)]
    pub student_id: i64,
    #[arg(long, help = "Garment the measurement belongs to, e.g. shirt")]
    pub garment_type: String,
    #[arg(long, help = "Measurement name, e.g. chest")]
    pub measurement_name: String,
    #[arg(long)]
    pub value_cm: f64,
    #[arg(long)]
    pub recorded_by: Option<String>,
}

pub fn correct(args: CorrectArgs) -> CommandResult {
    let measurement = ManualMeasurement {
        student_id: StudentId(args.student_id),
        garment_type: args.garment_type,
        measurement_name: args.measurement_name,
        value_cm: args.value_cm,
        recorded_by: args.recorded_by,
    };
    run_with_service("correct", move |service| async move {
        service.record_manual_measurement(measurement).await.map_err(CommandFailure::from)
    })
}

/// Replays a JSON array of manual measurements. Per-item failures are reported, not fatal.
pub fn ingest(file: PathBuf) -> CommandResult {
    let corrections = match read_corrections(&file) {
        Ok(corrections) => corrections,
        Err(error) => {
            return CommandResult::failure(
                "ingest-corrections",
                "validation",
                format!("{error:#}"),
                EXIT_INVALID_INPUT,
            );
        }
    };

    run_with_service("ingest-corrections", move |service| async move {
        Ok::<_, CommandFailure>(service.ingest_corrections(corrections).await)
    })
}

fn read_corrections(path: &Path) -> anyhow::Result<Vec<ManualMeasurement>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read corrections file `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("corrections file `{}` is not a JSON array", path.display()))
}
