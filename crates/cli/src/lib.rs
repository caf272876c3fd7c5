pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tailor_core::config::MatchingRegime;

use commands::args::{parse_regime, StudentArgs};
use commands::corrections::CorrectArgs;
use commands::feedback::FeedbackArgs;
use commands::recommend::RecommendArgs;
use commands::students::SizeStudentArgs;

#[derive(Debug, Parser)]
#[command(
    name = "tailor",
    about = "Uniform sizing operator CLI",
    long_about = "Register students, recommend uniform sizes, autofill garment measurements from \
                  similar students and feed tailor corrections back into the bias model.",
    after_help = "Examples:\n  tailor migrate\n  tailor seed\n  tailor size-student --student-id 1 --fit snug\n  tailor correct --student-id 1 --garment-type shirt --measurement-name chest --value-cm 72"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo student cohort and verify it round-trips")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Register or update a student profile and derive its body metrics")]
    Register(StudentArgs),
    #[command(about = "Preview a size recommendation without storing anything")]
    Recommend(RecommendArgs),
    #[command(about = "Recommend a size and autofill measurements for a stored student")]
    SizeStudent(SizeStudentArgs),
    #[command(about = "Autofill garment measurements from the closest matching student")]
    Autofill {
        #[arg(long)]
        student_id: i64,
        #[arg(long, value_parser = parse_regime)]
        regime: Option<MatchingRegime>,
    },
    #[command(about = "Record a manual measurement, learning from any autofill it overrides")]
    Correct(CorrectArgs),
    #[command(about = "Record a JSON array of manual measurements, one result per item")]
    IngestCorrections {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Show a stored student profile")]
    Show {
        #[arg(long)]
        student_id: i64,
    },
    #[command(about = "List measurements with their manual/autofill state")]
    Measurements {
        #[arg(long)]
        student_id: i64,
    },
    #[command(about = "List persisted size recommendations, oldest first")]
    History {
        #[arg(long)]
        student_id: i64,
    },
    #[command(about = "Delete a student and everything recorded for them")]
    Delete {
        #[arg(long)]
        student_id: i64,
    },
    #[command(about = "List learned bias adjustments per garment measurement")]
    Bias,
    #[command(about = "Record post-delivery fit feedback for a student's garment")]
    Feedback(FeedbackArgs),
    #[command(about = "List fit feedback recorded for a student, oldest first")]
    FeedbackHistory {
        #[arg(long)]
        student_id: i64,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Register(args) => commands::students::register(args),
        Command::Recommend(args) => commands::recommend::run(args),
        Command::SizeStudent(args) => commands::students::size(args),
        Command::Autofill { student_id, regime } => commands::autofill::run(student_id, regime),
        Command::Correct(args) => commands::corrections::correct(args),
        Command::IngestCorrections { file } => commands::corrections::ingest(file),
        Command::Show { student_id } => commands::students::show(student_id),
        Command::Measurements { student_id } => commands::students::measurements(student_id),
        Command::History { student_id } => commands::students::history(student_id),
        Command::Delete { student_id } => commands::students::delete(student_id),
        Command::Bias => commands::bias::run(),
        Command::Feedback(args) => commands::feedback::record(args),
        Command::FeedbackHistory { student_id } => commands::feedback::list(student_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
