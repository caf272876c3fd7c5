use tailor_db::{DemoCohort, SeedResult};

use crate::commands::{run_with_service, CommandFailure, CommandResult, EXIT_VERIFICATION};

pub fn run() -> CommandResult {
    run_with_service("seed", |service| async move {
        let seeded = DemoCohort::load(&service).await?;
        let verification = DemoCohort::verify(service.store()).await?;

        if !verification.all_present {
            let failed_checks = failed_checks(&verification.checks);
            return Err(CommandFailure::new(
                "seed_verification",
                verification_message(&failed_checks),
                EXIT_VERIFICATION,
            ));
        }

        Ok::<SeedResult, CommandFailure>(seeded)
    })
}

fn failed_checks<'a>(checks: &[(&'a str, bool)]) -> Vec<&'a str> {
    checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some demo students failed to load".to_string()
    } else {
        format!("Seed verification failed for students: {}", failed_checks.join(", "))
    }
}
