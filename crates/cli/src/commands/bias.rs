use crate::commands::{run_with_service, CommandFailure, CommandResult};

/// Learned per-measurement corrections, including keys still below the sample floor.
pub fn run() -> CommandResult {
    run_with_service("bias", |service| async move {
        service.bias_adjustments().await.map_err(CommandFailure::from)
    })
}
