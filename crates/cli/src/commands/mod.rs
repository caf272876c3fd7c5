pub mod args;
pub mod autofill;
pub mod bias;
pub mod config;
pub mod corrections;
pub mod feedback;
pub mod migrate;
pub mod recommend;
pub mod seed;
pub mod students;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use tailor_core::config::{AppConfig, LoadOptions};
use tailor_core::errors::{ApplicationError, SizingError};
use tailor_core::SizingService;
use tailor_db::{connect_with_config, migrations, DbPool, SqlSizingStore};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: Some(message.into()),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn with_data(command: &str, data: &impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: None,
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(
                command,
                "serialization",
                format!("could not encode result: {error}"),
                EXIT_INTERNAL,
            ),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: Some(message.into()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECT: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_VERIFICATION: u8 = 6;
pub const EXIT_INVALID_INPUT: u8 = 7;
pub const EXIT_NOT_FOUND: u8 = 8;
pub const EXIT_STORAGE: u8 = 9;
pub const EXIT_INTERNAL: u8 = 10;

/// A failed command before it is rendered for the operator.
#[derive(Debug)]
pub(crate) struct CommandFailure {
    error_class: &'static str,
    message: String,
    exit_code: u8,
}

impl CommandFailure {
    pub(crate) fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code }
    }

    pub(crate) fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.error_class, self.message, self.exit_code)
    }
}

impl From<SizingError> for CommandFailure {
    fn from(error: SizingError) -> Self {
        let correlation_id = format!("cli-{}", Uuid::new_v4());
        let interface = ApplicationError::from(error).into_interface(correlation_id.clone());
        let error_class = interface.error_class();
        let exit_code = match error_class {
            "validation" => EXIT_INVALID_INPUT,
            "not_found" => EXIT_NOT_FOUND,
            "storage" => EXIT_STORAGE,
            _ => EXIT_INTERNAL,
        };

        warn!(
            event_name = "cli.command.failed",
            correlation_id = %correlation_id,
            error_class,
            error = %interface,
            "sizing operation failed"
        );
        Self {
            error_class,
            message: format!(
                "{} {interface} (correlation_id={correlation_id})",
                interface.user_message()
            ),
            exit_code,
        }
    }
}

pub(crate) fn load_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandFailure::new(
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandFailure::new(
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Connects and brings the schema up to date. Every command runs against a migrated database.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, CommandFailure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), EXIT_DB_CONNECT))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| CommandFailure::new("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// Runs one sizing operation against the configured database and renders its result.
pub(crate) fn run_with_service<T, F, Fut>(command: &str, operation: F) -> CommandResult
where
    T: Serialize,
    F: FnOnce(SizingService<SqlSizingStore>) -> Fut,
    Fut: Future<Output = Result<T, CommandFailure>>,
{
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => return failure.into_result(command),
    };
    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return failure.into_result(command),
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let service = SizingService::new(SqlSizingStore::new(pool.clone()), &config);
        let outcome = operation(service).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(data) => CommandResult::with_data(command, &data),
        Err(failure) => failure.into_result(command),
    }
}
