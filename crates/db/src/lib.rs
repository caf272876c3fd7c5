pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoCohort, SeedResult, SeededStudent, VerificationResult};
pub use repositories::{
    seeded_size_chart, InMemorySizingStore, RepositoryError, SqlSizingStore, SqlSizingTransaction,
};
