use thiserror::Error;

use tailor_core::errors::StoreError;

pub mod memory;
pub mod sizing;

pub use memory::{seeded_size_chart, InMemorySizingStore, InMemorySizingTransaction};
pub use sizing::{SqlSizingStore, SqlSizingTransaction};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Database(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::NotFound(message) => StoreError::NotFound(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use tailor_core::errors::StoreError;

    use super::RepositoryError;

    #[test]
    fn repository_errors_keep_their_class_in_the_core_taxonomy() {
        assert_eq!(
            StoreError::from(RepositoryError::Decode("bad gender `X`".to_string())),
            StoreError::Decode("bad gender `X`".to_string())
        );
        assert!(matches!(
            StoreError::from(RepositoryError::Database(sqlx::Error::RowNotFound)),
            StoreError::Database(_)
        ));
    }
}
