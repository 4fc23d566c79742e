use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("database migration error: {0}")]
    Migration(String),
    #[error("database query error: {0}")]
    Query(String),
    /// A plain insert collided with an existing key.
    #[error("value does not meet the unique constraint: {0}")]
    NotUnique(String),
    #[error("failed to serialize column: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("archive transaction is closed")]
    Closed,
    #[error("archive transaction rolled back")]
    RolledBack,
}

impl DatabaseError {
    pub fn is_not_unique(&self) -> bool {
        matches!(self, DatabaseError::NotUnique(_))
    }
}

impl From<DieselError> for DatabaseError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                DatabaseError::NotUnique(info.message().to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }
}
