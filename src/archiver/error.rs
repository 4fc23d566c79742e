use thiserror::Error;

use crate::db::DatabaseError;
use crate::discord::SessionError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("cannot skip {requested} items, only {available} exist")]
    SequenceTooShort { requested: usize, available: usize },
}

impl ArchiveError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ArchiveError::Database(err) if err.is_not_unique())
    }
}
