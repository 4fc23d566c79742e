pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::stores::{ArchiveQueries, ArchiveStore, SchemaFeatures};
pub use self::writer::ArchiveTransaction;

pub mod error;
pub mod manager;
pub mod models;
pub mod stores;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;
