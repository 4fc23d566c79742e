use std::path::{Path, PathBuf};

use diesel::Connection;
use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::{ArchiveTransaction, DatabaseError};

const DEFAULT_DATABASE_FILE: &str = "archive.db";

#[derive(Clone, Debug)]
pub struct DatabaseManager {
    sqlite_path: PathBuf,
}

impl DatabaseManager {
    /// Resolves the database location; relative filenames live under `save_path`.
    pub fn new(config: &DatabaseConfig, save_path: impl AsRef<Path>) -> Self {
        let filename = config
            .filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DATABASE_FILE);
        let path = Path::new(filename);
        let sqlite_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            save_path.as_ref().join(path)
        };
        Self { sqlite_path }
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    /// Opens a connection and starts the run's transaction on a writer thread.
    pub async fn begin(&self) -> Result<ArchiveTransaction, DatabaseError> {
        let path = self.sqlite_path.to_string_lossy().to_string();
        let conn = tokio::task::spawn_blocking(move || establish_connection(&path))
            .await
            .map_err(|e| DatabaseError::Connection(format!("connection task failed: {e}")))??;

        info!("opened archive database {}", self.sqlite_path.display());
        ArchiveTransaction::begin(conn)
    }
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    conn.batch_execute("PRAGMA busy_timeout = 5000;")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;

    #[test]
    fn relative_filename_lands_under_save_path() {
        let config = DatabaseConfig {
            filename: Some("history.db".to_string()),
        };

        let manager = DatabaseManager::new(&config, "/srv/archive");

        assert_eq!(manager.sqlite_path(), Path::new("/srv/archive/history.db"));
    }

    #[test]
    fn missing_filename_uses_default() {
        let manager = DatabaseManager::new(&DatabaseConfig::default(), "out");
        assert_eq!(manager.sqlite_path(), Path::new("out/archive.db"));
    }

    #[tokio::test]
    async fn begin_opens_transaction() {
        let dir = TempDir::new().expect("temp dir");
        let manager = DatabaseManager::new(&DatabaseConfig::default(), dir.path());

        let tx = manager.begin().await.expect("begin");
        let one = tx
            .run(|conn| {
                use diesel::RunQueryDsl;
                diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
                    .get_result::<i32>(conn)
                    .map_err(Into::into)
            })
            .await
            .expect("query");

        assert_eq!(one, 1);
        tx.commit().await.expect("commit");
        assert!(dir.path().join("archive.db").exists());
    }
}
