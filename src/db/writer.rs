use diesel::Connection;
use diesel::sqlite::SqliteConnection;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::DatabaseError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send>;
type Reply = oneshot::Sender<Result<(), DatabaseError>>;

enum WriterCommand {
    Run(Job),
    Commit(Reply),
    Rollback(Reply),
}

enum Finish {
    Commit(Reply),
    Rollback(Reply),
}

/// Handle to the one transaction of an archive run.
///
/// The connection lives on a dedicated writer thread that executes submitted
/// closures one at a time inside a single diesel transaction. Handles are
/// cheap to clone and may be used from any task; the writer is the only place
/// the connection is touched. Dropping every handle without committing rolls
/// the transaction back.
#[derive(Clone)]
pub struct ArchiveTransaction {
    sender: mpsc::UnboundedSender<WriterCommand>,
}

impl ArchiveTransaction {
    pub(crate) fn begin(conn: SqliteConnection) -> Result<Self, DatabaseError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("archive-writer".to_string())
            .spawn(move || run_writer(conn, receiver))
            .map_err(|e| DatabaseError::Connection(format!("failed to spawn writer: {e}")))?;
        Ok(Self { sender })
    }

    /// Runs `job` on the writer thread and waits for its result.
    pub async fn run<T, F>(&self, job: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply.send(job(conn));
        });
        self.sender
            .send(WriterCommand::Run(job))
            .map_err(|_| DatabaseError::Closed)?;
        result.await.map_err(|_| DatabaseError::Closed)?
    }

    pub async fn commit(&self) -> Result<(), DatabaseError> {
        self.finish(WriterCommand::Commit).await
    }

    pub async fn rollback(&self) -> Result<(), DatabaseError> {
        self.finish(WriterCommand::Rollback).await
    }

    async fn finish(&self, command: fn(Reply) -> WriterCommand) -> Result<(), DatabaseError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(command(reply))
            .map_err(|_| DatabaseError::Closed)?;
        result.await.map_err(|_| DatabaseError::Closed)?
    }
}

fn run_writer(mut conn: SqliteConnection, mut receiver: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut finish = None;

    let result = conn.transaction::<(), DatabaseError, _>(|conn| {
        while let Some(command) = receiver.blocking_recv() {
            match command {
                WriterCommand::Run(job) => job(conn),
                WriterCommand::Commit(reply) => {
                    finish = Some(Finish::Commit(reply));
                    return Ok(());
                }
                WriterCommand::Rollback(reply) => {
                    finish = Some(Finish::Rollback(reply));
                    return Err(DatabaseError::RolledBack);
                }
            }
        }
        Err(DatabaseError::RolledBack)
    });

    // Jobs still queued behind the commit are dropped; their callers see `Closed`.
    receiver.close();

    match finish {
        Some(Finish::Commit(reply)) => {
            if let Err(err) = &result {
                error!("archive transaction commit failed: {err}");
            }
            let _ = reply.send(result);
        }
        Some(Finish::Rollback(reply)) => {
            debug!("archive transaction rolled back");
            let _ = reply.send(match result {
                Ok(()) | Err(DatabaseError::RolledBack) => Ok(()),
                Err(err) => Err(err),
            });
        }
        None => warn!("archive transaction dropped without commit; rolled back"),
    }
}
