//! Store Writer Actor
//!
//! A dedicated thread owns the only writable connection and runs queued jobs
//! one at a time, each inside an IMMEDIATE transaction. Readers use their own
//! connections, so they never wait on anything but a commit in progress.

use std::any::Any;
use std::thread;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};

/// Queued jobs before senders start waiting.
const WRITER_QUEUE_DEPTH: usize = 1024;

type Job = Box<dyn FnOnce(&Transaction<'_>) -> Result<Box<dyn Any + Send>> + Send + 'static>;

enum Message {
    Job(Job, oneshot::Sender<Result<Box<dyn Any + Send>>>),
    Shutdown(oneshot::Sender<()>),
}

// == Write Handle ==
/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<Message>,
}

impl WriteHandle {
    /// Runs `job` inside a write transaction on the writer thread.
    ///
    /// The transaction commits if the job returns `Ok` and rolls back
    /// otherwise.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |tx| job(tx).map(|v| Box::new(v) as Box<dyn Any + Send>));

        self.tx
            .send(Message::Job(job, reply_tx))
            .await
            .map_err(|_| CacheError::WriterClosed)?;

        let boxed = reply_rx.await.map_err(|_| CacheError::WriterClosed)??;
        boxed
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| CacheError::Internal("writer returned an unexpected type".to_string()))
    }

    /// Stops the actor after every job queued so far has run.
    pub async fn shutdown(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown(done_tx))
            .await
            .map_err(|_| CacheError::WriterClosed)?;
        done_rx.await.map_err(|_| CacheError::WriterClosed)
    }
}

// == Spawn ==
/// Spawns the writer thread, which takes ownership of `conn`.
pub fn spawn_writer(conn: Connection) -> Result<WriteHandle> {
    let (tx, rx) = mpsc::channel::<Message>(WRITER_QUEUE_DEPTH);

    thread::Builder::new()
        .name("market-cache-writer".to_string())
        .spawn(move || run(conn, rx))?;

    Ok(WriteHandle { tx })
}

fn run(mut conn: Connection, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            Message::Job(job, reply_tx) => {
                let result = execute(&mut conn, job);
                // The caller may have given up waiting; the write stands regardless.
                let _ = reply_tx.send(result);
            }
            Message::Shutdown(done_tx) => {
                rx.close();
                let _ = done_tx.send(());
                break;
            }
        }
    }
    debug!("Store writer stopped");
}

fn execute(conn: &mut Connection, job: Job) -> Result<Box<dyn Any + Send>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match job(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!("Rollback failed after write error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn memory_writer() -> WriteHandle {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER NOT NULL)").unwrap();
        spawn_writer(conn).unwrap()
    }

    #[tokio::test]
    async fn test_exec_commits_on_success() {
        let writer = memory_writer();
        writer
            .exec(|tx| Ok(tx.execute("INSERT INTO t (v) VALUES (1)", [])?))
            .await
            .unwrap();

        let count: i64 = writer
            .exec(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_exec_rolls_back_on_error() {
        let writer = memory_writer();
        let result: Result<()> = writer
            .exec(|tx| {
                tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
                tx.execute("INSERT INTO t (v) VALUES (2)", [])?;
                Err(CacheError::Internal("abort".to_string()))
            })
            .await;
        assert!(result.is_err());

        let count: i64 = writer
            .exec(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0, "partial writes must not survive a failed job");
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let writer = memory_writer();
        writer
            .exec(|tx| Ok(tx.execute("INSERT INTO t (v) VALUES (7)", [])?))
            .await
            .unwrap();
        writer.shutdown().await.unwrap();

        let result = writer.exec(|_| Ok(())).await;
        assert!(matches!(result, Err(CacheError::WriterClosed)));
    }
}
