//! Durable progress store: a `rusqlite`-backed record of completed
//! path_ids, written from a dedicated background thread so worker threads
//! never block on SQLite.

use crate::config::{STORE_COMMIT_FLUSH_DELAY_MS, STORE_COMMIT_ROW_THRESHOLD};
use crate::error::{Result, UndrError};
use crossbeam_channel::{Receiver, Sender};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS complete (
    path_id TEXT PRIMARY KEY
) WITHOUT ROWID;
"#;

fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| UndrError::Config(format!("open store: {e}")))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(|e| UndrError::Config(format!("enable WAL: {e}")))?;
    conn.execute_batch(SCHEMA)
        .map_err(|e| UndrError::Config(format!("create schema: {e}")))?;
    Ok(conn)
}

enum StoreMessage {
    Insert(String),
    /// A synchronous commit request: the sender blocks on the paired barrier
    /// until the writer thread has flushed every prior insert.
    Commit(Arc<Barrier>),
    Reset,
}

/// Handle cloned into every worker: queues inserts for the background writer.
#[derive(Clone)]
pub struct Store {
    tx: Sender<StoreMessage>,
}

impl Store {
    /// Spawn the background writer thread against `path` and return a handle
    /// plus the thread's join handle.
    pub fn open(path: &Path) -> Result<(Self, std::thread::JoinHandle<()>)> {
        let conn = open_db(path)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::spawn(move || writer_loop(conn, rx));
        Ok((Store { tx }, handle))
    }

    pub fn mark_complete(&self, path_id: &str) {
        let _ = self.tx.send(StoreMessage::Insert(path_id.to_string()));
    }

    /// Block until every insert sent so far has been committed.
    pub fn flush(&self) {
        let barrier = Arc::new(Barrier::new(2));
        if self.tx.send(StoreMessage::Commit(barrier.clone())).is_ok() {
            barrier.wait();
        }
    }

    /// Drop every completion record (used by `install --force`).
    pub fn reset(&self) {
        let _ = self.tx.send(StoreMessage::Reset);
    }
}

fn writer_loop(mut conn: Connection, rx: Receiver<StoreMessage>) {
    let mut pending = 0usize;
    loop {
        let message = match rx.recv_timeout(Duration::from_millis(STORE_COMMIT_FLUSH_DELAY_MS)) {
            Ok(m) => m,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if pending > 0 {
                    pending = 0;
                }
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        };
        match message {
            StoreMessage::Insert(path_id) => {
                let _ = conn.execute(
                    "INSERT OR IGNORE INTO complete (path_id) VALUES (?1)",
                    [&path_id],
                );
                pending += 1;
                if pending >= STORE_COMMIT_ROW_THRESHOLD {
                    pending = 0;
                }
            }
            StoreMessage::Commit(barrier) => {
                pending = 0;
                barrier.wait();
            }
            StoreMessage::Reset => {
                let _ = conn.execute("DELETE FROM complete", []);
                pending = 0;
            }
        }
    }
}

/// A read-only snapshot connection, used by [`crate::selector::MapSelector`]
/// from worker threads to test membership without routing through the
/// writer's channel.
pub struct ReadOnlyStore {
    conn: std::sync::Mutex<Connection>,
}

impl ReadOnlyStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(ReadOnlyStore {
            conn: std::sync::Mutex::new(open_db(path)?),
        })
    }

    pub fn contains(&self, path_id: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM complete WHERE path_id = ?1",
            [path_id],
            |_| Ok(()),
        )
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("undr-store-{name}-{}.sqlite3", std::process::id()))
    }

    #[test]
    fn mark_complete_then_flush_is_visible_to_readers() {
        let path = temp_path("flush");
        let (store, _handle) = Store::open(&path).unwrap();
        store.mark_complete("a/b/c.es");
        store.flush();

        let reader = ReadOnlyStore::open(&path).unwrap();
        assert!(reader.contains("a/b/c.es"));
        assert!(!reader.contains("a/b/missing.es"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reset_clears_all_rows() {
        let path = temp_path("reset");
        let (store, _handle) = Store::open(&path).unwrap();
        store.mark_complete("a/b.es");
        store.flush();
        store.reset();
        store.flush();

        let reader = ReadOnlyStore::open(&path).unwrap();
        assert!(!reader.contains("a/b.es"));
        std::fs::remove_file(&path).ok();
    }
}
