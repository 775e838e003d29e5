// db.rs — fire-and-forget SQLite ratings worker (module N).
// Converted from: original_source/databases/sqlite.cpp's single
// `InUse`-latched connection (`std::atomic_bool m_InUse`) draining a work
// queue on its own thread, re-targeted at a `crossbeam` channel feeding a
// dedicated worker instead of the original's polling dispatcher. `rusqlite`
// (bundled) is the crate, same family `efir369999-junomontanaagibot/rust-core`
// and `Dicklesworthstone-frankenterm` reach for when they need embedded SQL.

use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use rusqlite::Connection;

use teeserve_common::common::{com_printf, ErrCode};

#[derive(Debug, Clone)]
pub enum DbJob {
    AddPoints { name: String, delta: i32 },
    Shutdown,
}

/// Handle to the background worker; cloning shares the same queue.
pub struct DbWorker {
    tx: Sender<DbJob>,
    handle: Option<JoinHandle<()>>,
}

impl DbWorker {
    /// Opens (creating if absent) the sqlite file at `path` under table
    /// `<prefix>_ratings` and spawns the worker thread. `InUse` in the
    /// original is modeled here simply by the fact that only the worker
    /// thread ever touches the `Connection` — no other thread can see it,
    /// so there is nothing left to latch.
    pub fn spawn(path: &str, table_prefix: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let table = format!("{table_prefix}_ratings");
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (Name TEXT PRIMARY KEY, Rating INTEGER NOT NULL DEFAULT 1000)"
            ),
            [],
        )?;

        let (tx, rx) = channel::unbounded::<DbJob>();
        let handle = std::thread::spawn(move || {
            for job in rx {
                match job {
                    DbJob::AddPoints { name, delta } => {
                        let sql = format!(
                            "INSERT INTO {table} (Name, Rating) VALUES (?1, 1000 + ?2) \
                             ON CONFLICT(Name) DO UPDATE SET Rating = Rating + ?2"
                        );
                        if let Err(e) = conn.execute(&sql, rusqlite::params![name, delta]) {
                            com_printf(&format!("db: AddPoints({name}, {delta}) failed: {e}\n"));
                        }
                    }
                    DbJob::Shutdown => break,
                }
            }
        });

        Ok(Self { tx, handle: Some(handle) })
    }

    /// Enqueues a rating delta; never blocks on the database itself.
    pub fn add_points(&self, name: &str, delta: i32) {
        if self.tx.send(DbJob::AddPoints { name: name.to_string(), delta }).is_err() {
            teeserve_common::common::com_error(ErrCode::ErrDrop, "db: worker thread is gone, dropping AddPoints");
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.tx.send(DbJob::Shutdown);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for DbWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(DbJob::Shutdown);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_points_creates_and_updates_rating() {
        let dir = std::env::temp_dir().join(format!("teeserve_db_test_{}.sqlite3", std::process::id()));
        let _ = std::fs::remove_file(&dir);
        let path = dir.to_str().unwrap().to_string();

        {
            let worker = DbWorker::spawn(&path, "teeserve").unwrap();
            worker.add_points("alice", 50);
            worker.add_points("alice", 25);
            worker.shutdown();
        }

        let conn = Connection::open(&path).unwrap();
        let rating: i32 = conn
            .query_row("SELECT Rating FROM teeserve_ratings WHERE Name = ?1", rusqlite::params!["alice"], |row| row.get(0))
            .unwrap();
        assert_eq!(rating, 1075);

        let _ = std::fs::remove_file(&path);
    }
}
