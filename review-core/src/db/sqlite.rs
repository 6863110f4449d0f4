use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{duplicate_path, schema, Result, ReviewStore, StoreError};
use crate::models::{NextFile, ReviewFile, ReviewSession, ReviewStatus};

const IN_MEMORY: &str = ":memory:";

/// SQLite-backed review store.
///
/// Progress survives process restarts. The connection is opened by
/// `initialize` and dropped by `close`; rusqlite calls run on
/// `tokio::task::spawn_blocking` so they never stall the runtime.
pub struct SqliteStore {
    path: PathBuf,
    pub(crate) conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// A private in-memory database; useful for tests.
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    fn is_in_memory(path: &Path) -> bool {
        path.as_os_str() == IN_MEMORY
    }

    fn open(path: &Path) -> Result<Connection> {
        if !Self::is_in_memory(path) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if !Self::is_in_memory(path) {
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&mut conn)?;
        Ok(conn)
    }

    /// Runs `f` against the open connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task(format!("{op}: connection lock poisoned")))?;
            let conn = guard.as_mut().ok_or(StoreError::NotInitialized)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("{op}: {e}")))?
    }
}

fn session_exists(conn: &Connection, pr_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM pr_status WHERE pr_number = ?1",
        [pr_id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn initialize(&self) -> Result<()> {
        let path = self.path.clone();
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("initialize: connection lock poisoned".into()))?;
            if guard.is_none() {
                *guard = Some(Self::open(&path)?);
                info!("Opened review database at {}", path.display());
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(format!("initialize: {e}")))?
    }

    async fn is_in_progress(&self, pr_id: &str) -> Result<bool> {
        let pr_id = pr_id.to_owned();
        self.with_conn("is_in_progress", move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pr_status WHERE pr_number = ?1 AND status = 'in_progress'",
                [&pr_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn start_review(&self, pr_id: &str, files: &[String]) -> Result<()> {
        let pr_id = pr_id.to_owned();
        let files = files.to_vec();
        self.with_conn("start_review", move |conn| {
            // The UNIQUE constraint would also reject this; checking first keeps
            // the error identical to the in-memory store's.
            if let Some(path) = duplicate_path(&files) {
                return Err(StoreError::DuplicateFile {
                    path: path.to_owned(),
                    pr_id,
                });
            }

            let now = Utc::now();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO pr_status (pr_number, status, current_index, total_files, created_at, updated_at)
                 VALUES (?1, 'in_progress', 0, ?2, ?3, ?3)
                 ON CONFLICT(pr_number) DO UPDATE SET
                     status = 'in_progress',
                     current_index = 0,
                     total_files = excluded.total_files,
                     updated_at = excluded.updated_at",
                params![&pr_id, files.len() as i64, now],
            )?;
            tx.execute("DELETE FROM pr_files WHERE pr_number = ?1", [&pr_id])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO pr_files (pr_number, file_path, reviewed, review_order)
                     VALUES (?1, ?2, 0, ?3)",
                )?;
                for (order, path) in files.iter().enumerate() {
                    insert.execute(params![&pr_id, path, order as i64])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_next_file(&self, pr_id: &str) -> Result<Option<NextFile>> {
        let pr_id = pr_id.to_owned();
        self.with_conn("get_next_file", move |conn| {
            let next = conn
                .query_row(
                    "SELECT f.file_path, s.current_index, s.total_files
                     FROM pr_status s
                     JOIN pr_files f
                       ON f.pr_number = s.pr_number AND f.review_order = s.current_index
                     WHERE s.pr_number = ?1 AND s.status = 'in_progress' AND f.reviewed = 0",
                    [&pr_id],
                    |row| {
                        let current_index: u32 = row.get(1)?;
                        Ok(NextFile {
                            file_path: row.get(0)?,
                            current: current_index + 1,
                            total: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(next)
        })
        .await
    }

    async fn mark_reviewed(&self, pr_id: &str, file_path: &str) -> Result<()> {
        let pr_id = pr_id.to_owned();
        let file_path = file_path.to_owned();
        self.with_conn("mark_reviewed", move |conn| {
            let tx = conn.transaction()?;
            if !session_exists(&tx, &pr_id)? {
                return Err(StoreError::SessionNotFound(pr_id));
            }

            let flagged = tx.execute(
                "UPDATE pr_files SET reviewed = 1
                 WHERE pr_number = ?1 AND file_path = ?2 AND reviewed = 0
                   AND review_order = (
                       SELECT current_index FROM pr_status
                       WHERE pr_number = ?1 AND status = 'in_progress'
                   )",
                params![&pr_id, &file_path],
            )?;
            if flagged != 1 {
                let known: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM pr_files WHERE pr_number = ?1 AND file_path = ?2)",
                    params![&pr_id, &file_path],
                    |row| row.get(0),
                )?;
                return Err(if known {
                    StoreError::NotAtCursor {
                        pr_id,
                        path: file_path,
                    }
                } else {
                    StoreError::FileNotFound {
                        pr_id,
                        path: file_path,
                    }
                });
            }

            tx.execute(
                "UPDATE pr_status
                 SET current_index = MIN(current_index + 1, total_files),
                     updated_at = ?2
                 WHERE pr_number = ?1",
                params![&pr_id, Utc::now()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn complete_review(&self, pr_id: &str) -> Result<()> {
        let pr_id = pr_id.to_owned();
        self.with_conn("complete_review", move |conn| {
            conn.execute(
                "UPDATE pr_status SET status = 'completed', updated_at = ?2 WHERE pr_number = ?1",
                params![&pr_id, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn reset_review(&self, pr_id: &str) -> Result<()> {
        let pr_id = pr_id.to_owned();
        self.with_conn("reset_review", move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM pr_files WHERE pr_number = ?1", [&pr_id])?;
            tx.execute("DELETE FROM pr_status WHERE pr_number = ?1", [&pr_id])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, pr_id: &str) -> Result<Option<ReviewSession>> {
        let pr_id = pr_id.to_owned();
        self.with_conn("get_session", move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, current_index, total_files, created_at, updated_at
                     FROM pr_status WHERE pr_number = ?1",
                    [&pr_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, u32>(1)?,
                            row.get::<_, u32>(2)?,
                            row.get::<_, DateTime<Utc>>(3)?,
                            row.get::<_, DateTime<Utc>>(4)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(status, current_index, total_files, created_at, updated_at)| {
                let status =
                    ReviewStatus::from_str(&status).ok_or(StoreError::InvalidStatus(status))?;
                Ok(ReviewSession {
                    pr_id: pr_id.clone(),
                    status,
                    current_index,
                    total_files,
                    created_at,
                    updated_at,
                })
            })
            .transpose()
        })
        .await
    }

    async fn list_files(&self, pr_id: &str) -> Result<Vec<ReviewFile>> {
        let pr_id = pr_id.to_owned();
        self.with_conn("list_files", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT file_path, reviewed, review_order
                 FROM pr_files WHERE pr_number = ?1 ORDER BY review_order",
            )?;
            let files = stmt
                .query_map([&pr_id], |row| {
                    Ok(ReviewFile {
                        file_path: row.get(0)?,
                        reviewed: row.get(1)?,
                        review_order: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<_> {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("close: connection lock poisoned".into()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| e)?;
                debug!("Closed review database");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(format!("close: {e}")))?
    }
}
