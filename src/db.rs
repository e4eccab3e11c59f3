//! SQLite persistence for users and ratings.
//!
//! All access goes through a single worker thread owning the connection; async
//! callers submit closures and await the result over a oneshot channel. The
//! single writer serializes each rating's find-then-upsert, and the
//! `UNIQUE (user_id, hall, meal, date)` index enforces one rating per user per
//! scope even if a second writer ever appears.

use std::{
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tokio::sync::oneshot;
use tracing::{error, info};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE ratings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL REFERENCES users(id),
    hall       TEXT NOT NULL,
    meal       TEXT NOT NULL,
    rating     INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    date       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, hall, meal, date)
);

CREATE INDEX idx_ratings_scope ON ratings (hall, meal, date);
";

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Opens (or creates) the database at `path`. `":memory:"` is honored for
    /// tests.
    pub fn new(path: &str) -> Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create database directory {}", parent.display())
                    })?;
                }
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = path.to_string();

        let worker = thread::Builder::new()
            .name("polar-plate-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {path}");

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn insert_user(
        &self,
        username: String,
        email: String,
        password_hash: String,
    ) -> Result<i64> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, email, password_hash, Utc::now().to_rfc3339()],
            )
            .context("failed to insert user")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn user_exists(&self, username: String, email: String) -> Result<bool> {
        self.execute(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE username = ?1 OR email = ?2",
                    params![username, email],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    pub async fn find_user_by_username(&self, username: String) -> Result<Option<User>> {
        self.find_user_where("username", username).await
    }

    pub async fn find_user_by_email(&self, email: String) -> Result<Option<User>> {
        self.find_user_where("email", email).await
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT id, username, email, password_hash FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()
            .context("failed to look up user")
        })
        .await
    }

    async fn find_user_where(&self, column: &'static str, value: String) -> Result<Option<User>> {
        self.execute(move |conn| {
            let sql =
                format!("SELECT id, username, email, password_hash FROM users WHERE {column} = ?1");
            conn.query_row(&sql, params![value], row_to_user)
                .optional()
                .context("failed to look up user")
        })
        .await
    }

    /// Writes the caller's rating for a (hall, meal, date) scope, overwriting
    /// any previous value. Returns `true` when an existing row was updated.
    pub async fn upsert_rating(
        &self,
        user_id: i64,
        hall: String,
        meal: String,
        rating: u8,
        date: String,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM ratings
                     WHERE user_id = ?1 AND hall = ?2 AND meal = ?3 AND date = ?4",
                    params![user_id, hall, meal, date],
                    |row| row.get(0),
                )
                .optional()?;

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO ratings (user_id, hall, meal, rating, date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (user_id, hall, meal, date)
                 DO UPDATE SET rating = excluded.rating, updated_at = excluded.updated_at",
                params![user_id, hall, meal, rating, date, now],
            )
            .context("failed to write rating")?;

            Ok(existing.is_some())
        })
        .await
    }

    pub async fn user_rating(
        &self,
        user_id: i64,
        hall: String,
        meal: String,
        date: String,
    ) -> Result<Option<u8>> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT rating FROM ratings
                 WHERE user_id = ?1 AND hall = ?2 AND meal = ?3 AND date = ?4",
                params![user_id, hall, meal, date],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up user rating")
        })
        .await
    }

    /// Raw average and count over every rating in the scope. The average is
    /// `None` when the scope has no ratings.
    pub async fn scope_stats(
        &self,
        hall: String,
        meal: String,
        date: String,
    ) -> Result<(Option<f64>, u64)> {
        self.execute(move |conn| {
            conn.query_row(
                "SELECT AVG(rating), COUNT(*) FROM ratings
                 WHERE hall = ?1 AND meal = ?2 AND date = ?3",
                params![hall, meal, date],
                |row| Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, u64>(1)?)),
            )
            .context("failed to aggregate ratings")
        })
        .await
    }

    /// Every rating value in the scope, highest first. Values only: which
    /// user cast which rating is deliberately not exposed.
    pub async fn scope_ratings(
        &self,
        hall: String,
        meal: String,
        date: String,
    ) -> Result<Vec<u8>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT rating FROM ratings
                 WHERE hall = ?1 AND meal = ?2 AND date = ?3
                 ORDER BY rating DESC",
            )?;

            let mut rows = stmt.query(params![hall, meal, date])?;
            let mut ratings = Vec::new();
            while let Some(row) = rows.next()? {
                ratings.push(row.get(0)?);
            }

            Ok(ratings)
        })
        .await
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
    })
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        anyhow::bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => tx
            .execute_batch(SCHEMA_V1)
            .context("failed to apply initial schema"),
        other => anyhow::bail!("no migration registered for version {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::new(":memory:").expect("in-memory database")
    }

    async fn seed_user(db: &Database, name: &str) -> i64 {
        db.insert_user(
            name.to_string(),
            format!("{name}@example.edu"),
            "hash".to_string(),
        )
        .await
        .expect("insert user")
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_scope() {
        let db = memory_db().await;
        let user = seed_user(&db, "alice").await;

        let updated = db
            .upsert_rating(user, "Thorne".into(), "Lunch".into(), 3, "2025-08-20".into())
            .await
            .unwrap();
        assert!(!updated);

        let updated = db
            .upsert_rating(user, "Thorne".into(), "Lunch".into(), 5, "2025-08-20".into())
            .await
            .unwrap();
        assert!(updated);

        let ratings = db
            .scope_ratings("Thorne".into(), "Lunch".into(), "2025-08-20".into())
            .await
            .unwrap();
        assert_eq!(ratings, vec![5]);

        let stored = db
            .user_rating(user, "Thorne".into(), "Lunch".into(), "2025-08-20".into())
            .await
            .unwrap();
        assert_eq!(stored, Some(5));
    }

    #[tokio::test]
    async fn stats_are_empty_for_unrated_scope() {
        let db = memory_db().await;

        let (avg, count) = db
            .scope_stats("Moulton".into(), "Dinner".into(), "2025-08-20".into())
            .await
            .unwrap();
        assert_eq!(avg, None);
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let db = memory_db().await;
        seed_user(&db, "alice").await;

        let duplicate = db
            .insert_user(
                "alice".to_string(),
                "other@example.edu".to_string(),
                "hash".to_string(),
            )
            .await;
        assert!(duplicate.is_err());

        assert!(db
            .user_exists("alice".into(), "nobody@example.edu".into())
            .await
            .unwrap());
    }
}
