//! SQLite persistence for admins, users and the response log

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS admin (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    number TEXT UNIQUE,
    name TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    number TEXT UNIQUE,
    name TEXT,
    status TEXT DEFAULT 'active',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS response (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_number TEXT,
    response_type TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Registration state of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }

    /// Anything other than `active` counts as inactive
    pub fn from_db(value: &str) -> Self {
        if value == "active" {
            UserStatus::Active
        } else {
            UserStatus::Inactive
        }
    }

    /// Label shown to chat users
    pub fn label(&self) -> &'static str {
        match self {
            UserStatus::Active => "Active",
            UserStatus::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Admin {
    pub number: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub number: String,
    pub name: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// One logged inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub user_number: String,
    pub response_type: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations used by the dispatcher and the scheduler.
///
/// Every call is an independent statement; callers handle failures themselves.
pub trait Store: Send + Sync {
    fn is_admin(&self, number: &str) -> Result<bool>;
    fn add_admin(&self, number: &str, name: &str, at: DateTime<Utc>) -> Result<()>;

    /// Fails with [`Error::AlreadyRegistered`] when the number exists
    fn insert_user(&self, number: &str, name: &str, at: DateTime<Utc>) -> Result<()>;
    /// Marks a user inactive, returning the number of rows touched (0 is fine)
    fn deactivate_user(&self, number: &str) -> Result<usize>;
    fn find_user(&self, number: &str) -> Result<Option<User>>;
    /// Active users in insertion order
    fn active_users(&self) -> Result<Vec<User>>;
    fn user_count(&self) -> Result<usize>;

    fn log_response(&self, number: &str, response_type: &str, at: DateTime<Utc>) -> Result<()>;
    fn last_response(&self, number: &str) -> Result<Option<Response>>;
    /// Deletes rows created strictly before `cutoff`
    fn delete_responses_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    fn response_count(&self) -> Result<usize>;
}

/// SQLite-backed store with a single shared connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::from_connection(conn)?;

        info!("Database opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(f(&conn)?)
    }

    pub fn admins(&self) -> Result<Vec<Admin>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT number, name, created_at FROM admin ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Admin {
                    number: row.get(0)?,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    created_at: row.get(2)?,
                })
            })?;
            rows.collect()
        })
    }
}

/// Timestamps are stored in SQLite's own `CURRENT_TIMESTAMP` layout (UTC, whole seconds)
/// so hand-seeded rows and bot-written rows compare correctly as text.
pub fn sql_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let status: Option<String> = row.get(2)?;
    Ok(User {
        number: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        status: UserStatus::from_db(status.as_deref().unwrap_or("")),
        created_at: row.get(3)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn is_admin(&self, number: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1 FROM admin WHERE number = ?1", [number], |_| Ok(()))
                .optional()
                .map(|row| row.is_some())
        })
    }

    fn add_admin(&self, number: &str, name: &str, at: DateTime<Utc>) -> Result<()> {
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admin (number, name, created_at) VALUES (?1, ?2, ?3)",
                (number, name, sql_timestamp(at)),
            )
        });
        match result {
            Err(Error::Sqlite(ref e)) if is_constraint_violation(e) => {
                Err(Error::AlreadyRegistered(number.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    fn insert_user(&self, number: &str, name: &str, at: DateTime<Utc>) -> Result<()> {
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user (number, name, created_at) VALUES (?1, ?2, ?3)",
                (number, name, sql_timestamp(at)),
            )
        });
        match result {
            Err(Error::Sqlite(ref e)) if is_constraint_violation(e) => {
                Err(Error::AlreadyRegistered(number.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    fn deactivate_user(&self, number: &str) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE user SET status = ?1 WHERE number = ?2",
                (UserStatus::Inactive.as_str(), number),
            )
        })
    }

    fn find_user(&self, number: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT number, name, status, created_at FROM user WHERE number = ?1",
                [number],
                user_from_row,
            )
            .optional()
        })
    }

    fn active_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT number, name, status, created_at FROM user WHERE status = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([UserStatus::Active.as_str()], user_from_row)?;
            rows.collect()
        })
    }

    fn user_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM user", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        })
    }

    fn log_response(&self, number: &str, response_type: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO response (user_number, response_type, created_at) VALUES (?1, ?2, ?3)",
                (number, response_type, sql_timestamp(at)),
            )
        })?;
        Ok(())
    }

    fn last_response(&self, number: &str) -> Result<Option<Response>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_number, response_type, created_at FROM response
                 WHERE user_number = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                [number],
                |row| {
                    Ok(Response {
                        user_number: row.get(0)?,
                        response_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    fn delete_responses_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM response WHERE created_at < ?1",
                [sql_timestamp(cutoff)],
            )
        })
    }

    fn response_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM response", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        })
    }
}
