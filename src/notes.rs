//! Note persistence.
//!
//! Notes are free-text entries with a category. The workflow never touches
//! them; they are exposed over HTTP next to the chat endpoint.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Category assigned when the caller does not pick one.
pub const DEFAULT_CATEGORY: &str = "general";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notes_created_at ON notes(created_at);
";

/// Note storage failures.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite rejected a statement.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored row could not be decoded.
    #[error("Invalid stored value: {0}")]
    Corrupt(String),
    /// A thread panicked while holding the connection.
    #[error("Database lock poisoned")]
    Poisoned,
}

/// Result alias for note storage.
pub type DbResult<T> = Result<T, DbError>;

/// A stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Assigned on creation.
    pub id: Uuid,
    /// Free text.
    pub content: String,
    /// Caller-chosen grouping, `general` by default.
    pub category: String,
    /// When the note was stored.
    pub created_at: DateTime<Utc>,
    /// Last modification; equal to `created_at` for new notes.
    pub updated_at: DateTime<Utc>,
}

/// Fields the caller supplies when creating a note.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    /// Free text.
    pub content: String,
    /// Defaults to [`DEFAULT_CATEGORY`].
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl NewNote {
    /// A note in the default category.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            category: default_category(),
        }
    }

    /// Put the note in `category`.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Storage backend for notes.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Persist a new note and return it with its id and timestamps.
    async fn create(&self, note: NewNote) -> DbResult<Note>;

    /// Notes in creation order, skipping `skip` and returning at most `limit`.
    async fn list(&self, skip: usize, limit: usize) -> DbResult<Vec<Note>>;
}

/// SQLite-backed [`NoteStore`].
#[derive(Clone)]
pub struct SqliteNoteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNoteStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }
}

// Fixed-width so that text ordering matches time ordering.
fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("timestamp '{raw}': {e}")))
}

// SQLite takes signed counts; a negative OFFSET would mean zero.
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_note(
    (id, content, category, created_at, updated_at): (String, String, String, String, String),
) -> DbResult<Note> {
    Ok(Note {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Corrupt(format!("id '{id}': {e}")))?,
        content,
        category,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

#[async_trait]
impl NoteStore for SqliteNoteStore {
    async fn create(&self, note: NewNote) -> DbResult<Note> {
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4(),
            content: note.content,
            category: note.category,
            created_at: now,
            updated_at: now,
        };

        self.conn()?.execute(
            "INSERT INTO notes (id, content, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                note.id.to_string(),
                note.content,
                note.category,
                format_time(&note.created_at),
                format_time(&note.updated_at),
            ],
        )?;

        tracing::debug!(id = %note.id, category = %note.category, "Note created");
        Ok(note)
    }

    async fn list(&self, skip: usize, limit: usize) -> DbResult<Vec<Note>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, category, created_at, updated_at FROM notes
             ORDER BY created_at ASC, rowid ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![sql_count(limit), sql_count(skip)], note_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(into_note).collect()
    }
}
