//! Storage operations for notes and sources
//!
//! Schema (single SQLite file):
//! ```text
//! sources(id, title UNIQUE, origin, total_notes, cloze_enabled)
//! notes(id, source_id -> sources.id, content, location, question, answer,
//!       easiness_factor, next_due_date, last_reviewed, interval, review_count)
//! ```
//! Timestamps are stored as epoch milliseconds.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use thiserror::Error;

use super::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(SourceId),

    #[error("Note not found: {0}")]
    NoteNotFound(NoteId),

    #[error("Store connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound(_) | Self::NoteNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistent note/source store used by the review core.
///
/// Calls are synchronous request/response; implementations must be safe to
/// share between concurrently handled actions.
pub trait ReviewStore: Send + Sync {
    fn get_source(&self, id: SourceId) -> Result<Source>;
    fn find_source_by_title(&self, title: &str) -> Result<Option<Source>>;
    fn list_sources(&self) -> Result<Vec<Source>>;
    fn create_source(&self, source: &NewSource) -> Result<Source>;
    fn set_cloze_enabled(&self, id: SourceId, enabled: bool) -> Result<Source>;

    fn get_note(&self, id: NoteId) -> Result<Note>;
    /// Inserts a note and bumps the owning source's `total_notes`
    fn create_note(&self, note: &NewNote) -> Result<Note>;
    fn update_note(&self, id: NoteId, update: &NoteUpdate) -> Result<Note>;
    /// Whether a note with `location` exists under the source titled `title`
    fn note_exists(&self, title: &str, location: &str) -> Result<bool>;

    /// Notes of one source that were never reviewed or are due at `due_before`,
    /// ascending by id
    fn notes_for_source(&self, source_id: SourceId, due_before: DateTime<Utc>)
        -> Result<Vec<Note>>;
    /// Reviewed notes of every source due at `due_before`, ascending by id
    fn pending_notes(&self, due_before: DateTime<Utc>) -> Result<Vec<Note>>;

    /// Clears the schedule of every note of the source, returning rows touched
    fn reset_source(&self, id: SourceId) -> Result<usize>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    origin TEXT NOT NULL,
    total_notes INTEGER NOT NULL DEFAULT 0,
    cloze_enabled INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    content TEXT NOT NULL,
    location TEXT NOT NULL,
    question TEXT,
    answer TEXT,
    easiness_factor REAL,
    next_due_date INTEGER,
    last_reviewed INTEGER,
    interval INTEGER NOT NULL DEFAULT 0,
    review_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notes_next_due_date ON notes(next_due_date);
CREATE UNIQUE INDEX IF NOT EXISTS idx_notes_source_location ON notes(source_id, location);
"#;

const NOTE_COLUMNS: &str = "id, source_id, content, location, question, answer, \
    easiness_factor, next_due_date, last_reviewed, interval, review_count";

const SOURCE_COLUMNS: &str = "id, title, origin, total_notes, cloze_enabled";

/// SQLite-backed review store
pub struct SqliteReviewStore {
    conn: Mutex<Connection>,
}

impl SqliteReviewStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        log::info!("Opened review store at {:?}", path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_notes(&self, sql: &str, bind: Vec<Value>) -> Result<Vec<Note>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let notes = stmt
            .query_map(params_from_iter(bind), parse_note_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notes)
    }
}

impl ReviewStore for SqliteReviewStore {
    fn get_source(&self, id: SourceId) -> Result<Source> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
            params![id],
            parse_source_row,
        )
        .optional()?
        .ok_or(StoreError::SourceNotFound(id))
    }

    fn find_source_by_title(&self, title: &str) -> Result<Option<Source>> {
        let conn = self.conn()?;
        let source = conn
            .query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE title = ?1"),
                params![title],
                parse_source_row,
            )
            .optional()?;
        Ok(source)
    }

    fn list_sources(&self) -> Result<Vec<Source>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id ASC"
        ))?;
        let sources = stmt
            .query_map([], parse_source_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    fn create_source(&self, source: &NewSource) -> Result<Source> {
        let id = {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO sources (title, origin, total_notes) VALUES (?1, ?2, 0)",
                params![source.title, source.origin],
            )?;
            conn.last_insert_rowid()
        };
        log::info!("Created source {} ({})", id, source.title);
        self.get_source(id)
    }

    fn set_cloze_enabled(&self, id: SourceId, enabled: bool) -> Result<Source> {
        let changed = self.conn()?.execute(
            "UPDATE sources SET cloze_enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        if changed == 0 {
            return Err(StoreError::SourceNotFound(id));
        }
        self.get_source(id)
    }

    fn get_note(&self, id: NoteId) -> Result<Note> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
            params![id],
            parse_note_row,
        )
        .optional()?
        .ok_or(StoreError::NoteNotFound(id))
    }

    fn create_note(&self, note: &NewNote) -> Result<Note> {
        let id = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let bumped = tx.execute(
                "UPDATE sources SET total_notes = total_notes + 1 WHERE id = ?1",
                params![note.source_id],
            )?;
            if bumped == 0 {
                return Err(StoreError::SourceNotFound(note.source_id));
            }
            tx.execute(
                "INSERT INTO notes (source_id, content, location) VALUES (?1, ?2, ?3)",
                params![note.source_id, note.content, note.location],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            id
        };
        self.get_note(id)
    }

    fn update_note(&self, id: NoteId, update: &NoteUpdate) -> Result<Note> {
        if update.is_empty() {
            return self.get_note(id);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut bind: Vec<Value> = Vec::new();

        if let Some(question) = &update.question {
            sets.push("question = ?");
            bind.push(Value::Text(question.clone()));
        }
        if let Some(answer) = &update.answer {
            sets.push("answer = ?");
            bind.push(Value::Text(answer.clone()));
        }
        if let Some(ef) = update.easiness_factor {
            sets.push("easiness_factor = ?");
            bind.push(ef.map_or(Value::Null, Value::Real));
        }
        if let Some(due) = update.next_due_date {
            sets.push("next_due_date = ?");
            bind.push(timestamp_value(due));
        }
        if let Some(reviewed) = update.last_reviewed {
            sets.push("last_reviewed = ?");
            bind.push(timestamp_value(reviewed));
        }
        if let Some(interval) = update.interval {
            sets.push("interval = ?");
            bind.push(Value::Integer(interval));
        }
        if let Some(count) = update.review_count {
            sets.push("review_count = ?");
            bind.push(Value::Integer(count));
        }

        bind.push(Value::Integer(id));
        let sql = format!("UPDATE notes SET {} WHERE id = ?", sets.join(", "));

        let changed = self.conn()?.execute(&sql, params_from_iter(bind))?;
        if changed == 0 {
            return Err(StoreError::NoteNotFound(id));
        }
        self.get_note(id)
    }

    fn note_exists(&self, title: &str, location: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM notes
                JOIN sources ON notes.source_id = sources.id
                WHERE notes.location = ?1 AND sources.title = ?2
            )",
            params![location, title],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn notes_for_source(
        &self,
        source_id: SourceId,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE source_id = ?1
                   AND (next_due_date IS NULL OR next_due_date <= ?2)
                 ORDER BY id ASC"
            ),
            vec![
                Value::Integer(source_id),
                Value::Integer(due_before.timestamp_millis()),
            ],
        )
    }

    fn pending_notes(&self, due_before: DateTime<Utc>) -> Result<Vec<Note>> {
        self.query_notes(
            &format!(
                "SELECT {NOTE_COLUMNS} FROM notes
                 WHERE next_due_date IS NOT NULL AND next_due_date <= ?1
                 ORDER BY id ASC"
            ),
            vec![Value::Integer(due_before.timestamp_millis())],
        )
    }

    fn reset_source(&self, id: SourceId) -> Result<usize> {
        let changed = self.conn()?.execute(
            "UPDATE notes
             SET next_due_date = NULL,
                 last_reviewed = NULL,
                 interval = 0,
                 easiness_factor = NULL,
                 review_count = 0
             WHERE source_id = ?1",
            params![id],
        )?;
        Ok(changed)
    }
}

fn timestamp_value(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |ts| Value::Integer(ts.timestamp_millis()))
}

fn from_millis(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(DateTime::from_timestamp_millis)
}

fn parse_source_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get("id")?,
        title: row.get("title")?,
        origin: row.get("origin")?,
        total_notes: row.get("total_notes")?,
        cloze_enabled: row.get("cloze_enabled")?,
    })
}

fn parse_note_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        content: row.get("content")?,
        location: row.get("location")?,
        question: row.get("question")?,
        answer: row.get("answer")?,
        easiness_factor: row.get("easiness_factor")?,
        next_due_date: from_millis(row.get("next_due_date")?),
        last_reviewed: from_millis(row.get("last_reviewed")?),
        interval: row.get("interval")?,
        review_count: row.get("review_count")?,
    })
}
