//! SQLite storage for WordSpiral content and quiz state

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Vocabulary word belonging to one instructional week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocab {
    pub id: i64,
    pub week_id: i64,
    pub word: String,
    pub definition: String,
    pub example_sentence: String,
}

/// Affix (prefix, suffix or root) taught in one instructional week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affix {
    pub id: i64,
    pub week_id: i64,
    pub affix: String,
    pub kind: String,
    pub meaning: String,
}

/// Instructional week owned by a teacher.
#[derive(Debug, Clone)]
pub struct Week {
    pub id: i64,
    pub teacher_uid: String,
    pub title: String,
}

/// Open the database at `db_path` and ensure the schema exists.
pub fn init_database(db_path: &str) -> CoreResult<Connection> {
    let conn = Connection::open(db_path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Create all tables if they do not exist yet.
pub fn create_schema(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(
        // The bundled SQLite in libsqlite3-sys is compiled with
        // SQLITE_DEFAULT_FOREIGN_KEYS=1, which flips foreign-key enforcement
        // ON. This crate was written against standard SQLite semantics (FK
        // enforcement OFF by default) and never opts in, so restore that
        // default explicitly here.
        "PRAGMA foreign_keys = OFF;

        CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            display_name TEXT NOT NULL,
            email TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_uid TEXT NOT NULL REFERENCES users(uid),
            student_uid TEXT,
            student_email TEXT NOT NULL,
            display_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS weeks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_uid TEXT NOT NULL REFERENCES users(uid),
            title TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS vocab (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            week_id INTEGER NOT NULL REFERENCES weeks(id),
            word TEXT NOT NULL,
            definition TEXT NOT NULL,
            example_sentence TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS affixes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            week_id INTEGER NOT NULL REFERENCES weeks(id),
            affix TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'prefix',
            meaning TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS word_mastery (
            student_uid TEXT NOT NULL,
            word_id INTEGER NOT NULL REFERENCES vocab(id),
            status TEXT NOT NULL,
            correct_streak INTEGER NOT NULL,
            total_attempts INTEGER NOT NULL,
            correct_attempts INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            next_due_at INTEGER NOT NULL,
            PRIMARY KEY (student_uid, word_id)
        );

        CREATE TABLE IF NOT EXISTS quizzes_public (
            id TEXT PRIMARY KEY,
            student_uid TEXT NOT NULL,
            teacher_uid TEXT NOT NULL,
            week_id INTEGER NOT NULL REFERENCES weeks(id),
            mode TEXT NOT NULL,
            assigned_at INTEGER NOT NULL,
            due_at INTEGER NOT NULL,
            completed_at INTEGER,
            question_count INTEGER NOT NULL,
            questions TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quizzes_private (
            quiz_id TEXT PRIMARY KEY REFERENCES quizzes_public(id),
            answer_key TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quiz_attempts (
            id TEXT PRIMARY KEY,
            quiz_id TEXT NOT NULL REFERENCES quizzes_public(id),
            student_uid TEXT NOT NULL,
            submitted_at INTEGER NOT NULL,
            score_percent INTEGER NOT NULL,
            correct_count INTEGER NOT NULL,
            total_questions INTEGER NOT NULL,
            responses TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mastery_due
            ON word_mastery (student_uid, next_due_at);",
    )?;
    Ok(())
}

/// Create a week owned by `teacher_uid` and return its id.
pub fn create_week(conn: &Connection, teacher_uid: &str, title: &str) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO weeks (teacher_uid, title) VALUES (?1, ?2)",
        params![teacher_uid, title],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get single week by ID
pub fn week_by_id(conn: &Connection, week_id: i64) -> CoreResult<Option<Week>> {
    let mut stmt = conn.prepare("SELECT id, teacher_uid, title FROM weeks WHERE id = ?1")?;
    let result = stmt.query_row(params![week_id], |row| {
        Ok(Week {
            id: row.get(0)?,
            teacher_uid: row.get(1)?,
            title: row.get(2)?,
        })
    });

    match result {
        Ok(week) => Ok(Some(week)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Add a vocabulary word to a week and return its id.
pub fn add_vocab(
    conn: &Connection,
    week_id: i64,
    word: &str,
    definition: &str,
    example_sentence: &str,
) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO vocab (week_id, word, definition, example_sentence) VALUES (?1, ?2, ?3, ?4)",
        params![week_id, word, definition, example_sentence],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Add an affix to a week and return its id.
pub fn add_affix(
    conn: &Connection,
    week_id: i64,
    affix: &str,
    kind: &str,
    meaning: &str,
) -> CoreResult<i64> {
    conn.execute(
        "INSERT INTO affixes (week_id, affix, kind, meaning) VALUES (?1, ?2, ?3, ?4)",
        params![week_id, affix, kind, meaning],
    )?;
    Ok(conn.last_insert_rowid())
}

fn vocab_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vocab> {
    Ok(Vocab {
        id: row.get(0)?,
        week_id: row.get(1)?,
        word: row.get(2)?,
        definition: row.get(3)?,
        example_sentence: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
    })
}

/// All vocabulary for a week, in content order.
pub fn vocab_for_week(conn: &Connection, week_id: i64) -> CoreResult<Vec<Vocab>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, word, definition, example_sentence
         FROM vocab WHERE week_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![week_id], vocab_from_row)?;
    Ok(rows.filter_map(|v| v.ok()).collect())
}

/// Get single vocabulary word by ID
pub fn vocab_by_id(conn: &Connection, vocab_id: i64) -> CoreResult<Option<Vocab>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, word, definition, example_sentence FROM vocab WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![vocab_id], vocab_from_row);

    match result {
        Ok(vocab) => Ok(Some(vocab)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch vocabulary rows for the given ids, preserving input order.
/// Ids with no surviving row are dropped.
pub fn vocab_by_ids(conn: &Connection, vocab_ids: &[i64]) -> CoreResult<Vec<Vocab>> {
    let mut words = Vec::with_capacity(vocab_ids.len());
    for &id in vocab_ids {
        if let Some(vocab) = vocab_by_id(conn, id)? {
            words.push(vocab);
        }
    }
    Ok(words)
}

/// All affixes for a week, in content order.
pub fn affixes_for_week(conn: &Connection, week_id: i64) -> CoreResult<Vec<Affix>> {
    let mut stmt = conn.prepare(
        "SELECT id, week_id, affix, kind, meaning FROM affixes WHERE week_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![week_id], |row| {
        Ok(Affix {
            id: row.get(0)?,
            week_id: row.get(1)?,
            affix: row.get(2)?,
            kind: row.get(3)?,
            meaning: row.get(4)?,
        })
    })?;
    Ok(rows.filter_map(|a| a.ok()).collect())
}

/// Timestamps are stored as unix milliseconds.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn memory_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    create_schema(&conn).expect("create schema");
    conn
}

/// Current time truncated to storage precision, so equality assertions
/// survive a round trip through the store.
#[cfg(test)]
pub(crate) fn test_now() -> DateTime<Utc> {
    from_millis(to_millis(Utc::now()))
}
