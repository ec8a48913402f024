//! Mastery tracker - per-student-per-word spaced repetition state

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use crate::db::{from_millis, to_millis};
use crate::error::CoreResult;

/// Ladder stage summarizing a student's command of one word.
///
/// The ordering of the variants is the progression order, so `Ord`
/// comparisons express "at least as far along the ladder".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MasteryStatus {
    New,
    Learning,
    Practiced,
    Mastered,
}

impl MasteryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryStatus::New => "new",
            MasteryStatus::Learning => "learning",
            MasteryStatus::Practiced => "practiced",
            MasteryStatus::Mastered => "mastered",
        }
    }

    fn from_db(s: &str) -> MasteryStatus {
        match s {
            "learning" => MasteryStatus::Learning,
            "practiced" => MasteryStatus::Practiced,
            "mastered" => MasteryStatus::Mastered,
            _ => MasteryStatus::New,
        }
    }
}

/// Spaced-repetition record for one (student, word) pair.
#[derive(Debug, Clone)]
pub struct MasteryRecord {
    pub student_uid: String,
    pub word_id: i64,
    pub status: MasteryStatus,
    pub correct_streak: i64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub last_seen_at: DateTime<Utc>,
    pub next_due_at: DateTime<Utc>,
}

/// Per-student mastery overview for teacher dashboards.
#[derive(Debug, Clone, Default)]
pub struct MasterySummary {
    pub new_count: i64,
    pub learning_count: i64,
    pub practiced_count: i64,
    pub mastered_count: i64,
    pub total_attempts: i64,
    pub correct_attempts: i64,
    pub accuracy_percent: f64,
}

/// Next review time as a step function of the new streak value.
///
/// An incorrect answer always schedules one day out; the caller has
/// already reset the streak to 0 before invoking this.
pub fn next_due_date(is_correct: bool, new_streak: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    if !is_correct {
        return now + Duration::days(1);
    }

    // Correct: schedule forward based on streak, 3d -> 7d -> 14d
    let days_ahead = if new_streak >= 3 {
        14
    } else if new_streak >= 2 {
        7
    } else if new_streak >= 1 {
        3
    } else {
        1
    };

    now + Duration::days(days_ahead)
}

/// Advance the status ladder for the new streak value.
///
/// The status is a one-way ratchet: a later streak reset clears
/// `correct_streak` but never moves the status backwards.
pub fn advance_status(current: MasteryStatus, new_streak: i64) -> MasteryStatus {
    match current {
        MasteryStatus::New if new_streak >= 1 => MasteryStatus::Learning,
        MasteryStatus::Learning if new_streak >= 2 => MasteryStatus::Practiced,
        MasteryStatus::Practiced if new_streak >= 3 => MasteryStatus::Mastered,
        other => other,
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MasteryRecord> {
    Ok(MasteryRecord {
        student_uid: row.get(0)?,
        word_id: row.get(1)?,
        status: MasteryStatus::from_db(&row.get::<_, String>(2)?),
        correct_streak: row.get(3)?,
        total_attempts: row.get(4)?,
        correct_attempts: row.get(5)?,
        last_seen_at: from_millis(row.get(6)?),
        next_due_at: from_millis(row.get(7)?),
    })
}

const RECORD_COLUMNS: &str = "student_uid, word_id, status, correct_streak, \
                              total_attempts, correct_attempts, last_seen_at, next_due_at";

/// Get the mastery record for one (student, word) pair.
pub fn get_mastery(
    conn: &Connection,
    student_uid: &str,
    word_id: i64,
) -> CoreResult<Option<MasteryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM word_mastery WHERE student_uid = ?1 AND word_id = ?2"
    ))?;
    let result = stmt.query_row(params![student_uid, word_id], record_from_row);

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Apply one scored answer to the (student, word) record and upsert it.
///
/// Must be invoked exactly once per scored word question per submission;
/// the submission pipeline calls it inside its transaction so the
/// read-modify-write is serialized per key.
pub fn record_attempt(
    conn: &Connection,
    student_uid: &str,
    word_id: i64,
    is_correct: bool,
    now: DateTime<Utc>,
) -> CoreResult<MasteryRecord> {
    let record = match get_mastery(conn, student_uid, word_id)? {
        Some(existing) => {
            let new_streak = if is_correct { existing.correct_streak + 1 } else { 0 };
            MasteryRecord {
                status: advance_status(existing.status, new_streak),
                correct_streak: new_streak,
                total_attempts: existing.total_attempts + 1,
                correct_attempts: existing.correct_attempts + i64::from(is_correct),
                last_seen_at: now,
                next_due_at: next_due_date(is_correct, new_streak, now),
                ..existing
            }
        }
        None => {
            let new_streak = i64::from(is_correct);
            MasteryRecord {
                student_uid: student_uid.to_string(),
                word_id,
                status: if new_streak > 0 { MasteryStatus::Learning } else { MasteryStatus::New },
                correct_streak: new_streak,
                total_attempts: 1,
                correct_attempts: i64::from(is_correct),
                last_seen_at: now,
                next_due_at: next_due_date(is_correct, new_streak, now),
            }
        }
    };

    conn.execute(
        "INSERT INTO word_mastery (student_uid, word_id, status, correct_streak,
                                   total_attempts, correct_attempts, last_seen_at, next_due_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(student_uid, word_id) DO UPDATE SET
             status = excluded.status,
             correct_streak = excluded.correct_streak,
             total_attempts = excluded.total_attempts,
             correct_attempts = excluded.correct_attempts,
             last_seen_at = excluded.last_seen_at,
             next_due_at = excluded.next_due_at",
        params![
            record.student_uid,
            record.word_id,
            record.status.as_str(),
            record.correct_streak,
            record.total_attempts,
            record.correct_attempts,
            to_millis(record.last_seen_at),
            to_millis(record.next_due_at),
        ],
    )?;

    Ok(record)
}

/// Records due for spiral review: not mastered and due at or before
/// `now`, oldest due first so the most overdue words win when the
/// caller truncates to a question budget.
pub fn due_records(
    conn: &Connection,
    student_uid: &str,
    now: DateTime<Utc>,
) -> CoreResult<Vec<MasteryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM word_mastery
         WHERE student_uid = ?1 AND status != 'mastered' AND next_due_at <= ?2
         ORDER BY next_due_at ASC"
    ))?;
    let rows = stmt.query_map(params![student_uid, to_millis(now)], record_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Status breakdown plus lifetime accuracy for one student.
pub fn mastery_summary(conn: &Connection, student_uid: &str) -> CoreResult<MasterySummary> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*), SUM(total_attempts), SUM(correct_attempts)
         FROM word_mastery WHERE student_uid = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![student_uid], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut summary = MasterySummary::default();
    for row in rows.filter_map(|r| r.ok()) {
        let (status, count, attempts, correct) = row;
        match MasteryStatus::from_db(&status) {
            MasteryStatus::New => summary.new_count = count,
            MasteryStatus::Learning => summary.learning_count = count,
            MasteryStatus::Practiced => summary.practiced_count = count,
            MasteryStatus::Mastered => summary.mastered_count = count,
        }
        summary.total_attempts += attempts;
        summary.correct_attempts += correct;
    }
    if summary.total_attempts > 0 {
        summary.accuracy_percent =
            (summary.correct_attempts as f64 / summary.total_attempts as f64) * 100.0;
    }
    Ok(summary)
}
