//! Quiz composition: selection policy, assembly and the generation operation

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts;
use crate::db::{self, from_millis, to_millis, Affix, Vocab};
use crate::error::{CoreError, CoreResult};
use crate::mastery;
use crate::questions::{build_affix_question, build_word_question, ComposedQuestion, QuizQuestion};

/// Quiz cadence. Daily drills lean on spiral review; the Friday quiz
/// covers the whole week plus affixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizMode {
    Daily,
    Friday,
}

impl QuizMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizMode::Daily => "daily",
            QuizMode::Friday => "friday",
        }
    }

    /// Time the student has to complete the quiz.
    fn window(&self) -> Duration {
        match self {
            QuizMode::Daily => Duration::days(1),
            QuizMode::Friday => Duration::days(3),
        }
    }

    fn from_db(s: &str) -> QuizMode {
        match s {
            "friday" => QuizMode::Friday,
            _ => QuizMode::Daily,
        }
    }
}

impl FromStr for QuizMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(QuizMode::Daily),
            "friday" => Ok(QuizMode::Friday),
            _ => Err(CoreError::InvalidArgument(
                "mode must be \"daily\" or \"friday\"".to_string(),
            )),
        }
    }
}

impl fmt::Display for QuizMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Student-facing quiz aggregate (public projection). Never carries
/// answer data; scoring goes through the separately stored [`AnswerKey`].
#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: String,
    pub student_uid: String,
    pub teacher_uid: String,
    pub week_id: i64,
    pub mode: QuizMode,
    pub assigned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub question_count: i64,
    pub questions: Vec<QuizQuestion>,
}

/// Scoring map for one quiz, stored apart from the public document and
/// addressed by the same quiz id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerKey {
    /// question id -> index of the correct choice after shuffling
    pub correct_indexes: BTreeMap<String, usize>,
    /// question id -> source word id; affix questions have no entry
    pub word_ids: BTreeMap<String, i64>,
}

/// Result of a successful generation call.
#[derive(Debug, Clone)]
pub struct QuizSummary {
    pub quiz_id: String,
    pub question_count: usize,
}

/// Content selected for one quiz, before question generation.
#[derive(Debug)]
pub(crate) struct QuizPlan {
    pub(crate) words: Vec<Vocab>,
    pub(crate) affixes: Vec<Affix>,
}

/// Apply the mode's selection policy over the fetched pools.
///
/// Daily: two current-week words, remainder filled from the due pool in
/// due order, no affixes. Friday: every current-week word, then due
/// words capped by `min(ceil(0.4 * n), due, n - current)`, then up to
/// two affixes. Short pools produce a short quiz rather than an error.
pub(crate) fn select_content(
    mode: QuizMode,
    num_questions: usize,
    current_words: &[Vocab],
    current_affixes: &[Affix],
    due_words: &[Vocab],
) -> QuizPlan {
    match mode {
        QuizMode::Daily => {
            let current_count = current_words.len().min(2);
            let spiral_count = due_words
                .len()
                .min(num_questions.saturating_sub(current_count));
            let mut words = current_words[..current_count].to_vec();
            words.extend_from_slice(&due_words[..spiral_count]);
            QuizPlan {
                words,
                affixes: Vec::new(),
            }
        }
        QuizMode::Friday => {
            let mut words = current_words.to_vec();
            let spiral_count = ((num_questions as f64 * 0.4).ceil() as usize)
                .min(due_words.len())
                .min(num_questions.saturating_sub(words.len()));
            words.extend_from_slice(&due_words[..spiral_count]);

            let affix_count = current_affixes.len().min(2);
            QuizPlan {
                words,
                affixes: current_affixes[..affix_count].to_vec(),
            }
        }
    }
}

/// Generate questions for the plan, shuffle the overall order, and split
/// into the public question list and the private answer key.
///
/// Word questions are bounded to `num_questions - affix_count` so affix
/// slots always fit; an affix with no usable template is skipped.
pub(crate) fn compose_questions<R: Rng>(
    plan: &QuizPlan,
    num_questions: usize,
    week_vocab: &[Vocab],
    week_affixes: &[Affix],
    rng: &mut R,
) -> (Vec<QuizQuestion>, AnswerKey) {
    let word_budget = num_questions.saturating_sub(plan.affixes.len());

    let mut composed: Vec<ComposedQuestion> = plan
        .words
        .iter()
        .take(word_budget)
        .map(|word| build_word_question(word, week_vocab, rng))
        .collect();

    for affix in &plan.affixes {
        if let Some(question) = build_affix_question(affix, week_affixes, week_vocab, rng) {
            composed.push(question);
        }
    }

    // Question order is shuffled independently of each question's choices
    composed.shuffle(rng);

    let mut key = AnswerKey::default();
    let mut questions = Vec::with_capacity(composed.len());
    for item in composed {
        key.correct_indexes
            .insert(item.question.id.clone(), item.correct_index);
        if let Some(word_id) = item.word_id {
            key.word_ids.insert(item.question.id.clone(), word_id);
        }
        questions.push(item.question);
    }
    (questions, key)
}

/// Teacher generates a quiz for a student from the week's content plus
/// the student's due spiral words.
///
/// The public quiz and its answer key are written in one transaction so
/// a half-created pair is never observable. Each call creates a new,
/// independent quiz.
pub fn generate_quiz(
    conn: &mut Connection,
    teacher_uid: &str,
    student_uid: &str,
    week_id: i64,
    mode: QuizMode,
    num_questions: usize,
    now: DateTime<Utc>,
) -> CoreResult<QuizSummary> {
    if num_questions == 0 {
        return Err(CoreError::InvalidArgument(
            "numQuestions must be at least 1".to_string(),
        ));
    }
    accounts::verify_teacher(conn, teacher_uid)?;

    let student = accounts::student_by_uid(conn, student_uid)?
        .ok_or_else(|| CoreError::NotFound("student not found".to_string()))?;
    if student.teacher_uid != teacher_uid {
        return Err(CoreError::PermissionDenied(
            "student is not managed by this teacher".to_string(),
        ));
    }

    let week = db::week_by_id(conn, week_id)?
        .ok_or_else(|| CoreError::NotFound("week not found".to_string()))?;
    if week.teacher_uid != teacher_uid {
        return Err(CoreError::PermissionDenied(
            "week not owned by teacher".to_string(),
        ));
    }

    let week_vocab = db::vocab_for_week(conn, week_id)?;
    let week_affixes = db::affixes_for_week(conn, week_id)?;

    let due = mastery::due_records(conn, student_uid, now)?;
    let due_ids: Vec<i64> = due.iter().map(|record| record.word_id).collect();
    let due_words = db::vocab_by_ids(conn, &due_ids)?;

    let plan = select_content(mode, num_questions, &week_vocab, &week_affixes, &due_words);
    let mut rng = rand::thread_rng();
    let (questions, key) = compose_questions(&plan, num_questions, &week_vocab, &week_affixes, &mut rng);

    let quiz = Quiz {
        id: Uuid::new_v4().to_string(),
        student_uid: student_uid.to_string(),
        teacher_uid: teacher_uid.to_string(),
        week_id,
        mode,
        assigned_at: now,
        due_at: now + mode.window(),
        completed_at: None,
        question_count: questions.len() as i64,
        questions,
    };

    let tx = conn.transaction()?;
    insert_quiz_pair(&tx, &quiz, &key)?;
    tx.commit()?;

    log::info!(
        "generated {} quiz {} with {} questions for student {}",
        quiz.mode,
        quiz.id,
        quiz.question_count,
        quiz.student_uid
    );

    Ok(QuizSummary {
        quiz_id: quiz.id,
        question_count: quiz.question_count as usize,
    })
}

/// Insert the public document and the answer key together. Callers wrap
/// this in a transaction; a partial pair must never be visible.
fn insert_quiz_pair(conn: &Connection, quiz: &Quiz, key: &AnswerKey) -> CoreResult<()> {
    let questions_json = serde_json::to_string(&quiz.questions)?;
    conn.execute(
        "INSERT INTO quizzes_public (id, student_uid, teacher_uid, week_id, mode,
                                     assigned_at, due_at, completed_at, question_count, questions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
        params![
            quiz.id,
            quiz.student_uid,
            quiz.teacher_uid,
            quiz.week_id,
            quiz.mode.as_str(),
            to_millis(quiz.assigned_at),
            to_millis(quiz.due_at),
            quiz.question_count,
            questions_json,
        ],
    )?;

    let key_json = serde_json::to_string(key)?;
    conn.execute(
        "INSERT INTO quizzes_private (quiz_id, answer_key) VALUES (?1, ?2)",
        params![quiz.id, key_json],
    )?;
    Ok(())
}

/// Load the public quiz document.
pub(crate) fn quiz_by_id(conn: &Connection, quiz_id: &str) -> CoreResult<Option<Quiz>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_uid, teacher_uid, week_id, mode, assigned_at, due_at,
                completed_at, question_count, questions
         FROM quizzes_public WHERE id = ?1",
    )?;
    let result = stmt.query_row(params![quiz_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, Option<i64>>(7)?,
            row.get::<_, i64>(8)?,
            row.get::<_, String>(9)?,
        ))
    });

    let row = match result {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let questions: Vec<QuizQuestion> = serde_json::from_str(&row.9)?;
    Ok(Some(Quiz {
        id: row.0,
        student_uid: row.1,
        teacher_uid: row.2,
        week_id: row.3,
        mode: QuizMode::from_db(&row.4),
        assigned_at: from_millis(row.5),
        due_at: from_millis(row.6),
        completed_at: row.7.map(from_millis),
        question_count: row.8,
        questions,
    }))
}

/// Load the answer key for a quiz.
pub(crate) fn answer_key(conn: &Connection, quiz_id: &str) -> CoreResult<Option<AnswerKey>> {
    let mut stmt = conn.prepare("SELECT answer_key FROM quizzes_private WHERE quiz_id = ?1")?;
    let result = stmt.query_row(params![quiz_id], |row| row.get::<_, String>(0));

    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch the answer-free quiz view. Students may read their own quizzes,
/// teachers the quizzes they assigned.
pub fn get_quiz_public(conn: &Connection, caller_uid: &str, quiz_id: &str) -> CoreResult<Quiz> {
    let quiz = quiz_by_id(conn, quiz_id)?
        .ok_or_else(|| CoreError::NotFound("quiz not found".to_string()))?;

    let allowed = match accounts::user_role(conn, caller_uid)? {
        Some(accounts::Role::Student) => quiz.student_uid == caller_uid,
        Some(accounts::Role::Teacher) => quiz.teacher_uid == caller_uid,
        None => false,
    };
    if !allowed {
        return Err(CoreError::PermissionDenied("access denied".to_string()));
    }
    Ok(quiz)
}
