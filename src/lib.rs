//! WordSpiral Core - spaced-repetition vocabulary mastery and quiz generation
//!
//! Provides the per-student word mastery tracker (streaks, status ladder,
//! due-date scheduling), the quiz composer (selection policy, distractor
//! sampling, answer-key separation), the submission scoring pipeline that
//! feeds results back into the tracker, and SQLite-backed content storage.

mod accounts;
mod attempts;
mod db;
mod error;
mod fuzzy;
mod import;
mod mastery;
mod questions;
mod quiz;

pub use accounts::{
    add_user, claim_student_account, create_student, student_by_uid, user_role, Role,
    StudentRecord,
};
pub use attempts::{
    attempts_for_student, submit_quiz_attempt, AttemptSummary, QuizAttempt, QuizResponse,
    ScoredResponse,
};
pub use db::{
    add_affix, add_vocab, affixes_for_week, create_schema, create_week, init_database,
    vocab_by_id, vocab_for_week, week_by_id, Affix, Vocab, Week,
};
pub use error::{CoreError, CoreResult};
pub use import::{import_week_affixes, import_week_vocab};
pub use mastery::{
    advance_status, due_records, get_mastery, mastery_summary, next_due_date, record_attempt,
    MasteryRecord, MasteryStatus, MasterySummary,
};
pub use questions::{QuestionKind, QuestionSource, QuizQuestion};
pub use quiz::{generate_quiz, get_quiz_public, AnswerKey, Quiz, QuizMode, QuizSummary};
