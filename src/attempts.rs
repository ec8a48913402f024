//! Submission scoring pipeline and attempt history

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts;
use crate::db::{from_millis, to_millis};
use crate::error::{CoreError, CoreResult};
use crate::mastery;
use crate::quiz;

/// One submitted answer for one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResponse {
    pub question_id: String,
    pub selected_index: usize,
}

/// A response after scoring, as persisted on the attempt record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResponse {
    pub question_id: String,
    pub selected_index: usize,
    pub is_correct: bool,
}

/// Immutable record of one quiz submission.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: String,
    pub student_uid: String,
    pub submitted_at: DateTime<Utc>,
    pub score_percent: i64,
    pub correct_count: i64,
    pub total_questions: i64,
    pub responses: Vec<ScoredResponse>,
}

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct AttemptSummary {
    pub attempt_id: String,
    pub score_percent: i64,
    pub correct_count: usize,
    pub total_questions: usize,
}

/// Student submits answers for a quiz. Scores against the answer key,
/// records the attempt, marks the quiz completed, and feeds every word
/// question's result into the mastery tracker.
///
/// All validation happens before any write. The completion flag is set
/// with a check-and-set inside the same transaction as the attempt and
/// mastery writes, so a concurrent second submission is rejected with
/// `FailedPrecondition` and mutates nothing.
pub fn submit_quiz_attempt(
    conn: &mut Connection,
    student_uid: &str,
    quiz_id: &str,
    responses: &[QuizResponse],
    now: DateTime<Utc>,
) -> CoreResult<AttemptSummary> {
    accounts::verify_student(conn, student_uid)?;

    if responses.is_empty() {
        return Err(CoreError::InvalidArgument(
            "responses must not be empty".to_string(),
        ));
    }

    let quiz = quiz::quiz_by_id(conn, quiz_id)?
        .ok_or_else(|| CoreError::NotFound("quiz not found".to_string()))?;
    if quiz.student_uid != student_uid {
        return Err(CoreError::PermissionDenied(
            "quiz belongs to another student".to_string(),
        ));
    }
    if quiz.completed_at.is_some() {
        return Err(CoreError::FailedPrecondition(
            "quiz already completed".to_string(),
        ));
    }

    let key = quiz::answer_key(conn, quiz_id)?
        .ok_or_else(|| CoreError::NotFound("quiz answer key not found".to_string()))?;

    // Score while validating: every question id must be known, none repeated
    let mut seen: HashSet<&str> = HashSet::with_capacity(responses.len());
    let mut scored = Vec::with_capacity(responses.len());
    for response in responses {
        let correct_index = key.correct_indexes.get(&response.question_id).ok_or_else(|| {
            CoreError::InvalidArgument(format!("unknown question id {}", response.question_id))
        })?;
        if !seen.insert(response.question_id.as_str()) {
            return Err(CoreError::InvalidArgument(format!(
                "duplicate question id {}",
                response.question_id
            )));
        }
        scored.push(ScoredResponse {
            question_id: response.question_id.clone(),
            selected_index: response.selected_index,
            is_correct: response.selected_index == *correct_index,
        });
    }

    let correct_count = scored.iter().filter(|r| r.is_correct).count();
    let score_percent = ((correct_count as f64 / scored.len() as f64) * 100.0).round() as i64;

    let attempt_id = Uuid::new_v4().to_string();
    let responses_json = serde_json::to_string(&scored)?;

    let tx = conn.transaction()?;

    // Authoritative completion guard: only one submission may flip the flag
    let updated = tx.execute(
        "UPDATE quizzes_public SET completed_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
        params![to_millis(now), quiz_id],
    )?;
    if updated == 0 {
        return Err(CoreError::FailedPrecondition(
            "quiz already completed".to_string(),
        ));
    }

    tx.execute(
        "INSERT INTO quiz_attempts (id, quiz_id, student_uid, submitted_at,
                                    score_percent, correct_count, total_questions, responses)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            attempt_id,
            quiz_id,
            student_uid,
            to_millis(now),
            score_percent,
            correct_count as i64,
            scored.len() as i64,
            responses_json,
        ],
    )?;

    // Affix questions have no word id entry and never touch mastery
    for response in &scored {
        if let Some(word_id) = key.word_ids.get(&response.question_id) {
            mastery::record_attempt(&tx, student_uid, *word_id, response.is_correct, now)?;
        }
    }

    tx.commit()?;

    log::info!(
        "scored quiz {} for student {}: {}/{} ({score_percent}%)",
        quiz_id,
        student_uid,
        correct_count,
        scored.len()
    );

    Ok(AttemptSummary {
        attempt_id,
        score_percent,
        correct_count,
        total_questions: scored.len(),
    })
}

fn attempt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(QuizAttempt, String)> {
    Ok((
        QuizAttempt {
            id: row.get(0)?,
            quiz_id: row.get(1)?,
            student_uid: row.get(2)?,
            submitted_at: from_millis(row.get(3)?),
            score_percent: row.get(4)?,
            correct_count: row.get(5)?,
            total_questions: row.get(6)?,
            responses: Vec::new(),
        },
        row.get(7)?,
    ))
}

/// Attempt history for a student, most recent first.
pub fn attempts_for_student(conn: &Connection, student_uid: &str) -> CoreResult<Vec<QuizAttempt>> {
    let mut stmt = conn.prepare(
        "SELECT id, quiz_id, student_uid, submitted_at, score_percent,
                correct_count, total_questions, responses
         FROM quiz_attempts WHERE student_uid = ?1 ORDER BY submitted_at DESC",
    )?;
    let rows = stmt.query_map(params![student_uid], attempt_from_row)?;

    let mut attempts = Vec::new();
    for row in rows.filter_map(|r| r.ok()) {
        let (mut attempt, responses_json) = row;
        attempt.responses = serde_json::from_str(&responses_json)?;
        attempts.push(attempt);
    }
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{add_user, claim_student_account, create_student, Role};
    use crate::db::{add_affix, add_vocab, create_week, memory_conn, test_now};
    use crate::mastery::{due_records, get_mastery, MasteryStatus};
    use crate::quiz::{answer_key, generate_quiz, quiz_by_id, AnswerKey, QuizMode};
    use chrono::Duration;

    fn seed_classroom(conn: &Connection) -> i64 {
        add_user(conn, "t1", Role::Teacher, "Ms. Rivera", "rivera@school.test").unwrap();
        add_user(conn, "s1", Role::Student, "Jordan", "jordan@school.test").unwrap();
        create_student(conn, "t1", "jordan@school.test", "Jordan").unwrap();
        claim_student_account(conn, "s1", "jordan@school.test").unwrap();

        let week = create_week(conn, "t1", "Week 1 - West Africa").unwrap();
        add_vocab(conn, week, "benevolent", "kind and generous", "").unwrap();
        add_vocab(conn, week, "commerce", "the buying and selling of goods", "").unwrap();
        add_vocab(conn, week, "pilgrimage", "a journey to a sacred place", "").unwrap();
        add_vocab(conn, week, "caravan", "a group traveling across a desert", "").unwrap();
        add_affix(conn, week, "bene", "root", "good, well").unwrap();
        add_affix(conn, week, "com", "prefix", "with, together").unwrap();
        week
    }

    /// Build responses straight from the answer key: all correct, or all
    /// off-by-one and therefore all wrong.
    fn responses_from_key(key: &AnswerKey, correct: bool) -> Vec<QuizResponse> {
        key.correct_indexes
            .iter()
            .map(|(question_id, index)| QuizResponse {
                question_id: question_id.clone(),
                selected_index: if correct { *index } else { index + 1 },
            })
            .collect()
    }

    #[test]
    fn perfect_submission_scores_100_and_completes_quiz() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Friday, 6, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();
        let responses = responses_from_key(&key, true);

        let result =
            submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now).unwrap();
        assert_eq!(result.score_percent, 100);
        assert_eq!(result.correct_count, result.total_questions);
        assert_eq!(result.total_questions, summary.question_count);

        let quiz = quiz_by_id(&conn, &summary.quiz_id).unwrap().unwrap();
        assert_eq!(quiz.completed_at, Some(from_millis(to_millis(now))));

        let attempts = attempts_for_student(&conn, "s1").unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].quiz_id, summary.quiz_id);
        assert!(attempts[0].responses.iter().all(|r| r.is_correct));
    }

    #[test]
    fn word_questions_feed_mastery_and_affix_questions_do_not() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Friday, 6, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();
        let responses = responses_from_key(&key, true);
        submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now).unwrap();

        // Exactly the word questions produced mastery records
        let mut tracked = 0;
        for word_id in key.word_ids.values() {
            let record = get_mastery(&conn, "s1", *word_id).unwrap().unwrap();
            assert_eq!(record.status, MasteryStatus::Learning);
            assert_eq!(record.correct_streak, 1);
            assert_eq!(record.next_due_at, now + Duration::days(3));
            tracked += 1;
        }
        assert!(tracked >= 1);

        let mut stmt = conn
            .prepare("SELECT COUNT(*) FROM word_mastery WHERE student_uid = 's1'")
            .unwrap();
        let total: i64 = stmt.query_row([], |row| row.get(0)).unwrap();
        assert_eq!(total, tracked);
    }

    #[test]
    fn incorrect_answers_schedule_next_day_review() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Daily, 4, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();

        // Daily quizzes here are all word questions; answer everything wrong
        let responses = responses_from_key(&key, false);
        let result =
            submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now).unwrap();
        assert_eq!(result.score_percent, 0);

        let due = due_records(&conn, "s1", now + Duration::days(1)).unwrap();
        assert_eq!(due.len(), key.word_ids.len());
        for record in due {
            assert_eq!(record.status, MasteryStatus::New);
            assert_eq!(record.correct_streak, 0);
        }
    }

    #[test]
    fn double_submission_is_rejected_without_mutation() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Daily, 4, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();
        let responses = responses_from_key(&key, true);

        submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now).unwrap();
        let word_id = *key.word_ids.values().next().unwrap();
        let before = get_mastery(&conn, "s1", word_id).unwrap().unwrap();

        let err = submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now);
        assert!(matches!(err, Err(CoreError::FailedPrecondition(_))));

        // No double-counting happened
        let after = get_mastery(&conn, "s1", word_id).unwrap().unwrap();
        assert_eq!(after.total_attempts, before.total_attempts);
        assert_eq!(after.correct_streak, before.correct_streak);
        assert_eq!(attempts_for_student(&conn, "s1").unwrap().len(), 1);
    }

    #[test]
    fn unknown_question_id_is_a_hard_validation_error() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Daily, 4, now).unwrap();
        let responses = vec![QuizResponse {
            question_id: "not-a-question".to_string(),
            selected_index: 0,
        }];

        let err = submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now);
        assert!(matches!(err, Err(CoreError::InvalidArgument(_))));

        // Nothing was written: quiz still open, no attempt, no mastery
        let quiz = quiz_by_id(&conn, &summary.quiz_id).unwrap().unwrap();
        assert_eq!(quiz.completed_at, None);
        assert!(attempts_for_student(&conn, "s1").unwrap().is_empty());
        assert!(due_records(&conn, "s1", now + Duration::days(2)).unwrap().is_empty());
    }

    #[test]
    fn duplicate_question_ids_are_rejected() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Daily, 4, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();
        let mut responses = responses_from_key(&key, true);
        responses.push(responses[0].clone());

        let err = submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now);
        assert!(matches!(err, Err(CoreError::InvalidArgument(_))));
        let quiz = quiz_by_id(&conn, &summary.quiz_id).unwrap().unwrap();
        assert_eq!(quiz.completed_at, None);
    }

    #[test]
    fn submission_access_checks() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Daily, 4, now).unwrap();
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();
        let responses = responses_from_key(&key, true);

        // Teachers cannot submit
        assert!(matches!(
            submit_quiz_attempt(&mut conn, "t1", &summary.quiz_id, &responses, now),
            Err(CoreError::PermissionDenied(_))
        ));

        // Another student cannot submit someone else's quiz
        add_user(&conn, "s2", Role::Student, "Riley", "riley@school.test").unwrap();
        assert!(matches!(
            submit_quiz_attempt(&mut conn, "s2", &summary.quiz_id, &responses, now),
            Err(CoreError::PermissionDenied(_))
        ));

        // Missing quiz
        assert!(matches!(
            submit_quiz_attempt(&mut conn, "s1", "missing", &responses, now),
            Err(CoreError::NotFound(_))
        ));

        // Empty response list
        assert!(matches!(
            submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &[], now),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn score_percent_rounds_to_nearest() {
        let mut conn = memory_conn();
        let week = seed_classroom(&conn);
        let now = test_now();

        // 3-question quiz: 2 current + 1 due word would need mastery state,
        // so use a friday quiz trimmed by content: 4 vocab + 2 affixes = 6
        // questions; answer 4 correctly -> 67%.
        let summary =
            generate_quiz(&mut conn, "t1", "s1", week, QuizMode::Friday, 6, now).unwrap();
        assert_eq!(summary.question_count, 6);
        let key = answer_key(&conn, &summary.quiz_id).unwrap().unwrap();

        let mut responses = responses_from_key(&key, true);
        for response in responses.iter_mut().take(2) {
            response.selected_index += 1;
        }

        let result =
            submit_quiz_attempt(&mut conn, "s1", &summary.quiz_id, &responses, now).unwrap();
        assert_eq!(result.correct_count, 4);
        assert_eq!(result.score_percent, 67);
    }
}
