// src/services/exam.rs

use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::EXAM_QUESTION_COUNT,
    error::{AppError, is_unique_violation},
    models::{
        exam::{AnswerSubmission, Exam, ExamResult, SubmitExamRequest, SubmitExamResponse},
        question::{PublicQuestion, Question},
        user::User,
    },
    utils::score::{round2, score_percentage},
};

const EXAM_COLUMNS: &str =
    "id, user_id, start_time, end_time, is_completed, score, total_questions, correct_answers";

/// Helper struct for fetching answer keys from the database.
#[derive(sqlx::FromRow)]
struct AnswerKey {
    id: i64,
    correct_answer: String,
}

/// A submitted answer after comparison with its question's key.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAnswer {
    pub question_id: i64,
    pub selected_answer: String,
    pub is_correct: bool,
}

/// Grades submitted answers by exact string match against the answer keys.
///
/// Answers whose question id has no key are dropped.
pub fn grade_answers(
    answers: &[AnswerSubmission],
    keys: &HashMap<i64, String>,
) -> Vec<GradedAnswer> {
    answers
        .iter()
        .filter_map(|answer| {
            keys.get(&answer.question_id).map(|correct| GradedAnswer {
                question_id: answer.question_id,
                selected_answer: answer.selected_answer.clone(),
                is_correct: &answer.selected_answer == correct,
            })
        })
        .collect()
}

/// Builds the result view of a completed exam.
pub fn exam_result(exam: &Exam) -> Result<ExamResult, AppError> {
    if !exam.is_completed {
        return Err(AppError::BadRequest("Exam not completed yet".to_string()));
    }

    let score = exam.score.unwrap_or(0.0);
    Ok(ExamResult {
        exam_id: exam.id,
        score,
        total_questions: exam.total_questions,
        correct_answers: exam.correct_answers,
        percentage: round2(score),
        start_time: exam.start_time,
        end_time: exam.end_time,
    })
}

/// Rejects a draw that came back with fewer than `EXAM_QUESTION_COUNT` questions.
pub fn ensure_full_exam(drawn: usize) -> Result<(), AppError> {
    if (drawn as i64) < EXAM_QUESTION_COUNT {
        return Err(AppError::InsufficientData(
            "Not enough questions in database".to_string(),
        ));
    }
    Ok(())
}

async fn active_exam_id<'e, E>(executor: E, user_id: i64) -> Result<Option<i64>, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM exams WHERE user_id = $1 AND NOT is_completed LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

/// Starts a new exam for the user and returns its questions without answers.
///
/// * Fails with `Conflict` if the user already has an incomplete exam.
/// * Fails with `InsufficientData` if the pool holds fewer than
///   `EXAM_QUESTION_COUNT` questions.
pub async fn start_exam(pool: &PgPool, user: &User) -> Result<Vec<PublicQuestion>, AppError> {
    let mut tx = pool.begin().await?;

    if active_exam_id(&mut *tx, user.id).await?.is_some() {
        return Err(AppError::Conflict(
            "You already have an active exam".to_string(),
        ));
    }

    // Uniform sample without replacement.
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, question_text, option_a, option_b, option_c, option_d,
               correct_answer, created_at
        FROM questions
        ORDER BY RANDOM()
        LIMIT $1
        "#,
    )
    .bind(EXAM_QUESTION_COUNT)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch exam questions: {:?}", e);
        AppError::from(e)
    })?;

    ensure_full_exam(questions.len())?;

    // The partial unique index catches a concurrent start that slipped past the check above.
    let exam_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO exams (user_id, total_questions) VALUES ($1, $2) RETURNING id",
    )
    .bind(user.id)
    .bind(EXAM_QUESTION_COUNT as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("You already have an active exam".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    tx.commit().await?;

    tracing::info!(exam_id, user_id = user.id, "Exam started");
    Ok(questions.into_iter().map(PublicQuestion::from).collect())
}

/// Grades and closes the user's active exam.
///
/// * Fails with `BadRequest` if there is no active exam.
/// * Answers and the exam update are written in one transaction.
pub async fn submit_exam(
    pool: &PgPool,
    user: &User,
    req: &SubmitExamRequest,
) -> Result<SubmitExamResponse, AppError> {
    let mut tx = pool.begin().await?;

    let exam = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE user_id = $1 AND NOT is_completed LIMIT 1 FOR UPDATE"
    ))
    .bind(user.id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::BadRequest("No active exam found".to_string()))?;

    let mut question_ids: Vec<i64> = req.answers.iter().map(|a| a.question_id).collect();
    question_ids.sort_unstable();
    question_ids.dedup();

    let keys: HashMap<i64, String> = if question_ids.is_empty() {
        HashMap::new()
    } else {
        sqlx::query_as::<_, AnswerKey>(
            "SELECT id, correct_answer FROM questions WHERE id = ANY($1)",
        )
        .bind(question_ids.as_slice())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|k| (k.id, k.correct_answer))
        .collect()
    };

    let graded = grade_answers(&req.answers, &keys);
    let total = graded.len();
    let correct = graded.iter().filter(|g| g.is_correct).count();
    let score = score_percentage(correct, total);

    if !graded.is_empty() {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO exam_answers (exam_id, question_id, selected_answer, is_correct) ",
        );
        query_builder.push_values(&graded, |mut row, answer| {
            row.push_bind(exam.id)
                .push_bind(answer.question_id)
                .push_bind(&answer.selected_answer)
                .push_bind(answer.is_correct);
        });
        query_builder.build().execute(&mut *tx).await?;
    }

    sqlx::query(
        r#"
        UPDATE exams
        SET is_completed = TRUE,
            end_time = NOW(),
            score = $1,
            total_questions = $2,
            correct_answers = $3
        WHERE id = $4
        "#,
    )
    .bind(score)
    .bind(total as i32)
    .bind(correct as i32)
    .bind(exam.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        exam_id = exam.id,
        user_id = user.id,
        total,
        correct,
        "Exam submitted"
    );

    Ok(SubmitExamResponse {
        exam_id: exam.id,
        score,
        total_questions: total as i32,
        correct_answers: correct as i32,
        percentage: round2(score),
    })
}

/// Returns the result of one of the user's exams.
///
/// Exams owned by other users are reported as not found.
pub async fn get_results(pool: &PgPool, user: &User, exam_id: i64) -> Result<ExamResult, AppError> {
    let exam = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE id = $1 AND user_id = $2"
    ))
    .bind(exam_id)
    .bind(user.id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    exam_result(&exam)
}

/// Lists the user's completed exams, most recently finished first.
pub async fn get_history(pool: &PgPool, user: &User) -> Result<Vec<Exam>, AppError> {
    let exams = sqlx::query_as::<_, Exam>(&format!(
        "SELECT {EXAM_COLUMNS} FROM exams WHERE user_id = $1 AND is_completed ORDER BY end_time DESC, id DESC"
    ))
    .bind(user.id)
    .fetch_all(pool)
    .await?;

    Ok(exams)
}
