// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Represents the 'exams' table in the database.
/// One timed attempt: Active until submitted, then Completed for good.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Exam {
    pub id: i64,
    pub user_id: i64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub is_completed: bool,
    /// Percentage of graded answers that were correct (0 to 100).
    pub score: Option<f64>,
    pub total_questions: i32,
    pub correct_answers: i32,
}

/// Represents the 'exam_answers' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAnswer {
    pub id: i64,
    pub exam_id: i64,
    pub question_id: i64,
    pub selected_answer: String,
    pub is_correct: Option<bool>,
}

/// A single answer as submitted by the client.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AnswerSubmission {
    pub question_id: i64,
    #[validate(length(min = 1, max = 16))]
    pub selected_answer: String,
}

/// DTO for submitting an exam attempt.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct SubmitExamRequest {
    #[validate(length(max = 100), nested)]
    pub answers: Vec<AnswerSubmission>,
}

/// Outcome returned right after a submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SubmitExamResponse {
    pub exam_id: i64,
    pub score: f64,
    pub total_questions: i32,
    pub correct_answers: i32,
    /// Score rounded to two decimals.
    pub percentage: f64,
}

/// Result view of a completed exam.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExamResult {
    pub exam_id: i64,
    pub score: f64,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub percentage: f64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}
