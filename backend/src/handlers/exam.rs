// src/handlers/exam.rs
//
// Every handler here sits behind `auth_middleware`, which injects the
// authenticated `User`.

use axum::{
    Extension, Json,
    extract::State,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    models::{
        exam::{Exam, ExamResult, SubmitExamRequest, SubmitExamResponse},
        question::PublicQuestion,
        user::User,
    },
    services::exam,
};

/// Starts an exam and returns its questions without the correct answers.
#[utoipa::path(
    get,
    path = "/exams/start",
    tag = "exams",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Exam questions", body = [PublicQuestion]),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "An exam is already active"),
        (status = 500, description = "Not enough questions in database")
    )
)]
pub async fn start_exam(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<PublicQuestion>>, AppError> {
    let questions = exam::start_exam(&pool, &user).await?;
    Ok(Json(questions))
}

/// Submits answers for the active exam and grades them.
#[utoipa::path(
    post,
    path = "/exams/submit",
    tag = "exams",
    security(("bearer" = [])),
    request_body = SubmitExamRequest,
    responses(
        (status = 200, description = "Exam graded", body = SubmitExamResponse),
        (status = 400, description = "No active exam or invalid input"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn submit_exam(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    AppJson(req): AppJson<SubmitExamRequest>,
) -> Result<Json<SubmitExamResponse>, AppError> {
    req.validate()?;

    let outcome = exam::submit_exam(&pool, &user, &req).await?;
    Ok(Json(outcome))
}

/// Returns the result of a completed exam owned by the caller.
#[utoipa::path(
    get,
    path = "/exams/results/{exam_id}",
    tag = "exams",
    security(("bearer" = [])),
    params(("exam_id" = i64, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Exam result", body = ExamResult),
        (status = 400, description = "Exam not completed yet"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Exam not found")
    )
)]
pub async fn get_results(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
    AppPath(exam_id): AppPath<i64>,
) -> Result<Json<ExamResult>, AppError> {
    let result = exam::get_results(&pool, &user, exam_id).await?;
    Ok(Json(result))
}

/// Lists the caller's completed exams, newest first.
#[utoipa::path(
    get,
    path = "/exams/history",
    tag = "exams",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Completed exams", body = [Exam]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_history(
    State(pool): State<PgPool>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Exam>>, AppError> {
    let exams = exam::get_history(&pool, &user).await?;
    Ok(Json(exams))
}
