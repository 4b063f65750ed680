// src/services/maintenance.rs
//
// Operator tasks: seeding the question pool, creating accounts directly,
// and clearing exams that were started but never submitted.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::OPTION_LABELS,
    error::AppError,
    models::{
        question::NewQuestion,
        user::{CreateUserRequest, User},
    },
    services::auth,
};

/// Built-in general-knowledge pool.
pub const QUESTION_BANK: [NewQuestion; 15] = [
    NewQuestion {
        question_text: "What is the capital of France?",
        options: ["London", "Paris", "Berlin", "Madrid"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "Which planet is known as the Red Planet?",
        options: ["Venus", "Mars", "Jupiter", "Saturn"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "What is the largest ocean on Earth?",
        options: ["Atlantic Ocean", "Indian Ocean", "Arctic Ocean", "Pacific Ocean"],
        correct_answer: "D",
    },
    NewQuestion {
        question_text: "Who wrote 'Romeo and Juliet'?",
        options: ["Charles Dickens", "William Shakespeare", "Jane Austen", "Mark Twain"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "What is the chemical symbol for gold?",
        options: ["Ag", "Au", "Fe", "Cu"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "Which programming language is known as the 'language of the web'?",
        options: ["Python", "Java", "JavaScript", "C++"],
        correct_answer: "C",
    },
    NewQuestion {
        question_text: "What year did World War II end?",
        options: ["1943", "1944", "1945", "1946"],
        correct_answer: "C",
    },
    NewQuestion {
        question_text: "What is the largest mammal in the world?",
        options: ["African Elephant", "Blue Whale", "Giraffe", "Hippopotamus"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "Which country is home to the kangaroo?",
        options: ["New Zealand", "South Africa", "Australia", "India"],
        correct_answer: "C",
    },
    NewQuestion {
        question_text: "What is the square root of 144?",
        options: ["10", "11", "12", "13"],
        correct_answer: "C",
    },
    NewQuestion {
        question_text: "Which element has the chemical symbol 'O'?",
        options: ["Osmium", "Oxygen", "Oganesson", "Gold"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "What is the main component of the sun?",
        options: ["Liquid Lava", "Molten Iron", "Hot Gases", "Solid Rock"],
        correct_answer: "C",
    },
    NewQuestion {
        question_text: "Which country has the largest population in the world?",
        options: ["India", "China", "United States", "Russia"],
        correct_answer: "B",
    },
    NewQuestion {
        question_text: "What is the speed of light?",
        options: ["299,792 km/s", "199,792 km/s", "399,792 km/s", "499,792 km/s"],
        correct_answer: "A",
    },
    NewQuestion {
        question_text: "Who painted the Mona Lisa?",
        options: ["Vincent van Gogh", "Pablo Picasso", "Leonardo da Vinci", "Michelangelo"],
        correct_answer: "C",
    },
];

/// Every correct answer must name one of the four option labels.
pub fn validate_answer_keys(questions: &[NewQuestion]) -> Result<(), AppError> {
    match questions
        .iter()
        .find(|q| !OPTION_LABELS.contains(&q.correct_answer))
    {
        Some(q) => Err(AppError::BadRequest(format!(
            "Invalid answer key '{}' for question '{}'",
            q.correct_answer, q.question_text
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded(usize),
    /// The table already held this many questions; nothing was inserted.
    Skipped(i64),
}

/// Inserts `questions` unless the pool already has content.
pub async fn seed_questions(
    pool: &PgPool,
    questions: &[NewQuestion],
) -> Result<SeedOutcome, AppError> {
    let mut tx = pool.begin().await?;

    // Serializes concurrent seeders so the pool is only filled once.
    sqlx::query("LOCK TABLE questions IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&mut *tx)
        .await?;

    if existing > 0 {
        tracing::info!("Database already contains {} questions. Skipping seed.", existing);
        return Ok(SeedOutcome::Skipped(existing));
    }
    if questions.is_empty() {
        return Ok(SeedOutcome::Seeded(0));
    }
    validate_answer_keys(questions)?;

    let mut query_builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO questions (question_text, option_a, option_b, option_c, option_d, correct_answer) ",
    );
    query_builder.push_values(questions, |mut row, q| {
        let [a, b, c, d] = q.options;
        row.push_bind(q.question_text)
            .push_bind(a)
            .push_bind(b)
            .push_bind(c)
            .push_bind(d)
            .push_bind(q.correct_answer);
    });
    query_builder.build().execute(&mut *tx).await?;

    tx.commit().await?;

    tracing::info!("Seeded {} questions.", questions.len());
    Ok(SeedOutcome::Seeded(questions.len()))
}

/// Creates an account directly, returning `None` if the username is taken.
pub async fn create_user(
    pool: &PgPool,
    req: &CreateUserRequest,
) -> Result<Option<User>, AppError> {
    if auth::find_by_username(pool, &req.username).await?.is_some() {
        tracing::info!("User '{}' already exists.", req.username);
        return Ok(None);
    }

    auth::register(pool, req).await.map(Some)
}

/// Deletes every incomplete exam (and its answers) belonging to `username`.
///
/// Returns the number of exams removed.
pub async fn clear_incomplete_exams(pool: &PgPool, username: &str) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;

    let user_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", username)))?;

    let answers = sqlx::query(
        r#"
        DELETE FROM exam_answers
        WHERE exam_id IN (SELECT id FROM exams WHERE user_id = $1 AND NOT is_completed)
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let exams = sqlx::query("DELETE FROM exams WHERE user_id = $1 AND NOT is_completed")
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    tracing::info!(
        username,
        exams_deleted = exams,
        answers_deleted = answers,
        "Cleared incomplete exams"
    );
    Ok(exams)
}
