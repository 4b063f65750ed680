// tests/api_tests.rs
//
// Full-flow tests against a real Postgres taken from DATABASE_URL.
// Each test is skipped when DATABASE_URL is not set.

use std::collections::{HashMap, HashSet};

use exam_backend::{
    config::Config,
    models::exam::ExamAnswer,
    routes,
    services::maintenance::{self, QUESTION_BANK},
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};

struct TestApp {
    address: String,
    pool: PgPool,
    client: reqwest::Client,
}

/// Spawns the app on a random port with a migrated, seeded database.
/// Returns `None` when no database is configured.
async fn spawn_app() -> Option<TestApp> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    maintenance::seed_questions(&pool, &QUESTION_BANK)
        .await
        .expect("Failed to seed questions");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        allowed_origins: vec![],
        seed_questions: false,
    };

    let app = routes::create_router(AppState {
        pool: pool.clone(),
        config,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    })
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..10])
}

impl TestApp {
    async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/register", self.address))
            .json(&json!({
                "email": format!("{}@example.com", username),
                "username": username,
                "password": password
            }))
            .send()
            .await
            .expect("Register failed")
    }

    async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/login", self.address))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login failed")
    }

    /// Registers a fresh user and returns its name and bearer token.
    async fn signed_in_user(&self) -> (String, String) {
        let username = unique_name("u");
        let response = self.register(&username, "password123").await;
        assert_eq!(response.status().as_u16(), 201);

        let body: Value = self.login(&username, "password123").await.json().await.unwrap();
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().expect("Token not found").to_string();
        (username, token)
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Request failed")
    }

    async fn submit(&self, token: &str, answers: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/exams/submit", self.address))
            .bearer_auth(token)
            .json(&json!({ "answers": answers }))
            .send()
            .await
            .expect("Submit failed")
    }

    async fn answer_keys(&self, ids: &[i64]) -> HashMap<i64, String> {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT id, correct_answer FROM questions WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .unwrap()
        .into_iter()
        .collect()
    }
}

fn wrong_answer(correct: &str) -> &'static str {
    if correct == "A" { "B" } else { "A" }
}

#[tokio::test]
async fn register_and_login_errors() {
    let Some(app) = spawn_app().await else { return };
    let username = unique_name("dup");

    assert_eq!(app.register(&username, "password123").await.status().as_u16(), 201);

    // Same username, different email.
    let response = app
        .client
        .post(format!("{}/auth/register", app.address))
        .json(&json!({
            "email": format!("other_{}@example.com", username),
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    assert_eq!(app.login(&username, "wrong-password").await.status().as_u16(), 401);
    assert_eq!(app.login(&unique_name("ghost"), "password123").await.status().as_u16(), 401);
}

#[tokio::test]
async fn start_returns_ten_distinct_questions_without_answers() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let response = app.get("/exams/start", &token).await;
    assert_eq!(response.status().as_u16(), 200);
    let questions: Vec<Value> = response.json().await.unwrap();

    assert_eq!(questions.len(), 10);
    let ids: HashSet<i64> = questions.iter().map(|q| q["id"].as_i64().unwrap()).collect();
    assert_eq!(ids.len(), 10);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));
    assert!(questions.iter().all(|q| q["option_d"].is_string()));

    let id_list: Vec<i64> = ids.into_iter().collect();
    assert_eq!(app.answer_keys(&id_list).await.len(), 10);

    // A second start while the first is open is a conflict.
    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 409);
}

#[tokio::test]
async fn seven_of_ten_scores_seventy() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let questions: Vec<Value> = app.get("/exams/start", &token).await.json().await.unwrap();
    let ids: Vec<i64> = questions.iter().map(|q| q["id"].as_i64().unwrap()).collect();
    let keys = app.answer_keys(&ids).await;

    let answers: Vec<Value> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let correct = keys[id].as_str();
            let selected = if i < 7 { correct } else { wrong_answer(correct) };
            json!({ "question_id": id, "selected_answer": selected })
        })
        .collect();

    let response = app.submit(&token, Value::from(answers)).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 70.0);
    assert_eq!(result["percentage"], 70.0);
    assert_eq!(result["correct_answers"], 7);
    assert_eq!(result["total_questions"], 10);

    let exam_id = result["exam_id"].as_i64().unwrap();
    let (is_completed, has_end_time): (bool, bool) =
        sqlx::query_as("SELECT is_completed, end_time IS NOT NULL FROM exams WHERE id = $1")
            .bind(exam_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert!(is_completed);
    assert!(has_end_time);

    let stored = sqlx::query_as::<_, ExamAnswer>(
        "SELECT id, exam_id, question_id, selected_answer, is_correct FROM exam_answers WHERE exam_id = $1",
    )
    .bind(exam_id)
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(stored.len(), 10);
    assert_eq!(stored.iter().filter(|a| a.is_correct == Some(true)).count(), 7);

    let results: Value = app
        .get(&format!("/exams/results/{}", exam_id), &token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(results["percentage"], 70.0);
    assert!(results["end_time"].is_string());

    // The exam is closed: a second submission has nothing to attach to.
    assert_eq!(app.submit(&token, json!([])).await.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_question_is_excluded_from_totals() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let questions: Vec<Value> = app.get("/exams/start", &token).await.json().await.unwrap();
    let first = questions[0]["id"].as_i64().unwrap();
    let keys = app.answer_keys(&[first]).await;

    let response = app
        .submit(
            &token,
            json!([
                { "question_id": first, "selected_answer": keys[&first] },
                { "question_id": i64::MAX, "selected_answer": "A" }
            ]),
        )
        .await;
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["total_questions"], 1);
    assert_eq!(result["correct_answers"], 1);
    assert_eq!(result["score"], 100.0);
}

#[tokio::test]
async fn empty_submission_scores_zero() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 200);

    let response = app.submit(&token, json!([])).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 0.0);
    assert_eq!(result["total_questions"], 0);
}

#[tokio::test]
async fn submit_without_active_exam_is_bad_request() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let response = app.submit(&token, json!([])).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn results_require_completion_and_ownership() {
    let Some(app) = spawn_app().await else { return };
    let (owner_name, owner) = app.signed_in_user().await;
    let (_, stranger) = app.signed_in_user().await;

    app.get("/exams/start", &owner).await;
    let exam_id: i64 = sqlx::query_scalar(
        "SELECT e.id FROM exams e JOIN users u ON u.id = e.user_id \
         WHERE u.username = $1 AND NOT e.is_completed",
    )
    .bind(&owner_name)
    .fetch_one(&app.pool)
    .await
    .unwrap();

    // Not someone else's to see, completed or not.
    let response = app.get(&format!("/exams/results/{}", exam_id), &stranger).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.get(&format!("/exams/results/{}", exam_id), &owner).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Exam not completed yet");

    assert_eq!(app.get("/exams/results/0", &owner).await.status().as_u16(), 404);
}

#[tokio::test]
async fn history_lists_completed_exams_newest_first() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let mut submitted = Vec::new();
    for _ in 0..2 {
        assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 200);
        let result: Value = app.submit(&token, json!([])).await.json().await.unwrap();
        submitted.push(result["exam_id"].as_i64().unwrap());
    }
    // An open exam never shows up in history.
    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 200);

    let history: Vec<Value> = app.get("/exams/history", &token).await.json().await.unwrap();
    let ids: Vec<i64> = history.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![submitted[1], submitted[0]]);
    assert!(history.iter().all(|e| e["is_completed"] == true));
}

#[tokio::test]
async fn clearing_incomplete_exams_allows_a_fresh_start() {
    let Some(app) = spawn_app().await else { return };
    let username = unique_name("clr");
    app.register(&username, "password123").await;
    let login: Value = app.login(&username, "password123").await.json().await.unwrap();
    let token = login["access_token"].as_str().unwrap().to_string();

    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 200);
    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 409);

    let removed = maintenance::clear_incomplete_exams(&app.pool, &username)
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert_eq!(app.get("/exams/start", &token).await.status().as_u16(), 200);
}

#[tokio::test]
async fn token_for_deleted_user_is_rejected() {
    let Some(app) = spawn_app().await else { return };
    let username = unique_name("gone");
    app.register(&username, "password123").await;
    let login: Value = app.login(&username, "password123").await.json().await.unwrap();
    let token = login["access_token"].as_str().unwrap().to_string();

    sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(&username)
        .execute(&app.pool)
        .await
        .unwrap();

    assert_eq!(app.get("/exams/history", &token).await.status().as_u16(), 401);
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let Some(app) = spawn_app().await else { return };
    let username = unique_name("mail");
    assert_eq!(app.register(&username, "password123").await.status().as_u16(), 201);

    let response = app
        .client
        .post(format!("{}/auth/register", app.address))
        .json(&json!({
            "email": format!("{}@example.com", username),
            "username": unique_name("other"),
            "password": "password123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Email"));
}

#[tokio::test]
async fn concurrent_starts_open_a_single_exam() {
    let Some(app) = spawn_app().await else { return };
    let (username, token) = app.signed_in_user().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = app.client.clone();
            let url = format!("{}/exams/start", app.address);
            let token = token.clone();
            tokio::spawn(async move {
                client
                    .get(url)
                    .bearer_auth(token)
                    .send()
                    .await
                    .unwrap()
                    .status()
                    .as_u16()
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses.sort_unstable();

    assert_eq!(statuses[0], 200);
    assert!(statuses[1..].iter().all(|s| *s == 409), "{statuses:?}");

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exams e JOIN users u ON u.id = e.user_id \
         WHERE u.username = $1 AND NOT e.is_completed",
    )
    .bind(&username)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn non_numeric_exam_id_is_json_bad_request() {
    let Some(app) = spawn_app().await else { return };
    let (_, token) = app.signed_in_user().await;

    let response = app.get("/exams/results/abc", &token).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}
