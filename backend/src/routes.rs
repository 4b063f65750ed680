// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{
    handlers::{auth, exam, health},
    models,
    state::AppState,
    utils::jwt::auth_middleware,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Exam Taking Application",
        description = "Exam-taking backend with JWT authentication"
    ),
    paths(
        health::root,
        health::health_check,
        auth::register,
        auth::login,
        exam::start_exam,
        exam::submit_exam,
        exam::get_results,
        exam::get_history,
    ),
    components(schemas(
        models::user::User,
        models::user::CreateUserRequest,
        models::user::LoginRequest,
        models::user::TokenResponse,
        models::question::PublicQuestion,
        models::exam::Exam,
        models::exam::AnswerSubmission,
        models::exam::SubmitExamRequest,
        models::exam::SubmitExamResponse,
        models::exam::ExamResult,
        health::WelcomeResponse,
        health::HealthResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "authentication"),
        (name = "exams"),
        (name = "health")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * `/auth` is public, `/exams` requires a bearer token.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let exam_routes = Router::new()
        .route("/start", get(exam::start_exam))
        .route("/submit", post(exam::submit_exam))
        .route("/results/{exam_id}", get(exam::get_results))
        .route("/history", get(exam::get_history))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/openapi.json", get(openapi_json))
        .nest("/auth", auth_routes)
        .nest("/exams", exam_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
