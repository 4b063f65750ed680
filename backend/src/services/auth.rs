// src/services/auth.rs

use sqlx::PgPool;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation, violated_constraint},
    models::user::{CreateUserRequest, LoginRequest, TokenResponse, User},
    utils::{
        hash::{hash_password, verify_against_dummy, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

const USER_COLUMNS: &str = "id, email, username, hashed_password, created_at";

/// Maps a failed user insert onto a Conflict when a unique key clashed.
fn map_user_insert_error(err: sqlx::Error, email: &str, username: &str) -> AppError {
    if !is_unique_violation(&err) {
        tracing::error!("Failed to register user: {:?}", err);
        return AppError::from(err);
    }
    match violated_constraint(&err) {
        Some(c) if c.contains("email") => {
            AppError::Conflict(format!("Email '{}' is already registered", email))
        }
        _ => AppError::Conflict(format!("Username '{}' already exists", username)),
    }
}

/// Creates a user with an Argon2 password hash.
///
/// Fails with `Conflict` if the username or email is already taken.
pub async fn register(pool: &PgPool, req: &CreateUserRequest) -> Result<User, AppError> {
    let hashed_password = hash_password(&req.password)?;

    let mut tx = pool.begin().await?;

    let taken: Option<(String, String)> =
        sqlx::query_as("SELECT email, username FROM users WHERE username = $1 OR email = $2 LIMIT 1")
            .bind(&req.username)
            .bind(&req.email)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some((email, _)) = taken {
        return Err(if email == req.email {
            AppError::Conflict(format!("Email '{}' is already registered", req.email))
        } else {
            AppError::Conflict(format!("Username '{}' already exists", req.username))
        });
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, username, hashed_password) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
    ))
    .bind(&req.email)
    .bind(&req.username)
    .bind(&hashed_password)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_user_insert_error(e, &req.email, &req.username))?;

    tx.commit().await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    Ok(user)
}

pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Verifies credentials and issues a bearer token with the username as subject.
///
/// Unknown users and wrong passwords produce the same `AuthError`.
pub async fn login(
    pool: &PgPool,
    config: &Config,
    req: &LoginRequest,
) -> Result<TokenResponse, AppError> {
    let invalid = || AppError::AuthError("Incorrect username or password".to_string());

    let Some(user) = find_by_username(pool, &req.username).await? else {
        // Same Argon2 cost as a real mismatch.
        verify_against_dummy(&req.password);
        return Err(invalid());
    };

    if !verify_password(&req.password, &user.hashed_password)? {
        tracing::info!(username = %req.username, "Login rejected");
        return Err(invalid());
    }

    let token = sign_jwt(&user.username, &config.jwt_secret, config.jwt_expiration)?;
    Ok(TokenResponse::bearer(token))
}

/// Resolves validated claims to a stored user.
///
/// Fails with `AuthError` if the subject no longer exists.
pub async fn authenticate(pool: &PgPool, claims: &Claims) -> Result<User, AppError> {
    find_by_username(pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::AuthError("Could not validate credentials".to_string()))
}
