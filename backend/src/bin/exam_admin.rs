// src/bin/exam_admin.rs

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use exam_backend::{
    db,
    models::user::CreateUserRequest,
    services::maintenance::{self, QUESTION_BANK, SeedOutcome},
};
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Maintenance commands for the exam backend database.
#[derive(Parser)]
#[command(name = "exam-admin", version)]
struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed the built-in question pool if the table is empty.
    SeedQuestions,
    /// Create a user account directly.
    CreateUser {
        #[arg(long, default_value = "test@example.com")]
        email: String,
        #[arg(long, default_value = "testuser")]
        username: String,
        #[arg(long, default_value = "testpass123")]
        password: String,
    },
    /// Delete a user's incomplete exams and their answers.
    ClearIncomplete {
        #[arg(long, default_value = "testuser")]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let pool = db::connect_with_retry(&cli.database_url).await?;
    db::migrate(&pool).await?;

    match cli.command {
        Command::SeedQuestions => match maintenance::seed_questions(&pool, &QUESTION_BANK).await? {
            SeedOutcome::Seeded(n) => tracing::info!("Successfully seeded {} questions", n),
            SeedOutcome::Skipped(n) => tracing::info!("{} questions already present, nothing to do", n),
        },
        Command::CreateUser {
            email,
            username,
            password,
        } => {
            let req = CreateUserRequest {
                email,
                username,
                password,
            };
            req.validate()?;

            match maintenance::create_user(&pool, &req).await? {
                Some(user) => tracing::info!(
                    "Created user '{}' <{}> with id {}",
                    user.username,
                    user.email,
                    user.id
                ),
                None => tracing::info!("User '{}' already exists", req.username),
            }
        }
        Command::ClearIncomplete { username } => {
            let removed = maintenance::clear_incomplete_exams(&pool, &username).await?;
            tracing::info!("Removed {} incomplete exam(s) for '{}'", removed, username);
        }
    }

    pool.close().await;
    Ok(())
}
