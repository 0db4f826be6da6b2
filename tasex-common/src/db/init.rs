//! Database initialization
//!
//! Creates the database on first run and applies the idempotent schema.
//! Uniqueness rules the panel flow depends on live here as constraints:
//! - `samples.code` is unique system-wide
//! - `results.sample_set_id` is unique (one verdict per kit)
//! - `answers (result_id, question_id)` is unique

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-connection settings: every pooled connection must enforce FKs
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Begin a transaction that holds the write lock from its first statement
///
/// A deferred transaction that reads before it writes fails with
/// SQLITE_BUSY_SNAPSHOT under WAL once another writer commits in between,
/// and `busy_timeout` does not retry that code. Waiting for the lock up
/// front lets constraint violations surface as their own errors.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Apply the full schema (safe to call repeatedly)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_products_table(pool).await?;
    create_scales_tables(pool).await?;
    create_question_template_tables(pool).await?;
    create_experiments_table(pool).await?;
    create_panels_table(pool).await?;
    create_sample_tables(pool).await?;
    create_panel_questions_table(pool).await?;
    create_results_table(pool).await?;
    create_answers_table(pool).await?;
    Ok(())
}

/// Stores runtime key-value settings
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_products_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            brew_id TEXT NOT NULL,
            internal_name TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scales_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scale_points (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scale_id INTEGER NOT NULL REFERENCES scales(id) ON DELETE CASCADE,
            code TEXT NOT NULL,
            text TEXT NOT NULL,
            UNIQUE (scale_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_question_template_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_text TEXT NOT NULL,
            scale_id INTEGER NOT NULL REFERENCES scales(id) ON DELETE RESTRICT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS question_set_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_set_id INTEGER NOT NULL REFERENCES question_sets(id) ON DELETE CASCADE,
            question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            UNIQUE (question_set_id, question_id),
            UNIQUE (question_set_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_experiments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS experiments (
            id TEXT PRIMARY KEY,
            internal_title TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            product_a_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            product_b_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            question_set_id INTEGER REFERENCES question_sets(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            CHECK (product_a_id <> product_b_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_panels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS panels (
            id TEXT PRIMARY KEY,
            experiment_id TEXT NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
            description TEXT NOT NULL DEFAULT '',
            planned_panelists INTEGER NOT NULL CHECK (planned_panelists >= 0),
            show_exp_description TEXT NOT NULL DEFAULT 'NO',
            status TEXT NOT NULL DEFAULT 'PLANNED',
            closed_at TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sample_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sample_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            panel_id TEXT NOT NULL REFERENCES panels(id) ON DELETE CASCADE,
            is_used INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sample_set_id INTEGER NOT NULL REFERENCES sample_sets(id) ON DELETE CASCADE,
            product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            code INTEGER NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_sample_set ON samples(sample_set_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sample_sets_panel ON sample_sets(panel_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_panel_questions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS panel_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            panel_id TEXT NOT NULL REFERENCES panels(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            question_text TEXT NOT NULL,
            scale_id INTEGER NOT NULL REFERENCES scales(id) ON DELETE RESTRICT,
            UNIQUE (panel_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sample_set_id INTEGER NOT NULL UNIQUE REFERENCES sample_sets(id) ON DELETE CASCADE,
            odd_sample_id INTEGER NOT NULL REFERENCES samples(id) ON DELETE CASCADE,
            is_correct INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_answers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL REFERENCES panel_questions(id) ON DELETE CASCADE,
            result_id INTEGER NOT NULL REFERENCES results(id) ON DELETE CASCADE,
            answer_code TEXT NOT NULL,
            answer_text TEXT NOT NULL,
            UNIQUE (result_id, question_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
