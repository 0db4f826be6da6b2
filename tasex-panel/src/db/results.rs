//! Results and answers
//!
//! Uniqueness of results per sample set and of answers per (result,
//! question) is enforced by the schema; these functions translate the
//! resulting constraint failures into domain errors.

use chrono::Utc;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use tasex_common::db::{Answer, TastingResult};
use tasex_common::{Error, Result};
use uuid::Uuid;

use super::is_unique_violation;

/// Result and correct-result counts for one panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCounts {
    pub total: u32,
    pub correct: u32,
}

/// Number of correct results that chose `answer_code` for a question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerCount {
    pub question_id: i64,
    pub answer_code: String,
    pub count: u32,
}

pub async fn insert_result<'e, E>(
    executor: E,
    sample_set_id: i64,
    odd_sample_id: i64,
    is_correct: bool,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO results (sample_set_id, odd_sample_id, is_correct, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(sample_set_id)
    .bind(odd_sample_id)
    .bind(is_correct)
    .bind(Utc::now())
    .execute(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::DuplicateResult { sample_set_id }
        } else {
            Error::Database(e)
        }
    })?
    .last_insert_rowid();

    Ok(id)
}

/// Set `is_used`; the flag never goes back to false
pub async fn mark_sample_set_used<'e, E>(executor: E, sample_set_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE sample_sets SET is_used = 1 WHERE id = ?")
        .bind(sample_set_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn get_result<'e, E>(executor: E, id: i64) -> Result<TastingResult>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT id, sample_set_id, odd_sample_id, is_correct FROM results WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Result {}", id)))?;

    Ok(TastingResult {
        id: row.try_get("id")?,
        sample_set_id: row.try_get("sample_set_id")?,
        odd_sample_id: row.try_get("odd_sample_id")?,
        is_correct: row.try_get("is_correct")?,
    })
}

/// Panel a result belongs to, through its sample set
pub async fn result_panel_id<'e, E>(executor: E, result_id: i64) -> Result<Uuid>
where
    E: Executor<'e, Database = Sqlite>,
{
    let panel_id: String = sqlx::query_scalar(
        r#"
        SELECT ss.panel_id
        FROM results r
        JOIN sample_sets ss ON ss.id = r.sample_set_id
        WHERE r.id = ?
        "#,
    )
    .bind(result_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Result {}", result_id)))?;

    super::parse_uuid(&panel_id)
}

pub async fn answers_exist<'e, E>(executor: E, result_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE result_id = ?")
        .bind(result_id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

pub async fn insert_answer<'e, E>(
    executor: E,
    result_id: i64,
    question_id: i64,
    answer_code: &str,
    answer_text: &str,
) -> Result<Answer>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO answers (question_id, result_id, answer_code, answer_text)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(question_id)
    .bind(result_id)
    .bind(answer_code)
    .bind(answer_text)
    .execute(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::AnswersAlreadyRecorded { result_id }
        } else {
            Error::Database(e)
        }
    })?
    .last_insert_rowid();

    Ok(Answer {
        id,
        question_id,
        result_id,
        answer_code: answer_code.to_string(),
        answer_text: answer_text.to_string(),
    })
}

pub async fn list_answers(pool: &SqlitePool, result_id: i64) -> Result<Vec<Answer>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.question_id, a.result_id, a.answer_code, a.answer_text
        FROM answers a
        JOIN panel_questions pq ON pq.id = a.question_id
        WHERE a.result_id = ?
        ORDER BY pq.position
        "#,
    )
    .bind(result_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Answer {
                id: row.try_get("id")?,
                question_id: row.try_get("question_id")?,
                result_id: row.try_get("result_id")?,
                answer_code: row.try_get("answer_code")?,
                answer_text: row.try_get("answer_text")?,
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
        .map_err(Error::from)
}

pub async fn panel_result_counts(pool: &SqlitePool, panel_id: Uuid) -> Result<ResultCounts> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(r.id) AS total,
               COALESCE(SUM(CASE WHEN r.is_correct THEN 1 ELSE 0 END), 0) AS correct
        FROM results r
        JOIN sample_sets ss ON ss.id = r.sample_set_id
        WHERE ss.panel_id = ?
        "#,
    )
    .bind(panel_id.to_string())
    .fetch_one(pool)
    .await?;

    let total: i64 = row.try_get("total")?;
    let correct: i64 = row.try_get("correct")?;

    Ok(ResultCounts {
        total: total as u32,
        correct: correct as u32,
    })
}

/// Answer counts per question and scale code, over correct results only
pub async fn correct_answer_counts(pool: &SqlitePool, panel_id: Uuid) -> Result<Vec<AnswerCount>> {
    let rows = sqlx::query(
        r#"
        SELECT a.question_id, a.answer_code, COUNT(*) AS answer_count
        FROM answers a
        JOIN results r ON r.id = a.result_id
        JOIN sample_sets ss ON ss.id = r.sample_set_id
        WHERE ss.panel_id = ? AND r.is_correct = 1
        GROUP BY a.question_id, a.answer_code
        "#,
    )
    .bind(panel_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let count: i64 = row.try_get("answer_count")?;
            Ok(AnswerCount {
                question_id: row.try_get("question_id")?,
                answer_code: row.try_get("answer_code")?,
                count: count as u32,
            })
        })
        .collect()
}
