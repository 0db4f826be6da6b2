//! Reference data: products, scales, question templates, experiments
//!
//! Created by the panel owner and read-only as far as the tasting flow is
//! concerned.

use chrono::Utc;
use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use tasex_common::db::{begin_write, Experiment, Product, Question, QuestionSet, Scale, ScalePoint};
use tasex_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub brew_id: String,
    pub internal_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScalePoint {
    pub code: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewScale {
    pub name: String,
    pub points: Vec<NewScalePoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuestion {
    pub question_text: String,
    pub scale_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuestionSet {
    pub name: String,
    /// Question ids in presentation order
    pub question_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExperiment {
    pub internal_title: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub product_a_id: i64,
    pub product_b_id: i64,
    #[serde(default)]
    pub question_set_id: Option<i64>,
}

pub async fn create_product(pool: &SqlitePool, new: &NewProduct) -> Result<Product> {
    let id = sqlx::query(
        "INSERT INTO products (brew_id, internal_name, name, description) VALUES (?, ?, ?, ?)",
    )
    .bind(&new.brew_id)
    .bind(&new.internal_name)
    .bind(&new.name)
    .bind(&new.description)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Product {
        id,
        brew_id: new.brew_id.clone(),
        internal_name: new.internal_name.clone(),
        name: new.name.clone(),
        description: new.description.clone(),
    })
}

pub async fn get_product(pool: &SqlitePool, id: i64) -> Result<Product> {
    let row = sqlx::query(
        "SELECT id, brew_id, internal_name, name, description FROM products WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Product {}", id)))?;

    Ok(Product {
        id: row.try_get("id")?,
        brew_id: row.try_get("brew_id")?,
        internal_name: row.try_get("internal_name")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

/// Create a scale together with its points
pub async fn create_scale(pool: &SqlitePool, new: &NewScale) -> Result<Scale> {
    if new.points.is_empty() {
        return Err(Error::InvalidInput("A scale needs at least one point".to_string()));
    }

    let mut tx = begin_write(pool).await?;

    let scale_id = sqlx::query("INSERT INTO scales (name) VALUES (?)")
        .bind(&new.name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let mut points = Vec::with_capacity(new.points.len());
    for point in &new.points {
        let id = sqlx::query("INSERT INTO scale_points (scale_id, code, text) VALUES (?, ?, ?)")
            .bind(scale_id)
            .bind(&point.code)
            .bind(&point.text)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if super::is_unique_violation(&e) {
                    Error::InvalidInput(format!("Duplicate scale code '{}'", point.code))
                } else {
                    Error::Database(e)
                }
            })?
            .last_insert_rowid();

        points.push(ScalePoint {
            id,
            scale_id,
            code: point.code.clone(),
            text: point.text.clone(),
        });
    }

    tx.commit().await?;

    Ok(Scale {
        id: scale_id,
        name: new.name.clone(),
        points,
    })
}

pub async fn get_scale(pool: &SqlitePool, id: i64) -> Result<Scale> {
    let name: String = sqlx::query_scalar("SELECT name FROM scales WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Scale {}", id)))?;

    let rows = sqlx::query("SELECT id, code, text FROM scale_points WHERE scale_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(pool)
        .await?;

    let points = rows
        .iter()
        .map(|row| {
            Ok(ScalePoint {
                id: row.try_get("id")?,
                scale_id: id,
                code: row.try_get("code")?,
                text: row.try_get("text")?,
            })
        })
        .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

    Ok(Scale { id, name, points })
}

pub async fn create_question(pool: &SqlitePool, new: &NewQuestion) -> Result<Question> {
    // Fails with NotFound before touching the table
    get_scale(pool, new.scale_id).await?;

    let id = sqlx::query("INSERT INTO questions (question_text, scale_id) VALUES (?, ?)")
        .bind(&new.question_text)
        .bind(new.scale_id)
        .execute(pool)
        .await?
        .last_insert_rowid();

    Ok(Question {
        id,
        question_text: new.question_text.clone(),
        scale_id: new.scale_id,
    })
}

/// Create an ordered question set; positions follow the given order
pub async fn create_question_set(pool: &SqlitePool, new: &NewQuestionSet) -> Result<QuestionSet> {
    let mut tx = begin_write(pool).await?;

    let set_id = sqlx::query("INSERT INTO question_sets (name) VALUES (?)")
        .bind(&new.name)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (position, question_id) in new.question_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO question_set_items (question_set_id, question_id, position) VALUES (?, ?, ?)",
        )
        .bind(set_id)
        .bind(question_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                Error::InvalidInput(format!("Question {} listed twice", question_id))
            } else {
                Error::Database(e)
            }
        })?;
    }

    tx.commit().await?;

    Ok(QuestionSet {
        id: set_id,
        name: new.name.clone(),
        question_ids: new.question_ids.clone(),
    })
}

pub async fn create_experiment(pool: &SqlitePool, new: &NewExperiment) -> Result<Experiment> {
    if new.product_a_id == new.product_b_id {
        return Err(Error::InvalidInput(
            "product_A and product_B must be different products".to_string(),
        ));
    }
    get_product(pool, new.product_a_id).await?;
    get_product(pool, new.product_b_id).await?;

    let experiment = Experiment {
        id: Uuid::new_v4(),
        internal_title: new.internal_title.clone(),
        title: new.title.clone(),
        description: new.description.clone(),
        product_a_id: new.product_a_id,
        product_b_id: new.product_b_id,
        question_set_id: new.question_set_id,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO experiments (
            id, internal_title, title, description,
            product_a_id, product_b_id, question_set_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(experiment.id.to_string())
    .bind(&experiment.internal_title)
    .bind(&experiment.title)
    .bind(&experiment.description)
    .bind(experiment.product_a_id)
    .bind(experiment.product_b_id)
    .bind(experiment.question_set_id)
    .bind(experiment.created_at)
    .execute(pool)
    .await?;

    Ok(experiment)
}

pub async fn get_experiment(pool: &SqlitePool, id: Uuid) -> Result<Experiment> {
    let row = sqlx::query(
        r#"
        SELECT id, internal_title, title, description,
               product_a_id, product_b_id, question_set_id, created_at
        FROM experiments
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Experiment {}", id)))?;

    let id: String = row.try_get("id")?;

    Ok(Experiment {
        id: parse_uuid(&id)?,
        internal_title: row.try_get("internal_title")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        product_a_id: row.try_get("product_a_id")?,
        product_b_id: row.try_get("product_b_id")?,
        question_set_id: row.try_get("question_set_id")?,
        created_at: row.try_get("created_at")?,
    })
}
