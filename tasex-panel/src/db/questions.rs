//! Panel questions
//!
//! Questions can be added or removed only while the panel is PLANNED. The
//! status check is repeated inside the write statement so a concurrent
//! status change cannot slip a question in.

use serde::Deserialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tasex_common::db::{PanelQuestion, PanelStatus, Scale};
use tasex_common::{Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

use super::{catalog, is_unique_violation, panels, parse_uuid};
use crate::lifecycle;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPanelQuestion {
    pub question_text: String,
    pub scale_id: i64,
    /// Defaults to after the last existing question
    #[serde(default)]
    pub position: Option<i64>,
}

/// Panel question together with its answer scale
#[derive(Debug, Clone)]
pub struct QuestionWithScale {
    pub question: PanelQuestion,
    pub scale: Scale,
}

pub async fn add_panel_question(
    pool: &SqlitePool,
    panel_id: Uuid,
    new: &NewPanelQuestion,
) -> Result<PanelQuestion> {
    let panel = panels::get_panel(pool, panel_id).await?;
    if let Err(e) = lifecycle::ensure_questions_editable(panel.status, "add") {
        warn!(panel_id = %panel_id, status = %panel.status, "Rejected question add");
        return Err(e);
    }
    catalog::get_scale(pool, new.scale_id).await?;

    let position = match new.position {
        Some(position) => position,
        None => {
            let max: Option<i64> =
                sqlx::query_scalar("SELECT MAX(position) FROM panel_questions WHERE panel_id = ?")
                    .bind(panel_id.to_string())
                    .fetch_one(pool)
                    .await?;
            max.map_or(0, |m| m + 1)
        }
    };

    let result = sqlx::query(
        r#"
        INSERT INTO panel_questions (panel_id, position, question_text, scale_id)
        SELECT ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM panels WHERE id = ? AND status = ?)
        "#,
    )
    .bind(panel_id.to_string())
    .bind(position)
    .bind(&new.question_text)
    .bind(new.scale_id)
    .bind(panel_id.to_string())
    .bind(PanelStatus::Planned.as_str())
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::InvalidInput(format!("Position {} is already taken", position))
        } else {
            Error::Database(e)
        }
    })?;

    if result.rows_affected() == 0 {
        return Err(Error::Lifecycle(
            "Cannot add questions once panel is started".to_string(),
        ));
    }

    info!(panel_id = %panel_id, position, "Added panel question");

    Ok(PanelQuestion {
        id: result.last_insert_rowid(),
        panel_id,
        position,
        question_text: new.question_text.clone(),
        scale_id: new.scale_id,
    })
}

pub async fn delete_panel_question(pool: &SqlitePool, panel_id: Uuid, question_id: i64) -> Result<()> {
    let panel = panels::get_panel(pool, panel_id).await?;
    if let Err(e) = lifecycle::ensure_questions_editable(panel.status, "delete") {
        warn!(panel_id = %panel_id, status = %panel.status, "Rejected question delete");
        return Err(e);
    }

    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM panel_questions WHERE id = ? AND panel_id = ?")
            .bind(question_id)
            .bind(panel_id.to_string())
            .fetch_optional(pool)
            .await?;
    if exists.is_none() {
        return Err(Error::NotFound(format!("Question {} on panel {}", question_id, panel_id)));
    }

    let affected = sqlx::query(
        r#"
        DELETE FROM panel_questions
        WHERE id = ? AND panel_id = ?
          AND EXISTS (SELECT 1 FROM panels WHERE id = ? AND status = ?)
        "#,
    )
    .bind(question_id)
    .bind(panel_id.to_string())
    .bind(panel_id.to_string())
    .bind(PanelStatus::Planned.as_str())
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(Error::Lifecycle(
            "Cannot delete questions once panel is started".to_string(),
        ));
    }

    info!(panel_id = %panel_id, question_id, "Deleted panel question");
    Ok(())
}

/// Questions of a panel in presentation order
pub async fn list_panel_questions(pool: &SqlitePool, panel_id: Uuid) -> Result<Vec<PanelQuestion>> {
    let rows = sqlx::query(
        r#"
        SELECT id, panel_id, position, question_text, scale_id
        FROM panel_questions
        WHERE panel_id = ?
        ORDER BY position, question_text
        "#,
    )
    .bind(panel_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let panel_id: String = row.try_get("panel_id")?;
            Ok(PanelQuestion {
                id: row.try_get("id")?,
                panel_id: parse_uuid(&panel_id)?,
                position: row.try_get("position")?,
                question_text: row.try_get("question_text")?,
                scale_id: row.try_get("scale_id")?,
            })
        })
        .collect()
}

/// Questions of a panel with their scales loaded
pub async fn list_questions_with_scales(
    pool: &SqlitePool,
    panel_id: Uuid,
) -> Result<Vec<QuestionWithScale>> {
    let questions = list_panel_questions(pool, panel_id).await?;

    let mut scales: HashMap<i64, Scale> = HashMap::new();
    for question in &questions {
        if !scales.contains_key(&question.scale_id) {
            let scale = catalog::get_scale(pool, question.scale_id).await?;
            scales.insert(question.scale_id, scale);
        }
    }

    questions
        .into_iter()
        .map(|question| {
            let scale = scales.get(&question.scale_id).cloned().ok_or_else(|| {
                Error::Invariant(format!("Scale {} vanished", question.scale_id))
            })?;
            Ok(QuestionWithScale { question, scale })
        })
        .collect()
}
