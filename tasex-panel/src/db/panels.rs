//! Panel creation and owner updates
//!
//! Creating a panel allocates all of its sample sets in the same
//! transaction as the panel row, and copies the experiment's default
//! question set into panel questions.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tasex_common::db::{begin_write, Panel, PanelStatus, ShowExperimentDescription};
use tasex_common::{Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

use super::{catalog, is_unique_violation, parse_uuid, samples};
use crate::allocator;
use crate::lifecycle;

#[derive(Debug, Clone, Deserialize)]
pub struct NewPanel {
    pub experiment_id: Uuid,
    #[serde(default)]
    pub description: String,
    pub planned_panelists: u16,
    #[serde(default)]
    pub show_exp_description: ShowExperimentDescription,
}

/// Owner edit of an existing panel; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelUpdate {
    pub description: Option<String>,
    pub status: Option<PanelStatus>,
    pub show_exp_description: Option<ShowExperimentDescription>,
    /// Accepted only when equal to the stored value
    pub planned_panelists: Option<u16>,
}

/// Create a panel and allocate its sample sets
pub async fn create_panel(pool: &SqlitePool, new: &NewPanel) -> Result<Panel> {
    let mut rng = StdRng::from_entropy();
    create_panel_with_rng(pool, &mut rng, new).await
}

/// [`create_panel`] with an explicit random source
pub async fn create_panel_with_rng<R: Rng + Send>(
    pool: &SqlitePool,
    rng: &mut R,
    new: &NewPanel,
) -> Result<Panel> {
    let experiment = catalog::get_experiment(pool, new.experiment_id).await?;

    let now = Utc::now();
    let panel = Panel {
        id: Uuid::new_v4(),
        experiment_id: experiment.id,
        description: new.description.clone(),
        planned_panelists: new.planned_panelists,
        show_exp_description: new.show_exp_description,
        status: PanelStatus::Planned,
        closed_at: None,
        created_at: now,
        modified_at: now,
    };

    let mut tx = begin_write(pool).await?;

    let taken = samples::taken_codes(&mut *tx).await?;
    let sets = allocator::allocate(
        rng,
        new.planned_panelists,
        experiment.product_a_id,
        experiment.product_b_id,
        &taken,
    )?;

    sqlx::query(
        r#"
        INSERT INTO panels (
            id, experiment_id, description, planned_panelists,
            show_exp_description, status, closed_at, created_at, modified_at
        ) VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(panel.id.to_string())
    .bind(panel.experiment_id.to_string())
    .bind(&panel.description)
    .bind(panel.planned_panelists as i64)
    .bind(panel.show_exp_description.as_str())
    .bind(panel.status.as_str())
    .bind(panel.created_at)
    .bind(panel.modified_at)
    .execute(&mut *tx)
    .await?;

    for set in &sets {
        let set_id = sqlx::query("INSERT INTO sample_sets (panel_id, is_used) VALUES (?, 0)")
            .bind(panel.id.to_string())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for sample in &set.samples {
            sqlx::query("INSERT INTO samples (sample_set_id, product_id, code) VALUES (?, ?, ?)")
                .bind(set_id)
                .bind(sample.product_id)
                .bind(sample.code as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    // The write lock makes this unreachable unless another process
                    // writes the database without taking it
                    if is_unique_violation(&e) {
                        Error::Internal(format!(
                            "Sample code {} was allocated concurrently, retry panel creation",
                            sample.code
                        ))
                    } else {
                        Error::Database(e)
                    }
                })?;
        }
    }

    let copied = if let Some(question_set_id) = experiment.question_set_id {
        sqlx::query(
            r#"
            INSERT INTO panel_questions (panel_id, position, question_text, scale_id)
            SELECT ?, qsi.position, q.question_text, q.scale_id
            FROM question_set_items qsi
            JOIN questions q ON q.id = qsi.question_id
            WHERE qsi.question_set_id = ?
            ORDER BY qsi.position
            "#,
        )
        .bind(panel.id.to_string())
        .bind(question_set_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        0
    };

    tx.commit().await?;

    info!(
        panel_id = %panel.id,
        experiment_id = %panel.experiment_id,
        sample_sets = sets.len(),
        questions = copied,
        "Created panel"
    );

    Ok(panel)
}

pub async fn get_panel(pool: &SqlitePool, id: Uuid) -> Result<Panel> {
    let row = sqlx::query(
        r#"
        SELECT id, experiment_id, description, planned_panelists,
               show_exp_description, status, closed_at, created_at, modified_at
        FROM panels
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Panel {}", id)))?;

    panel_from_row(&row)
}

fn panel_from_row(row: &SqliteRow) -> Result<Panel> {
    let id: String = row.try_get("id")?;
    let experiment_id: String = row.try_get("experiment_id")?;
    let planned: i64 = row.try_get("planned_panelists")?;
    let show: String = row.try_get("show_exp_description")?;
    let status: String = row.try_get("status")?;

    Ok(Panel {
        id: parse_uuid(&id)?,
        experiment_id: parse_uuid(&experiment_id)?,
        description: row.try_get("description")?,
        planned_panelists: u16::try_from(planned).map_err(|_| {
            Error::Invariant(format!("planned_panelists out of range: {}", planned))
        })?,
        show_exp_description: show.parse()?,
        status: status.parse()?,
        closed_at: row.try_get("closed_at")?,
        created_at: row.try_get("created_at")?,
        modified_at: row.try_get("modified_at")?,
    })
}

/// Apply an owner edit
///
/// Any attempt to change `planned_panelists` rejects the whole update.
pub async fn update_panel(pool: &SqlitePool, id: Uuid, update: &PanelUpdate) -> Result<Panel> {
    let mut panel = get_panel(pool, id).await?;

    if let Some(requested) = update.planned_panelists {
        if let Err(e) =
            lifecycle::ensure_planned_panelists_unchanged(panel.planned_panelists, requested)
        {
            warn!(
                panel_id = %id,
                current = panel.planned_panelists,
                requested,
                "Rejected planned_panelists change"
            );
            return Err(e);
        }
    }

    let old_status = panel.status;
    if let Some(description) = &update.description {
        panel.description = description.clone();
    }
    if let Some(show) = update.show_exp_description {
        panel.show_exp_description = show;
    }
    if let Some(status) = update.status {
        panel.status = status;
    }

    let now = Utc::now();
    if lifecycle::closes_panel(old_status, panel.status) && panel.closed_at.is_none() {
        panel.closed_at = Some(now);
    }
    panel.modified_at = now;

    // planned_panelists is never written after creation
    sqlx::query(
        r#"
        UPDATE panels
        SET description = ?, show_exp_description = ?, status = ?,
            closed_at = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&panel.description)
    .bind(panel.show_exp_description.as_str())
    .bind(panel.status.as_str())
    .bind(panel.closed_at)
    .bind(panel.modified_at)
    .bind(panel.id.to_string())
    .execute(pool)
    .await?;

    if old_status != panel.status {
        info!(
            panel_id = %panel.id,
            from = %old_status,
            to = %panel.status,
            "Panel status changed"
        );
    }

    Ok(panel)
}

/// Set only the lifecycle status
pub async fn set_status(pool: &SqlitePool, id: Uuid, status: PanelStatus) -> Result<Panel> {
    update_panel(
        pool,
        id,
        &PanelUpdate {
            status: Some(status),
            ..PanelUpdate::default()
        },
    )
    .await
}
