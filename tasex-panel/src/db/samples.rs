//! Sample sets and samples

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::collections::HashSet;
use tasex_common::db::{Sample, SampleSet};
use tasex_common::{Error, Result};
use uuid::Uuid;

use super::parse_uuid;

/// A sample found by its printed code, with the kit context needed to
/// validate it
#[derive(Debug, Clone)]
pub struct SampleLookup {
    pub sample: Sample,
    pub panel_id: Uuid,
    pub set_is_used: bool,
}

/// Sample set with its samples, ordered by code
#[derive(Debug, Clone, Serialize)]
pub struct SampleSetDetail {
    #[serde(flatten)]
    pub set: SampleSet,
    pub samples: Vec<Sample>,
}

fn sample_from_row(row: &SqliteRow) -> Result<Sample> {
    let code: i64 = row.try_get("code")?;
    Ok(Sample {
        id: row.try_get("id")?,
        sample_set_id: row.try_get("sample_set_id")?,
        product_id: row.try_get("product_id")?,
        code: u16::try_from(code)
            .map_err(|_| Error::Invariant(format!("Sample code out of range: {}", code)))?,
    })
}

/// All codes currently in use, across every panel
pub async fn taken_codes<'e, E>(executor: E) -> Result<HashSet<u16>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let codes: Vec<i64> = sqlx::query_scalar("SELECT code FROM samples")
        .fetch_all(executor)
        .await?;

    Ok(codes
        .into_iter()
        .filter_map(|c| u16::try_from(c).ok())
        .collect())
}

pub async fn find_sample_by_code(pool: &SqlitePool, code: u16) -> Result<Option<SampleLookup>> {
    let row = sqlx::query(
        r#"
        SELECT s.id, s.sample_set_id, s.product_id, s.code,
               ss.panel_id, ss.is_used
        FROM samples s
        JOIN sample_sets ss ON ss.id = s.sample_set_id
        WHERE s.code = ?
        "#,
    )
    .bind(code as i64)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let panel_id: String = row.try_get("panel_id")?;
            Ok(Some(SampleLookup {
                sample: sample_from_row(&row)?,
                panel_id: parse_uuid(&panel_id)?,
                set_is_used: row.try_get("is_used")?,
            }))
        }
        None => Ok(None),
    }
}

pub async fn get_sample_set<'e, E>(executor: E, id: i64) -> Result<SampleSet>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, panel_id, is_used FROM sample_sets WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Sample set {}", id)))?;

    let panel_id: String = row.try_get("panel_id")?;
    Ok(SampleSet {
        id: row.try_get("id")?,
        panel_id: parse_uuid(&panel_id)?,
        is_used: row.try_get("is_used")?,
    })
}

/// Samples of one kit, ordered by code
pub async fn samples_in_set<'e, E>(executor: E, sample_set_id: i64) -> Result<Vec<Sample>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, sample_set_id, product_id, code FROM samples WHERE sample_set_id = ? ORDER BY code",
    )
    .bind(sample_set_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(sample_from_row).collect()
}

/// Atomically mark a kit as used
///
/// Returns `false` when the kit was already used: of two concurrent claims
/// on the same kit exactly one sees `true`.
pub async fn claim_sample_set<'e, E>(executor: E, sample_set_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query("UPDATE sample_sets SET is_used = 1 WHERE id = ? AND is_used = 0")
        .bind(sample_set_id)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(affected == 1)
}

/// Every kit of a panel with its samples (owner view)
pub async fn list_sample_sets(pool: &SqlitePool, panel_id: Uuid) -> Result<Vec<SampleSetDetail>> {
    let set_rows = sqlx::query("SELECT id, is_used FROM sample_sets WHERE panel_id = ? ORDER BY id")
        .bind(panel_id.to_string())
        .fetch_all(pool)
        .await?;

    let sample_rows = sqlx::query(
        r#"
        SELECT s.id, s.sample_set_id, s.product_id, s.code
        FROM samples s
        JOIN sample_sets ss ON ss.id = s.sample_set_id
        WHERE ss.panel_id = ?
        ORDER BY s.sample_set_id, s.code
        "#,
    )
    .bind(panel_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut details = set_rows
        .iter()
        .map(|row| {
            Ok(SampleSetDetail {
                set: SampleSet {
                    id: row.try_get("id")?,
                    panel_id,
                    is_used: row.try_get("is_used")?,
                },
                samples: Vec::with_capacity(3),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for row in &sample_rows {
        let sample = sample_from_row(row)?;
        if let Some(detail) = details.iter_mut().find(|d| d.set.id == sample.sample_set_id) {
            detail.samples.push(sample);
        }
    }

    Ok(details)
}
