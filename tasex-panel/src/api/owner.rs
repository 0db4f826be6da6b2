//! Owner routes
//!
//! Reference data creation, panel creation and status management, and the
//! owner's panel view. All routes sit behind the owner secret middleware.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tasex_common::db::{
    Experiment, Panel, PanelQuestion, Product, Question, QuestionSet, Scale,
};
use tracing::info;
use uuid::Uuid;

use crate::db::catalog::{self, NewExperiment, NewProduct, NewQuestion, NewQuestionSet, NewScale};
use crate::db::panels::{self, NewPanel, PanelUpdate};
use crate::db::questions::{self, NewPanelQuestion};
use crate::db::samples::{self, SampleSetDetail};
use crate::error::ApiResult;
use crate::lifecycle::{self, Audience};
use crate::statistics::{self, PanelStatistics};
use crate::AppState;

/// Panel with the URL panelists open (encoded into the QR code)
#[derive(Debug, Serialize)]
pub struct PanelSummary {
    #[serde(flatten)]
    pub panel: Panel,
    pub panel_url: String,
}

/// Everything the owner sees for one panel
#[derive(Debug, Serialize)]
pub struct PanelDetail {
    pub panel: Panel,
    pub experiment: Experiment,
    pub panel_url: String,
    pub questions: Vec<PanelQuestion>,
    pub sample_sets: Vec<SampleSetDetail>,
    pub statistics: PanelStatistics,
}

fn panel_url(state: &AppState, panel_id: Uuid) -> String {
    format!(
        "{}/panels/{}",
        state.public_base_url.trim_end_matches('/'),
        panel_id
    )
}

/// POST /owner/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = catalog::create_product(&state.db, &new).await?;
    info!(product_id = product.id, "Created product");
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /owner/scales
pub async fn create_scale(
    State(state): State<AppState>,
    Json(new): Json<NewScale>,
) -> ApiResult<(StatusCode, Json<Scale>)> {
    let scale = catalog::create_scale(&state.db, &new).await?;
    info!(scale_id = scale.id, points = scale.points.len(), "Created scale");
    Ok((StatusCode::CREATED, Json(scale)))
}

/// POST /owner/questions
pub async fn create_question(
    State(state): State<AppState>,
    Json(new): Json<NewQuestion>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let question = catalog::create_question(&state.db, &new).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// POST /owner/question-sets
pub async fn create_question_set(
    State(state): State<AppState>,
    Json(new): Json<NewQuestionSet>,
) -> ApiResult<(StatusCode, Json<QuestionSet>)> {
    let set = catalog::create_question_set(&state.db, &new).await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// POST /owner/experiments
pub async fn create_experiment(
    State(state): State<AppState>,
    Json(new): Json<NewExperiment>,
) -> ApiResult<(StatusCode, Json<Experiment>)> {
    let experiment = catalog::create_experiment(&state.db, &new).await?;
    info!(experiment_id = %experiment.id, "Created experiment");
    Ok((StatusCode::CREATED, Json(experiment)))
}

/// POST /owner/panels
pub async fn create_panel(
    State(state): State<AppState>,
    Json(new): Json<NewPanel>,
) -> ApiResult<(StatusCode, Json<PanelSummary>)> {
    let panel = panels::create_panel(&state.db, &new).await?;
    let panel_url = panel_url(&state, panel.id);
    Ok((StatusCode::CREATED, Json(PanelSummary { panel, panel_url })))
}

/// GET /owner/panels/:panel_id
///
/// Available in every status, HIDDEN included.
pub async fn get_panel(
    State(state): State<AppState>,
    Path(panel_id): Path<Uuid>,
) -> ApiResult<Json<PanelDetail>> {
    let panel = panels::get_panel(&state.db, panel_id).await?;
    lifecycle::check_access(panel.status, Audience::Owner)?;

    let experiment = catalog::get_experiment(&state.db, panel.experiment_id).await?;
    let questions = questions::list_panel_questions(&state.db, panel_id).await?;
    let sample_sets = samples::list_sample_sets(&state.db, panel_id).await?;
    let statistics = statistics::panel_statistics(&state.db, panel_id).await?;

    Ok(Json(PanelDetail {
        panel_url: panel_url(&state, panel_id),
        panel,
        experiment,
        questions,
        sample_sets,
        statistics,
    }))
}

/// PATCH /owner/panels/:panel_id
pub async fn update_panel(
    State(state): State<AppState>,
    Path(panel_id): Path<Uuid>,
    Json(update): Json<PanelUpdate>,
) -> ApiResult<Json<PanelSummary>> {
    let panel = panels::update_panel(&state.db, panel_id, &update).await?;
    let panel_url = panel_url(&state, panel.id);
    Ok(Json(PanelSummary { panel, panel_url }))
}

/// POST /owner/panels/:panel_id/questions
pub async fn add_panel_question(
    State(state): State<AppState>,
    Path(panel_id): Path<Uuid>,
    Json(new): Json<NewPanelQuestion>,
) -> ApiResult<(StatusCode, Json<PanelQuestion>)> {
    let question = questions::add_panel_question(&state.db, panel_id, &new).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// DELETE /owner/panels/:panel_id/questions/:question_id
pub async fn delete_panel_question(
    State(state): State<AppState>,
    Path((panel_id, question_id)): Path<(Uuid, i64)>,
) -> ApiResult<StatusCode> {
    questions::delete_panel_question(&state.db, panel_id, question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
