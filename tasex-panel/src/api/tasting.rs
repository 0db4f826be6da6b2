//! Anonymous panel pages
//!
//! GET renders the visitor's current step, POST submits the form for it.
//! Responses carry the view as `{"template", "context"}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::session::AnonymousSession;
use crate::error::ApiResult;
use crate::wizard::{View, WizardForm};
use crate::AppState;

fn render(session: &AnonymousSession, status: StatusCode, view: View) -> Response {
    session.apply((status, Json(view)).into_response())
}

/// GET /panels/:panel_id
pub async fn show_panel(
    State(state): State<AppState>,
    Path(panel_id): Path<Uuid>,
    session: AnonymousSession,
) -> ApiResult<Response> {
    let view = state.wizard.show(&session.key, panel_id).await?;
    Ok(render(&session, StatusCode::OK, view))
}

/// POST /panels/:panel_id
///
/// 422 when the form is re-presented with validation errors.
pub async fn submit_panel(
    State(state): State<AppState>,
    Path(panel_id): Path<Uuid>,
    session: AnonymousSession,
    Json(form): Json<WizardForm>,
) -> ApiResult<Response> {
    let outcome = state.wizard.submit(&session.key, panel_id, form).await?;

    let status = if outcome.view.has_errors() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    Ok(render(&session, status, outcome.view))
}
