//! tasex-panel library - blind triangle taste-test panels
//!
//! Anonymous panelists walk through the tasting wizard; panel owners
//! create experiments and panels and drive the panel lifecycle.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod allocator;
pub mod api;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod recorder;
pub mod statistics;
pub mod wizard;

use wizard::{Wizard, WizardSessions};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub wizard: Wizard,
    /// Shared secret for owner routes; 0 disables the check
    pub owner_secret: i64,
    /// Base for panel URLs handed out to panelists
    pub public_base_url: String,
}

impl AppState {
    /// Create new application state
    pub fn new(
        db: SqlitePool,
        sessions: WizardSessions,
        owner_secret: i64,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            wizard: Wizard::new(db.clone(), sessions),
            db,
            owner_secret,
            public_base_url: public_base_url.into(),
        }
    }
}

/// Build application router
///
/// Owner routes require the owner secret; panel pages and health do not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post};

    let owner = Router::new()
        .route("/owner/products", post(api::owner::create_product))
        .route("/owner/scales", post(api::owner::create_scale))
        .route("/owner/questions", post(api::owner::create_question))
        .route("/owner/question-sets", post(api::owner::create_question_set))
        .route("/owner/experiments", post(api::owner::create_experiment))
        .route("/owner/panels", post(api::owner::create_panel))
        .route(
            "/owner/panels/:panel_id",
            get(api::owner::get_panel).patch(api::owner::update_panel),
        )
        .route(
            "/owner/panels/:panel_id/questions",
            post(api::owner::add_panel_question),
        )
        .route(
            "/owner/panels/:panel_id/questions/:question_id",
            delete(api::owner::delete_panel_question),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::owner_auth_middleware,
        ));

    let public = Router::new()
        .route(
            "/panels/:panel_id",
            get(api::tasting::show_panel).post(api::tasting::submit_panel),
        )
        .merge(api::health_routes());

    Router::new()
        .merge(owner)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
