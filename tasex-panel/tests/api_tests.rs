//! Integration tests for tasex-panel HTTP endpoints
//!
//! Tests cover:
//! - Health endpoint (no owner secret required)
//! - Owner secret middleware
//! - Full anonymous wizard round trip through the router
//! - Hidden panels, lifecycle violations and mid-flow status changes

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Duration;
use tasex_common::db::init_database;
use tasex_panel::recorder::{AnswerSubmission, ResultRecorder};
use tasex_panel::wizard::WizardSessions;
use tasex_panel::{build_router, AppState};
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const SECRET: i64 = 424242;

struct TestApp {
    _dir: TempDir,
    pool: SqlitePool,
    router: Router,
}

struct TestResponse {
    status: StatusCode,
    set_cookie: Option<String>,
    body: Value,
}

/// Test helper: App on a fresh temporary database
async fn setup_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("tasex.db")).await.unwrap();
    let state = AppState::new(
        pool.clone(),
        WizardSessions::in_memory(Duration::from_secs(3600)),
        SECRET,
        "https://panels.example.org/",
    );
    TestApp {
        _dir: dir,
        pool,
        router: build_router(state),
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        secret: Option<i64>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(secret) = secret {
            builder = builder.header("x-owner-secret", secret.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };

        TestResponse { status, set_cookie, body }
    }

    async fn owner(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        self.send(method, uri, None, Some(SECRET), body).await
    }

    async fn visit(&self, method: &str, panel_id: &str, cookie: &str, body: Option<Value>) -> TestResponse {
        self.send(method, &format!("/panels/{}", panel_id), Some(cookie), None, body)
            .await
    }
}

/// Owner-side setup: products, scale, two questions, experiment and a panel
/// with `planned` kits. Returns the panel id.
async fn create_panel(app: &TestApp, planned: u16) -> String {
    let a = app
        .owner("POST", "/owner/products", Some(json!({
            "brew_id": "B-1", "internal_name": "Lager", "name": "Lager"
        })))
        .await;
    assert_eq!(a.status, StatusCode::CREATED);
    let b = app
        .owner("POST", "/owner/products", Some(json!({
            "brew_id": "B-2", "internal_name": "Lager 2", "name": "Lager new yeast"
        })))
        .await;

    let scale = app
        .owner("POST", "/owner/scales", Some(json!({
            "name": "Preference",
            "points": [
                {"code": "ODD", "text": "Odd sample"},
                {"code": "PAIR", "text": "Pair samples"}
            ]
        })))
        .await;
    assert_eq!(scale.status, StatusCode::CREATED);
    let scale_id = scale.body["id"].as_i64().unwrap();

    let mut question_ids = Vec::new();
    for text in ["Which did you prefer?", "Which had more aroma?"] {
        let q = app
            .owner("POST", "/owner/questions", Some(json!({
                "question_text": text, "scale_id": scale_id
            })))
            .await;
        question_ids.push(q.body["id"].as_i64().unwrap());
    }
    let set = app
        .owner("POST", "/owner/question-sets", Some(json!({
            "name": "Default", "question_ids": question_ids
        })))
        .await;

    let experiment = app
        .owner("POST", "/owner/experiments", Some(json!({
            "internal_title": "Yeast swap",
            "title": "Lager test",
            "description": "New yeast strain",
            "product_a_id": a.body["id"],
            "product_b_id": b.body["id"],
            "question_set_id": set.body["id"]
        })))
        .await;
    assert_eq!(experiment.status, StatusCode::CREATED);

    let panel = app
        .owner("POST", "/owner/panels", Some(json!({
            "experiment_id": experiment.body["id"],
            "description": "Evening panel",
            "planned_panelists": planned,
            "show_exp_description": "AFTER_TASTING"
        })))
        .await;
    assert_eq!(panel.status, StatusCode::CREATED);
    let panel_id = panel.body["id"].as_str().unwrap().to_string();
    assert_eq!(
        panel.body["panel_url"],
        format!("https://panels.example.org/panels/{}", panel_id)
    );
    panel_id
}

async fn set_status(app: &TestApp, panel_id: &str, status: &str) {
    let response = app
        .owner("PATCH", &format!("/owner/panels/{}", panel_id), Some(json!({"status": status})))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
}

/// Sample sets as the owner sees them
async fn sample_sets(app: &TestApp, panel_id: &str) -> Vec<Value> {
    let detail = app.owner("GET", &format!("/owner/panels/{}", panel_id), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    detail.body["sample_sets"].as_array().unwrap().clone()
}

/// Id of the minority-product sample in a sample set
fn odd_sample_id(set: &Value) -> i64 {
    let samples = set["samples"].as_array().unwrap();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for s in samples {
        *counts.entry(s["product_id"].as_i64().unwrap()).or_default() += 1;
    }
    let odd_product = counts.into_iter().find(|(_, c)| *c == 1).unwrap().0;
    samples
        .iter()
        .find(|s| s["product_id"].as_i64() == Some(odd_product))
        .unwrap()["id"]
        .as_i64()
        .unwrap()
}

fn first_code(set: &Value) -> String {
    set["samples"][0]["code"].as_u64().unwrap().to_string()
}

/// Start an anonymous session and return its cookie
async fn start_session(app: &TestApp, panel_id: &str) -> String {
    let response = app
        .send("GET", &format!("/panels/{}", panel_id), None, None, None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["template"], "verify_code");
    let set_cookie = response.set_cookie.expect("new visitors get a session cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

// =============================================================================
// Health and owner authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;

    let response = app.send("GET", "/health", None, None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert_eq!(response.body["module"], "tasex-panel");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_owner_routes_require_secret() {
    let app = setup_app().await;
    let product = json!({"brew_id": "B-9", "internal_name": "Stout", "name": "Stout"});

    let missing = app
        .send("POST", "/owner/products", None, None, Some(product.clone()))
        .await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["error"]["code"], "UNAUTHORIZED");

    let wrong = app
        .send("POST", "/owner/products", None, Some(SECRET + 1), Some(product.clone()))
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let ok = app.owner("POST", "/owner/products", Some(product)).await;
    assert_eq!(ok.status, StatusCode::CREATED);
}

// =============================================================================
// Wizard round trip
// =============================================================================

#[tokio::test]
async fn test_wizard_round_trip() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 2).await;
    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;

    let sets = sample_sets(&app, &panel_id).await;
    let set = &sets[0];
    let cookie = start_session(&app, &panel_id).await;

    // Step 1: valid code advances to confirmation
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"code": first_code(set)})))
        .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["template"], "confirm_set");
    assert_eq!(r.body["context"]["codes"].as_array().unwrap().len(), 3);
    assert!(r.set_cookie.is_none(), "existing session keeps its cookie");

    // Step 2 "no": back to step 1 with nothing consumed
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"are_samples_correct": false})))
        .await;
    assert_eq!(r.body["template"], "verify_code");
    assert_eq!(sample_sets(&app, &panel_id).await[0]["is_used"], false);

    // Step 1 again, then step 2 "yes" claims the set
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"code": first_code(set)})))
        .await;
    assert_eq!(r.body["template"], "confirm_set");
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"are_samples_correct": true})))
        .await;
    assert_eq!(r.body["template"], "pick_odd_sample");
    assert_eq!(sample_sets(&app, &panel_id).await[0]["is_used"], true);

    // Answers cannot be sent early: the stored step picks the handler
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"answers": {"1": "ODD"}})))
        .await;
    assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(r.body["template"], "pick_odd_sample");

    // Step 3: the odd sample creates exactly one result
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"odd_sample": odd_sample_id(set)})))
        .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["template"], "answer_questions");
    let questions = r.body["context"]["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 2);
    let results: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM results")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(results, 1);

    // Step 4 incomplete: re-rendered with a per-question error
    let q1 = questions[0]["id"].as_i64().unwrap();
    let q2 = questions[1]["id"].as_i64().unwrap();
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"answers": {q1.to_string(): "ODD"}})))
        .await;
    assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(r.body["template"], "answer_questions");
    assert!(r.body["context"]["question_errors"][q2.to_string()].is_string());
    assert_eq!(r.body["context"]["questions"][0]["selected"], "ODD");

    // Step 4 complete
    let answers = json!({"answers": {q1.to_string(): "ODD", q2.to_string(): "PAIR"}});
    let r = app.visit("POST", &panel_id, &cookie, Some(answers.clone())).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["template"], "complete");
    // AFTER_TASTING: description appears once tasting is over
    assert_eq!(r.body["context"]["panel"]["experiment_description"], "New yeast strain");

    // Re-submitting does not duplicate answers
    let r = app.visit("POST", &panel_id, &cookie, Some(answers)).await;
    assert_eq!(r.body["template"], "complete");
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let detail = app.owner("GET", &format!("/owner/panels/{}", panel_id), None).await;
    assert_eq!(detail.body["statistics"]["participants"], 1);
    assert_eq!(detail.body["statistics"]["correct"], 1);
    assert_eq!(detail.body["statistics"]["percent_correct"], 100);
}

#[tokio::test]
async fn test_answers_recorded_elsewhere_rejected_at_step_four() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;
    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;
    let set = sample_sets(&app, &panel_id).await[0].clone();
    let cookie = start_session(&app, &panel_id).await;

    app.visit("POST", &panel_id, &cookie, Some(json!({"code": first_code(&set)}))).await;
    app.visit("POST", &panel_id, &cookie, Some(json!({"are_samples_correct": true}))).await;
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"odd_sample": odd_sample_id(&set)})))
        .await;
    assert_eq!(r.body["template"], "answer_questions");
    let question_ids: Vec<i64> = r.body["context"]["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect();

    // Another submission for the same result lands first; the session is
    // still at step 4
    let result_id: i64 = sqlx::query_scalar("SELECT id FROM results")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    let earlier: Vec<AnswerSubmission> = question_ids
        .iter()
        .map(|&id| AnswerSubmission { question_id: id, code: Some("PAIR".into()) })
        .collect();
    ResultRecorder::new(app.pool.clone())
        .record_answers(result_id, &earlier)
        .await
        .unwrap();

    let answers: serde_json::Map<String, Value> = question_ids
        .iter()
        .map(|id| (id.to_string(), json!("ODD")))
        .collect();
    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"answers": answers})))
        .await;
    assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(r.body["template"], "answer_questions");
    assert_eq!(
        r.body["context"]["errors"][0],
        "Your answers have already been recorded"
    );

    let codes: Vec<String> = sqlx::query_scalar("SELECT answer_code FROM answers ORDER BY id")
        .fetch_all(&app.pool)
        .await
        .unwrap();
    assert_eq!(codes, vec!["PAIR".to_string(); question_ids.len()]);
}

#[tokio::test]
async fn test_invalid_codes_rejected() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;
    let other_panel = create_panel(&app, 1).await;
    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;
    set_status(&app, &other_panel, "ACCEPTING_ANSWERS").await;

    let cookie = start_session(&app, &panel_id).await;
    let other_code = first_code(&sample_sets(&app, &other_panel).await[0]);

    for body in [
        json!({}),
        json!({"code": "abc"}),
        json!({"code": "99999"}),
        json!({"code": other_code}),
    ] {
        let r = app.visit("POST", &panel_id, &cookie, Some(body.clone())).await;
        assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY, "accepted {}", body);
        assert_eq!(r.body["template"], "verify_code");
        assert_eq!(r.body["context"]["errors"].as_array().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_used_sample_set_rejected_for_second_visitor() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;
    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;
    let code = first_code(&sample_sets(&app, &panel_id).await[0]);

    let first = start_session(&app, &panel_id).await;
    let second = start_session(&app, &panel_id).await;
    assert_ne!(first, second);

    // Both verify before either confirms
    for cookie in [&first, &second] {
        let r = app.visit("POST", &panel_id, cookie, Some(json!({"code": code}))).await;
        assert_eq!(r.body["template"], "confirm_set");
    }

    let r = app
        .visit("POST", &panel_id, &first, Some(json!({"are_samples_correct": true})))
        .await;
    assert_eq!(r.body["template"], "pick_odd_sample");

    // The loser of the claim is sent back to step 1
    let r = app
        .visit("POST", &panel_id, &second, Some(json!({"are_samples_correct": true})))
        .await;
    assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(r.body["template"], "verify_code");

    let r = app.visit("POST", &panel_id, &second, Some(json!({"code": code}))).await;
    assert_eq!(r.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(r.body["template"], "verify_code");
}

// =============================================================================
// Lifecycle and access
// =============================================================================

#[tokio::test]
async fn test_panel_content_follows_status() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;

    let r = app.send("GET", &format!("/panels/{}", panel_id), None, None, None).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["template"], "not_started");

    set_status(&app, &panel_id, "PRESENTING_RESULTS").await;
    let r = app.send("GET", &format!("/panels/{}", panel_id), None, None, None).await;
    assert_eq!(r.body["template"], "results");
    assert_eq!(r.body["context"]["statistics"]["participants"], 0);
    assert_eq!(r.body["context"]["statistics"]["p_value"], 1.0);
    assert_eq!(r.body["context"]["statistics"]["significant"], false);
}

#[tokio::test]
async fn test_hidden_panel_denied_to_anonymous_only() {
    let app = setup_app().await;

    for before in ["PLANNED", "ACCEPTING_ANSWERS", "PRESENTING_RESULTS"] {
        let panel_id = create_panel(&app, 1).await;
        set_status(&app, &panel_id, before).await;
        set_status(&app, &panel_id, "HIDDEN").await;

        let r = app.send("GET", &format!("/panels/{}", panel_id), None, None, None).await;
        assert_eq!(r.status, StatusCode::FORBIDDEN, "hidden after {}", before);
        assert_eq!(r.body["error"]["code"], "FORBIDDEN");

        let r = app
            .send("POST", &format!("/panels/{}", panel_id), None, None, Some(json!({"code": "1000"})))
            .await;
        assert_eq!(r.status, StatusCode::FORBIDDEN);

        let r = app.owner("GET", &format!("/owner/panels/{}", panel_id), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.body["panel"]["status"], "HIDDEN");
    }
}

#[tokio::test]
async fn test_status_change_mid_flow_stops_wizard() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;
    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;
    let code = first_code(&sample_sets(&app, &panel_id).await[0]);

    let cookie = start_session(&app, &panel_id).await;
    let r = app.visit("POST", &panel_id, &cookie, Some(json!({"code": code}))).await;
    assert_eq!(r.body["template"], "confirm_set");

    set_status(&app, &panel_id, "PRESENTING_RESULTS").await;

    let r = app
        .visit("POST", &panel_id, &cookie, Some(json!({"are_samples_correct": true})))
        .await;
    assert_eq!(r.body["template"], "results");
    assert_eq!(sample_sets(&app, &panel_id).await[0]["is_used"], false);
}

#[tokio::test]
async fn test_unknown_panel_not_found() {
    let app = setup_app().await;
    let r = app
        .send("GET", &format!("/panels/{}", uuid::Uuid::new_v4()), None, None, None)
        .await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_planned_panelists_change_is_conflict() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 3).await;

    let r = app
        .owner("PATCH", &format!("/owner/panels/{}", panel_id), Some(json!({"planned_panelists": 5})))
        .await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = app
        .owner("PATCH", &format!("/owner/panels/{}", panel_id), Some(json!({"description": "Renamed"})))
        .await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["description"], "Renamed");
    assert_eq!(r.body["planned_panelists"], 3);
}

#[tokio::test]
async fn test_panel_questions_frozen_after_start() {
    let app = setup_app().await;
    let panel_id = create_panel(&app, 1).await;

    let detail = app.owner("GET", &format!("/owner/panels/{}", panel_id), None).await;
    let question = &detail.body["questions"][0];
    let new_question = json!({
        "question_text": "Would you buy it?",
        "scale_id": question["scale_id"]
    });

    let r = app
        .owner("POST", &format!("/owner/panels/{}/questions", panel_id), Some(new_question.clone()))
        .await;
    assert_eq!(r.status, StatusCode::CREATED);

    set_status(&app, &panel_id, "ACCEPTING_ANSWERS").await;

    let r = app
        .owner("POST", &format!("/owner/panels/{}/questions", panel_id), Some(new_question))
        .await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = app
        .owner(
            "DELETE",
            &format!("/owner/panels/{}/questions/{}", panel_id, question["id"]),
            None,
        )
        .await;
    assert_eq!(r.status, StatusCode::CONFLICT);
}
