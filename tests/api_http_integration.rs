//! HTTP-level integration tests for the API router.
//!
//! Each test builds the full router over an in-memory SQLite pool and a
//! temporary uploads directory, then drives it with `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{header, Request, StatusCode};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use descihub::activity::ActivityLogger;
use descihub::api::{self, AppState};
use descihub::chain::MockChainClient;
use descihub::config::AppConfig;
use descihub::database::dataset_repository::NewDataset;
use descihub::database::project_repository::NewProject;
use descihub::database::{migrations, DatasetRepository, ProjectRepository, UserRepository};
use descihub::storage::UploadStore;
use descihub::zk::MockProofVerifier;

const WALLET_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const WALLET_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const WALLET_C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

async fn build_test_app() -> (axum::Router, SqlitePool, tempfile::TempDir) {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    migrations::run(&pool).await.unwrap();

    let uploads_dir = tempfile::tempdir().unwrap();
    let uploads = UploadStore::open(uploads_dir.path().join("uploads"))
        .await
        .unwrap();

    let state = AppState {
        pool: pool.clone(),
        config: AppConfig::default(),
        chain: Arc::new(MockChainClient),
        verifier: Arc::new(MockProofVerifier),
        activity: ActivityLogger::new(pool.clone()),
        http: reqwest::Client::new(),
        uploads,
    };

    (api::router(state), pool, uploads_dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &axum::Router, wallet: &str) -> Value {
    let response = app
        .clone()
        .oneshot(post_json("/api/auth/login", json!({ "walletAddress": wallet })))
        .await
        .unwrap();
    body_json(response).await
}

// ── Auth ───────────────────────────────────────────────────────

#[tokio::test]
async fn login_creates_user_with_did_then_reuses_row() {
    let (app, _pool, _dir) = build_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/login", json!({ "walletAddress": WALLET_A })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = body_json(response).await;
    assert_eq!(first["user"]["did"], format!("did:ethr:{WALLET_A}"));
    let id = first["user"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/api/auth/login", json!({ "walletAddress": WALLET_A })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await;
    assert_eq!(second["user"]["id"].as_i64(), Some(id));
    assert_eq!(second["message"], "Login successful.");
}

#[tokio::test]
async fn login_rejects_malformed_addresses() {
    let (app, _pool, _dir) = build_test_app().await;

    let response = app
        .oneshot(post_json("/api/auth/login", json!({ "walletAddress": "0x123" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Valid wallet address is required.");
}

// ── Projects ───────────────────────────────────────────────────

#[tokio::test]
async fn project_creation_applies_defaults() {
    let (app, _pool, _dir) = build_test_app().await;
    login(&app, WALLET_A).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/projects",
            json!({ "name": "Coral Genomics", "creator_wallet_address": WALLET_A }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["visibility"], "Private");
    assert_eq!(body["status"], "Unknown");
    assert_eq!(body["category"], "Other");

    // Unknown creator wallet is a 404
    let response = app
        .oneshot(post_json(
            "/api/projects",
            json!({ "name": "x", "creator_wallet_address": WALLET_C }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mint_requires_completed_project() {
    let (app, pool, _dir) = build_test_app().await;
    let login_body = login(&app, WALLET_A).await;
    let owner_id = login_body["user"]["id"].as_i64().unwrap();

    let projects = ProjectRepository::new(pool);
    let project = projects
        .create(&NewProject {
            name: "ongoing".into(),
            description: None,
            owner_id,
            visibility: "Private".into(),
            status: "Active".into(),
            category: "Other".into(),
            start_date: "2026-01-01".into(),
        })
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/projects/{}/nft/mint", project.id),
            json!({
                "title": "Ongoing Work",
                "description": "not done yet",
                "walletAddress": WALLET_A,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Project must be completed before minting as NFT");
}

// ── Kanban ─────────────────────────────────────────────────────

#[tokio::test]
async fn kanban_board_bootstraps_five_columns_in_order() {
    let (app, pool, _dir) = build_test_app().await;
    let login_body = login(&app, WALLET_A).await;
    let owner_id = login_body["user"]["id"].as_i64().unwrap();

    let projects = ProjectRepository::new(pool);
    let project = projects
        .create(&NewProject {
            name: "boarded".into(),
            description: None,
            owner_id,
            visibility: "Private".into(),
            status: "Active".into(),
            category: "Other".into(),
            start_date: "2026-01-01".into(),
        })
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/kanban/iterations/{}/current", project.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let columns: Vec<&str> = body["board"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(columns, ["Backlog", "Ready", "In progress", "In review", "Done"]);

    // A second fetch reuses the same iteration
    let again = body_json(
        app.oneshot(get(&format!("/api/kanban/iterations/{}/current", project.id)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(again["iteration"]["id"], body["iteration"]["id"]);
}

// ── Likes ──────────────────────────────────────────────────────

#[tokio::test]
async fn like_toggle_round_trips() {
    let (app, pool, _dir) = build_test_app().await;
    let login_body = login(&app, WALLET_A).await;
    let owner_id = login_body["user"]["id"].as_i64().unwrap();

    let projects = ProjectRepository::new(pool.clone());
    let project = projects
        .create(&NewProject {
            name: "likeable".into(),
            description: None,
            owner_id,
            visibility: "Public".into(),
            status: "Active".into(),
            category: "Other".into(),
            start_date: "2026-01-01".into(),
        })
        .await
        .unwrap();

    let toggle = json!({
        "user_wallet_address": WALLET_A,
        "target_type": "project",
        "target_id": project.id,
    });

    let first = body_json(
        app.clone()
            .oneshot(post_json("/api/likes/toggle", toggle.clone()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["isLiked"], true);
    assert_eq!(first["likeCount"], 1);

    let second = body_json(
        app.clone()
            .oneshot(post_json("/api/likes/toggle", toggle))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["isLiked"], false);
    assert_eq!(second["likeCount"], 0);

    // Cached count matches the row count after both toggles
    let cached: i64 = sqlx::query_scalar("SELECT like_count FROM projects WHERE id = ?")
        .bind(project.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(cached, 0);
}

// ── Dataset access control ─────────────────────────────────────

#[tokio::test]
async fn private_dataset_access_respects_permissions_and_expiry() {
    let (app, pool, _dir) = build_test_app().await;
    let owner = login(&app, WALLET_A).await;
    let owner_id = owner["user"]["id"].as_i64().unwrap();
    let stranger = login(&app, WALLET_B).await;
    let stranger_id = stranger["user"]["id"].as_i64().unwrap();

    let datasets = DatasetRepository::new(pool.clone());
    let dataset_id = datasets
        .create_draft(&NewDataset {
            name: "sealed".into(),
            description: None,
            owner_id,
            project_id: None,
            external_link: None,
            privacy_level: "private".into(),
            category: "genomics".into(),
            tags_json: "[]".into(),
            status: "ready".into(),
        })
        .await
        .unwrap();

    // Stranger: 403
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/datasets/{dataset_id}?wallet_address={WALLET_B}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Owner: 200
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/datasets/{dataset_id}?wallet_address={WALLET_A}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Valid permission: 200
    let permission_id = datasets
        .grant_permission(
            dataset_id,
            Some(stranger_id),
            WALLET_B,
            "read",
            None,
            owner_id,
            Some("2999-01-01 00:00:00"),
        )
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/datasets/{dataset_id}?wallet_address={WALLET_B}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Expired permission: 403 again
    sqlx::query("UPDATE dataset_permissions SET expires_at = '2001-01-01 00:00:00' WHERE id = ?")
        .bind(permission_id)
        .execute(&pool)
        .await
        .unwrap();
    let response = app
        .oneshot(get(&format!(
            "/api/datasets/{dataset_id}?wallet_address={WALLET_B}"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ── Misc ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let (app, _pool, _dir) = build_test_app().await;

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn download_missing_file_is_404() {
    let (app, _pool, _dir) = build_test_app().await;

    let response = app.oneshot(get("/api/download/nope.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["msg"], "File not found");
}
