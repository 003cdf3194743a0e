//! Dashboard: Axum web server exposing the desk as a JSON API.
//!
//! Every user action maps onto one `Request`; the odds board, the ledger
//! and display settings are all reachable over HTTP.
//! CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{run_refresh, AppState, DashboardState};

/// Start the dashboard web server.
///
/// Binds the port up front so a taken port fails startup, then serves in a
/// background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        // Accounts & session
        .route("/api/accounts", post(routes::create_account))
        .route("/api/session", post(routes::login).delete(routes::logout))
        .route("/api/account", get(routes::get_account))
        .route("/api/account/timezone", put(routes::set_timezone))
        // Board
        .route("/api/rows", get(routes::get_rows))
        .route("/api/sort", post(routes::sort_by))
        .route("/api/refresh", post(routes::refresh))
        // Favorites
        .route("/api/favorites/teams", post(routes::add_team))
        .route("/api/favorites/teams/:team", delete(routes::remove_team))
        .route("/api/favorites/leagues", post(routes::add_league))
        .route("/api/favorites/leagues/:league", delete(routes::remove_league))
        // Ledger
        .route("/api/bets", post(routes::place_bet))
        .route("/api/bets/:index/settle", post(routes::settle_bet))
        .route("/api/bets/:index", delete(routes::delete_bet))
        .route("/api/statistics", get(routes::get_statistics))
        // Display settings
        .route("/api/settings", get(routes::get_settings).put(routes::put_settings))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::desk::{Desk, Session};
    use crate::odds::refresher::Refresher;
    use crate::odds::OddsSource;
    use crate::storage::settings::DisplaySettings;
    use crate::storage::{AccountStore, MemoryBackend};
    use crate::types::{BookmakerQuote, DeskError, Matchup, OddsSnapshot, OutcomePrice};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedSource;

    #[async_trait]
    impl OddsSource for FixedSource {
        async fn fetch(&self) -> Result<OddsSnapshot, DeskError> {
            Ok(OddsSnapshot::new(vec![Matchup {
                league: "NBA".into(),
                home_team: "Lakers".into(),
                away_team: "Celtics".into(),
                commence_time: Utc.with_ymd_and_hms(2026, 10, 20, 23, 0, 0).unwrap(),
                bookmaker_quotes: vec![BookmakerQuote {
                    bookmaker: "DraftKings".into(),
                    outcomes: vec![
                        OutcomePrice { name: "Lakers".into(), price: dec!(-150) },
                        OutcomePrice { name: "Celtics".into(), price: dec!(130) },
                    ],
                }],
            }]))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn test_state() -> AppState {
        let store =
            AccountStore::open(Box::new(MemoryBackend::new()), dec!(1000), "UTC").unwrap();
        Arc::new(DashboardState::new(
            Desk::new(store),
            Session::default(),
            Refresher::new(Arc::new(FixedSource), Duration::from_secs(5)),
            DisplaySettings::default(),
            None,
        ))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_account_requires_login() {
        let app = build_router(test_state());
        let (status, body) = call(&app, "GET", "/api/account", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("logged in"));
    }

    #[tokio::test]
    async fn test_create_account_and_duplicate() {
        let app = build_router(test_state());
        let (status, body) =
            call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["kind"], "account");
        assert_eq!(body["data"]["wallet"], 1000.0);

        let (status, _) =
            call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_betting_flow_over_http() {
        let app = build_router(test_state());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/bets",
            Some(json!({
                "game": "Lakers vs Celtics",
                "selections": [{"outcome": "Celtics", "bookmaker": "DraftKings", "price": 130}],
                "total_stake": 100
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["wallet"], 900.0);

        let (status, body) =
            call(&app, "POST", "/api/bets/0/settle", Some(json!({"outcome": "win"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["credited"], 230.0);

        let (status, _) =
            call(&app, "POST", "/api/bets/0/settle", Some(json!({"outcome": "loss"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "GET", "/api/statistics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["wins"], 1);

        let (status, _) = call(&app, "DELETE", "/api/bets/7", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_refresh_then_rows() {
        let app = build_router(test_state());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        call(&app, "POST", "/api/favorites/teams", Some(json!({"name": "Lakers"}))).await;

        let (status, body) = call(&app, "POST", "/api/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matchups"], 1);
        assert_eq!(body["alerts"].as_array().unwrap().len(), 1);

        let (status, body) =
            call(&app, "GET", "/api/rows?league=NBA&favorites_only=true", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["bookmaker"], "DraftKings");
        assert_eq!(rows[0]["is_favorite"], true);

        let (_, body) = call(&app, "GET", "/api/rows?league=EPL", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_favorite_removal_by_path() {
        let app = build_router(test_state());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        call(&app, "POST", "/api/favorites/leagues", Some(json!({"name": "NBA"}))).await;

        let (status, body) = call(&app, "DELETE", "/api/favorites/leagues/NBA", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["favorite_leagues"].as_array().unwrap().is_empty());

        let (status, _) = call(&app, "DELETE", "/api/favorites/leagues/NBA", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sort_updates_settings() {
        let state = test_state();
        let app = build_router(state.clone());

        let (status, body) = call(&app, "POST", "/api/sort", Some(json!({"column": "bookmaker"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["column"], "bookmaker");
        assert_eq!(body["data"]["descending"], false);

        let (_, settings) = call(&app, "GET", "/api/settings", None).await;
        assert_eq!(settings["sort"]["column"], "bookmaker");

        let (status, body) =
            call(&app, "POST", "/api/sort", Some(json!({"column": "Home Team"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["column"], "home_team");

        let (status, _) = call(&app, "POST", "/api/sort", Some(json!({"column": "score"}))).await;
        assert!(status.is_client_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sorts_keep_settings_in_step() {
        let state = test_state();
        let app = build_router(state.clone());
        let columns = ["league", "odds", "bookmaker", "home", "away", "time"];

        let tasks: Vec<_> = (0..48)
            .map(|i| {
                let app = app.clone();
                let column = columns[i % columns.len()];
                tokio::spawn(async move {
                    call(&app, "POST", "/api/sort", Some(json!({ "column": column }))).await
                })
            })
            .collect();
        for task in tasks {
            let (status, _) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        let session_sort = state.session.read().await.sort;
        assert_eq!(state.settings.read().await.sort, session_sort);
    }

    #[tokio::test]
    async fn test_settle_accepts_outcome_aliases() {
        let app = build_router(test_state());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        let slip = json!({
            "game": "Lakers vs Celtics",
            "selections": [
                {"outcome": "Lakers", "bookmaker": "DraftKings", "price": -150},
                {"outcome": "Celtics", "bookmaker": "DraftKings", "price": 130}
            ],
            "total_stake": 100
        });
        call(&app, "POST", "/api/bets", Some(slip)).await;

        let (status, _) =
            call(&app, "POST", "/api/bets/0/settle", Some(json!({"outcome": "Won"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            call(&app, "POST", "/api/bets/1/settle", Some(json!({"outcome": "lost"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            call(&app, "POST", "/api/bets/1/settle", Some(json!({"outcome": "push"}))).await;
        assert!(status.is_client_error());

        let (_, body) = call(&app, "GET", "/api/statistics", None).await;
        assert_eq!(body["data"]["wins"], 1);
        assert_eq!(body["data"]["losses"], 1);
    }

    #[tokio::test]
    async fn test_over_wallet_stake_is_insufficient_funds_over_http() {
        let app = build_router(test_state());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/bets",
            Some(json!({
                "game": "Lakers vs Celtics",
                "selections": [{"outcome": "Celtics", "bookmaker": "DraftKings", "price": 50}],
                "total_stake": 1000.005
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("Insufficient funds"));
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let app = build_router(test_state());
        let (_, mut settings) = call(&app, "GET", "/api/settings", None).await;
        settings["font_size"] = json!(99);
        let (status, _) = call(&app, "PUT", "/api/settings", Some(settings)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logout() {
        let state = test_state();
        let app = build_router(state.clone());
        call(&app, "POST", "/api/accounts", Some(json!({"username": "alice"}))).await;
        let (status, body) = call(&app, "DELETE", "/api/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "logged_out");
        assert!(!state.session.read().await.is_authenticated());
    }
}
