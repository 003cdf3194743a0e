//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! Locks are always taken desk first, then session, then settings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::engine::alerts::FavoriteAlert;
use crate::engine::desk::{Desk, Request, Response, Session};
use crate::engine::rows::{RowQuery, SortColumn, ALL_LEAGUES};
use crate::odds::refresher::Refresher;
use crate::storage::settings::{save_settings, DisplaySettings};
use crate::types::{DeskError, Selection, Settlement};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub desk: RwLock<Desk>,
    pub session: RwLock<Session>,
    pub settings: RwLock<DisplaySettings>,
    pub refresher: Refresher,
    /// Where display settings are saved. `None` keeps them in memory.
    settings_path: Option<PathBuf>,
}

impl DashboardState {
    pub fn new(
        desk: Desk,
        session: Session,
        refresher: Refresher,
        settings: DisplaySettings,
        settings_path: Option<PathBuf>,
    ) -> Self {
        Self {
            desk: RwLock::new(desk),
            session: RwLock::new(session),
            settings: RwLock::new(settings),
            refresher,
            settings_path,
        }
    }

    /// Run one request against the desk under the session lock.
    pub async fn dispatch(&self, request: Request) -> Result<Response, DeskError> {
        let mut desk = self.desk.write().await;
        let mut session = self.session.write().await;
        desk.handle(&mut session, request)
    }

    /// Toggle the session sort and record it in the display settings.
    /// Settings are written while the session lock is held, so they always
    /// match the last sort applied.
    pub async fn sort_by(&self, column: SortColumn) -> Result<Response, DeskError> {
        let mut desk = self.desk.write().await;
        let mut session = self.session.write().await;
        let resp = desk.handle(&mut session, Request::SortBy { column })?;
        if let Response::Sort(sort) = &resp {
            let mut settings = self.settings.write().await;
            settings.sort = *sort;
            // The sort still applies for this session if the save fails.
            if let Err(e) = self.persist_settings(&settings) {
                warn!(error = %e, "Failed to save sort preference");
            }
        }
        Ok(resp)
    }

    /// Persist display settings, if a path is configured.
    fn persist_settings(&self, settings: &DisplaySettings) -> Result<(), DeskError> {
        match &self.settings_path {
            Some(path) => save_settings(path, settings),
            None => settings.validate(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub source: String,
    pub matchups: usize,
    pub leagues: Vec<String>,
    pub alerts: Vec<FavoriteAlert>,
}

/// Fetch a new board and swap it in. The fetch runs without holding any
/// lock; only the replacement takes the desk.
pub async fn run_refresh(state: &DashboardState) -> Result<RefreshSummary, DeskError> {
    let snapshot = state.refresher.refresh().await?;
    let matchups = snapshot.len();
    let leagues = snapshot.leagues().into_iter().collect();

    let mut desk = state.desk.write().await;
    let session = state.session.read().await;
    let alerts = desk.replace_snapshot(snapshot, &session);

    for alert in &alerts {
        info!(
            user = session.username().unwrap_or_default(),
            league = %alert.league,
            game = format!("{} vs {}", alert.home_team, alert.away_team),
            commence = %alert.commence_time,
            "Favorite match on the board"
        );
    }

    Ok(RefreshSummary {
        source: state.refresher.source_name().to_string(),
        matchups,
        leagues,
        alerts,
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `DeskError` rendered as an HTTP error with a JSON body.
#[derive(Debug)]
pub struct ApiError(pub DeskError);

impl From<DeskError> for ApiError {
    fn from(e: DeskError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DeskError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            DeskError::AccountNotFound(_) | DeskError::IndexOutOfRange { .. } => {
                StatusCode::NOT_FOUND
            }
            DeskError::DuplicateUsername(_)
            | DeskError::AlreadyFavorite(_)
            | DeskError::AlreadySettled { .. }
            | DeskError::RefreshInFlight => StatusCode::CONFLICT,
            DeskError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DeskError::Fetch(_) => StatusCode::BAD_GATEWAY,
            DeskError::FetchTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DeskError::Storage(_) | DeskError::StorageCorrupt { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> HttpResponse {
        let status = self.status();
        if self.0.is_user_error() {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn dispatch(state: &DashboardState, request: Request) -> ApiResult<Response> {
    Ok(Json(state.dispatch(request).await?))
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAccountBody {
    pub username: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct TimezoneBody {
    pub timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetBody {
    pub game: String,
    pub selections: Vec<Selection>,
    pub total_stake: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SettleBody {
    pub outcome: Settlement,
}

#[derive(Debug, Deserialize)]
pub struct SortBody {
    pub column: SortColumn,
}

/// Query string for `GET /api/rows`. Every filter is optional.
#[derive(Debug, Default, Deserialize)]
pub struct RowsParams {
    pub league: Option<String>,
    pub team: Option<String>,
    #[serde(default)]
    pub favorites_only: bool,
}

impl From<RowsParams> for RowQuery {
    fn from(p: RowsParams) -> Self {
        RowQuery {
            league: p
                .league
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| ALL_LEAGUES.to_string()),
            team: p.team,
            favorites_only: p.favorites_only,
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /api/accounts
pub async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountBody>,
) -> Result<(StatusCode, Json<Response>), ApiError> {
    let resp = state
        .dispatch(Request::CreateAccount {
            username: body.username,
            timezone: body.timezone,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// POST /api/session
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Response> {
    dispatch(&state, Request::Login { username: body.username }).await
}

/// DELETE /api/session
pub async fn logout(State(state): State<AppState>) -> ApiResult<Response> {
    dispatch(&state, Request::Logout).await
}

/// GET /api/account
pub async fn get_account(State(state): State<AppState>) -> ApiResult<Response> {
    dispatch(&state, Request::Account).await
}

/// PUT /api/account/timezone
pub async fn set_timezone(
    State(state): State<AppState>,
    Json(body): Json<TimezoneBody>,
) -> ApiResult<Response> {
    dispatch(&state, Request::SetTimezone { timezone: body.timezone }).await
}

/// GET /api/rows
pub async fn get_rows(
    State(state): State<AppState>,
    Query(params): Query<RowsParams>,
) -> ApiResult<Response> {
    dispatch(&state, Request::Rows(params.into())).await
}

/// POST /api/sort
pub async fn sort_by(
    State(state): State<AppState>,
    Json(body): Json<SortBody>,
) -> ApiResult<Response> {
    Ok(Json(state.sort_by(body.column).await?))
}

/// POST /api/favorites/teams
pub async fn add_team(
    State(state): State<AppState>,
    Json(body): Json<NameBody>,
) -> ApiResult<Response> {
    dispatch(&state, Request::AddFavoriteTeam { team: body.name }).await
}

/// DELETE /api/favorites/teams/:team
pub async fn remove_team(
    State(state): State<AppState>,
    Path(team): Path<String>,
) -> ApiResult<Response> {
    dispatch(&state, Request::RemoveFavoriteTeam { team }).await
}

/// POST /api/favorites/leagues
pub async fn add_league(
    State(state): State<AppState>,
    Json(body): Json<NameBody>,
) -> ApiResult<Response> {
    dispatch(&state, Request::AddFavoriteLeague { league: body.name }).await
}

/// DELETE /api/favorites/leagues/:league
pub async fn remove_league(
    State(state): State<AppState>,
    Path(league): Path<String>,
) -> ApiResult<Response> {
    dispatch(&state, Request::RemoveFavoriteLeague { league }).await
}

/// POST /api/bets
pub async fn place_bet(
    State(state): State<AppState>,
    Json(body): Json<PlaceBetBody>,
) -> Result<(StatusCode, Json<Response>), ApiError> {
    let resp = state
        .dispatch(Request::PlaceBet {
            game: body.game,
            selections: body.selections,
            total_stake: body.total_stake,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// POST /api/bets/:index/settle
pub async fn settle_bet(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(body): Json<SettleBody>,
) -> ApiResult<Response> {
    dispatch(&state, Request::SettleBet { index, outcome: body.outcome }).await
}

/// DELETE /api/bets/:index
pub async fn delete_bet(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<Response> {
    dispatch(&state, Request::DeleteBet { index }).await
}

/// GET /api/statistics
pub async fn get_statistics(State(state): State<AppState>) -> ApiResult<Response> {
    dispatch(&state, Request::Statistics).await
}

/// POST /api/refresh
pub async fn refresh(State(state): State<AppState>) -> ApiResult<RefreshSummary> {
    Ok(Json(run_refresh(&state).await?))
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<DisplaySettings> {
    Json(state.settings.read().await.clone())
}

/// PUT /api/settings
pub async fn put_settings(
    State(state): State<AppState>,
    Json(new): Json<DisplaySettings>,
) -> ApiResult<DisplaySettings> {
    let mut session = state.session.write().await;
    let mut settings = state.settings.write().await;
    state.persist_settings(&new)?;
    session.sort = new.sort;
    *settings = new.clone();
    info!(font_size = new.font_size, "Display settings updated");
    Ok(Json(new))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (DeskError::NotAuthenticated, StatusCode::UNAUTHORIZED),
            (DeskError::AccountNotFound("x".into()), StatusCode::NOT_FOUND),
            (DeskError::DuplicateUsername("x".into()), StatusCode::CONFLICT),
            (DeskError::RefreshInFlight, StatusCode::CONFLICT),
            (
                DeskError::InsufficientFunds { needed: dec!(10), available: dec!(5) },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DeskError::InvalidPrice(dec!(50)), StatusCode::BAD_REQUEST),
            (DeskError::AmountOutOfRange("payout".into()), StatusCode::BAD_REQUEST),
            (DeskError::FetchTimeout { secs: 15 }, StatusCode::GATEWAY_TIMEOUT),
            (DeskError::Storage("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_rows_params_default_to_all_leagues() {
        let q: RowQuery = RowsParams::default().into();
        assert_eq!(q, RowQuery::default());

        let q: RowQuery = RowsParams {
            league: Some("NBA".into()),
            team: Some("Lakers".into()),
            favorites_only: true,
        }
        .into();
        assert_eq!(q.league, "NBA");
        assert_eq!(q.team.as_deref(), Some("Lakers"));
        assert!(q.favorites_only);
    }

    #[test]
    fn test_place_bet_body_accepts_numbers() {
        let body: PlaceBetBody = serde_json::from_str(
            r#"{"game": "Lakers vs Celtics",
                "selections": [{"outcome": "Lakers", "bookmaker": "DraftKings", "price": -150}],
                "total_stake": 25.5}"#,
        )
        .unwrap();
        assert_eq!(body.total_stake, dec!(25.5));
        assert_eq!(body.selections[0].price, dec!(-150));
    }
}
