//! Desk: the command surface every front end drives.
//!
//! A `Session` carries who is logged in and how the board is sorted. Each
//! user action is one `Request`; `Desk::handle` validates it against the
//! session, applies it through the account store (so every mutation is
//! persisted or rolled back as a unit) and answers with a `Response`.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::alerts::{favorite_alerts, FavoriteAlert};
use super::favorites;
use super::ledger;
use super::rows::{build_rows, Row, RowQuery, SortColumn, SortState};
use crate::storage::AccountStore;
use crate::types::{
    parse_timezone, Account, Bet, DeskError, OddsSnapshot, Selection, Settlement, Statistics,
};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-user interaction state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    username: Option<String>,
    pub sort: SortState,
}

impl Session {
    pub fn new(sort: SortState) -> Self {
        Self { username: None, sort }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    fn require_user(&self) -> Result<&str, DeskError> {
        self.username().ok_or(DeskError::NotAuthenticated)
    }
}

// ---------------------------------------------------------------------------
// Requests & responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateAccount { username: String, timezone: Option<String> },
    Login { username: String },
    Logout,
    SetTimezone { timezone: String },
    AddFavoriteTeam { team: String },
    RemoveFavoriteTeam { team: String },
    AddFavoriteLeague { league: String },
    RemoveFavoriteLeague { league: String },
    PlaceBet { game: String, selections: Vec<Selection>, total_stake: Decimal },
    SettleBet { index: usize, outcome: Settlement },
    DeleteBet { index: usize },
    Account,
    Statistics,
    SortBy { column: SortColumn },
    Rows(RowQuery),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Account(Account),
    LoggedOut,
    BetsPlaced { bets: Vec<Bet>, wallet: Decimal },
    Settled { bet: Bet, credited: Decimal, wallet: Decimal },
    Deleted { bet: Bet, wallet: Decimal },
    Statistics(Statistics),
    Sort(SortState),
    Rows(Vec<Row>),
}

// ---------------------------------------------------------------------------
// Desk
// ---------------------------------------------------------------------------

/// Owns the account store and the current odds board.
pub struct Desk {
    store: AccountStore,
    snapshot: Option<OddsSnapshot>,
}

impl Desk {
    pub fn new(store: AccountStore) -> Self {
        Self { store, snapshot: None }
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// The board as of the last successful refresh.
    pub fn snapshot(&self) -> Option<&OddsSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn save(&self) -> Result<(), DeskError> {
        self.store.save()
    }

    /// The logged-in account, if any.
    pub fn current_account(&self, session: &Session) -> Option<&Account> {
        session
            .username()
            .and_then(|u| self.store.accounts().get(u))
    }

    /// Swap in a fresh board. Returns favorite matchups that were not on the
    /// previous one, for the logged-in account.
    pub fn replace_snapshot(
        &mut self,
        snapshot: OddsSnapshot,
        session: &Session,
    ) -> Vec<FavoriteAlert> {
        let alerts = match self.current_account(session) {
            Some(account) => favorite_alerts(self.snapshot.as_ref(), &snapshot, account),
            None => Vec::new(),
        };
        info!(
            matchups = snapshot.len(),
            leagues = snapshot.leagues().len(),
            alerts = alerts.len(),
            "Odds board replaced"
        );
        self.snapshot = Some(snapshot);
        alerts
    }

    /// Apply one request on behalf of `session`.
    pub fn handle(
        &mut self,
        session: &mut Session,
        request: Request,
    ) -> Result<Response, DeskError> {
        match request {
            Request::CreateAccount { username, timezone } => {
                let account = self.store.create_account(&username, timezone.as_deref())?;
                session.username = Some(account.username.clone());
                Ok(Response::Account(account))
            }

            Request::Login { username } => {
                let account = self.store.find_account(username.trim())?.clone();
                info!(user = %account.username, "Logged in");
                session.username = Some(account.username.clone());
                Ok(Response::Account(account))
            }

            Request::Logout => {
                if let Some(user) = session.username.take() {
                    info!(user = %user, "Logged out");
                }
                Ok(Response::LoggedOut)
            }

            Request::SetTimezone { timezone } => {
                let user = session.require_user()?.to_string();
                parse_timezone(&timezone)?;
                let account = self.store.update(&user, |a| {
                    a.timezone = timezone.trim().to_string();
                    Ok(a.clone())
                })?;
                info!(user = %user, timezone = %account.timezone, "Timezone changed");
                Ok(Response::Account(account))
            }

            Request::AddFavoriteTeam { team } => {
                self.mutate(session, |a| favorites::add_favorite_team(a, &team))
            }
            Request::RemoveFavoriteTeam { team } => {
                self.mutate(session, |a| favorites::remove_favorite_team(a, &team))
            }
            Request::AddFavoriteLeague { league } => {
                self.mutate(session, |a| favorites::add_favorite_league(a, &league))
            }
            Request::RemoveFavoriteLeague { league } => {
                self.mutate(session, |a| favorites::remove_favorite_league(a, &league))
            }

            Request::PlaceBet { game, selections, total_stake } => {
                let user = session.require_user()?.to_string();
                let (bets, wallet) = self.store.update(&user, |a| {
                    let bets = ledger::place_bet(a, &game, &selections, total_stake)?;
                    Ok((bets, a.wallet))
                })?;
                Ok(Response::BetsPlaced { bets, wallet })
            }

            Request::SettleBet { index, outcome } => {
                let user = session.require_user()?.to_string();
                let (bet, credited, wallet) = self.store.update(&user, |a| {
                    let credited = ledger::settle_bet(a, index, outcome)?;
                    Ok((a.bets[index].clone(), credited, a.wallet))
                })?;
                Ok(Response::Settled { bet, credited, wallet })
            }

            Request::DeleteBet { index } => {
                let user = session.require_user()?.to_string();
                let (bet, wallet) = self.store.update(&user, |a| {
                    let bet = ledger::delete_bet(a, index)?;
                    Ok((bet, a.wallet))
                })?;
                Ok(Response::Deleted { bet, wallet })
            }

            Request::Account => {
                let user = session.require_user()?;
                Ok(Response::Account(self.store.find_account(user)?.clone()))
            }

            Request::Statistics => {
                let user = session.require_user()?;
                let account = self.store.find_account(user)?;
                Ok(Response::Statistics(ledger::compute_statistics(account)?))
            }

            Request::SortBy { column } => {
                session.sort.toggle(column);
                Ok(Response::Sort(session.sort))
            }

            Request::Rows(query) => {
                let rows = match &self.snapshot {
                    Some(snapshot) => {
                        let account = self.current_account(session);
                        build_rows(snapshot, &query, account, session.sort)
                    }
                    None => {
                        warn!("Rows requested before the first refresh");
                        Vec::new()
                    }
                };
                Ok(Response::Rows(rows))
            }
        }
    }

    /// Run a favorites change for the session account and answer with the
    /// updated account.
    fn mutate(
        &mut self,
        session: &Session,
        f: impl FnOnce(&mut Account) -> Result<(), DeskError>,
    ) -> Result<Response, DeskError> {
        let user = session.require_user()?.to_string();
        let account = self.store.update(&user, |a| {
            f(a)?;
            Ok(a.clone())
        })?;
        Ok(Response::Account(account))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
