//! Shared types for the ODDSDESK core.
//!
//! These types form the data model used across all modules: the odds
//! snapshot handed over by the fetch layer, the account and bet records
//! owned by the store, and the error type every operation returns.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::engine::ledger;

/// Timezone used when an account does not name one.
pub const DEFAULT_TIMEZONE: &str = "UTC";

// ---------------------------------------------------------------------------
// Odds snapshot
// ---------------------------------------------------------------------------

/// A single outcome price quoted by a bookmaker, in American odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrice {
    pub name: String,
    pub price: Decimal,
}

impl fmt::Display for OutcomePrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, format_american(self.price))
    }
}

/// All outcomes one bookmaker quotes for a matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerQuote {
    pub bookmaker: String,
    pub outcomes: Vec<OutcomePrice>,
}

impl BookmakerQuote {
    /// One-line odds summary, e.g. `"Lakers @ -150, Celtics @ +130"`.
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One game on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub bookmaker_quotes: Vec<BookmakerQuote>,
}

impl Matchup {
    /// Description stored on bets placed against this game.
    pub fn description(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

impl fmt::Display for Matchup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} bookmakers, {})",
            self.league,
            self.description(),
            self.bookmaker_quotes.len(),
            self.commence_time.to_rfc3339(),
        )
    }
}

/// A normalised fetch response. Never merged: each fetch replaces the
/// previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub matchups: Vec<Matchup>,
}

impl OddsSnapshot {
    pub fn new(matchups: Vec<Matchup>) -> Self {
        Self {
            fetched_at: Utc::now(),
            matchups,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.matchups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchups.is_empty()
    }

    /// Distinct leagues on the board, sorted (feeds the league filter).
    pub fn leagues(&self) -> BTreeSet<String> {
        self.matchups.iter().map(|m| m.league.clone()).collect()
    }
}

/// Render an American price the way books print it: `+150`, `-110`.
pub fn format_american(price: Decimal) -> String {
    let price = price.normalize();
    if price > Decimal::ZERO {
        format!("+{price}")
    } else {
        price.to_string()
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Lifecycle of a bet. Only `Pending` can move, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetResult::Pending => write!(f, "Pending"),
            BetResult::Win => write!(f, "Win"),
            BetResult::Loss => write!(f, "Loss"),
        }
    }
}

/// The outcome a pending bet can be settled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Settlement {
    Win,
    Loss,
}

impl From<Settlement> for BetResult {
    fn from(s: Settlement) -> Self {
        match s {
            Settlement::Win => BetResult::Win,
            Settlement::Loss => BetResult::Loss,
        }
    }
}

/// Case-insensitive; accepts `win`/`won` and `loss`/`lost`.
impl std::str::FromStr for Settlement {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "won" => Ok(Settlement::Win),
            "loss" | "lost" | "lose" => Ok(Settlement::Loss),
            _ => Err(DeskError::InvalidInput(format!("unknown settlement: {s}"))),
        }
    }
}

impl TryFrom<String> for Settlement {
    type Error = DeskError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One leg of a bet placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub outcome: String,
    pub bookmaker: String,
    pub price: Decimal,
}

/// A recorded bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bet {
    pub game_description: String,
    pub outcome_label: String,
    pub bookmaker: String,
    pub stake: Decimal,
    /// American odds.
    pub price: Decimal,
    pub result: BetResult,
}

impl Bet {
    pub fn is_pending(&self) -> bool {
        self.result == BetResult::Pending
    }

    /// Amount credited to the wallet if this bet wins (stake included).
    pub fn payout(&self) -> Result<Decimal, DeskError> {
        ledger::payout(self.stake, self.price)
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} @ {} ({}) | stake ${:.2} | {}",
            self.game_description,
            self.outcome_label,
            format_american(self.price),
            self.bookmaker,
            self.stake,
            self.result,
        )
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A simulated user account with a play-money wallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub username: String,
    pub favorite_teams: BTreeSet<String>,
    pub favorite_leagues: BTreeSet<String>,
    pub wallet: Decimal,
    pub bets: Vec<Bet>,
    pub wins: u32,
    pub losses: u32,
    /// IANA zone id used to localise commence times.
    pub timezone: String,
}

impl Account {
    pub fn new(username: impl Into<String>, wallet: Decimal, timezone: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            favorite_teams: BTreeSet::new(),
            favorite_leagues: BTreeSet::new(),
            wallet,
            bets: Vec::new(),
            wins: 0,
            losses: 0,
            timezone: timezone.into(),
        }
    }

    /// Parsed timezone. Stored zones are validated on the way in, so the
    /// UTC fallback only covers records edited by hand.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn pending_bets(&self) -> usize {
        self.bets.iter().filter(|b| b.is_pending()).count()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | wallet=${:.2} | bets={} (W{}/L{}, {} pending) | tz={}",
            self.username,
            self.wallet,
            self.bets.len(),
            self.wins,
            self.losses,
            self.pending_bets(),
            self.timezone,
        )
    }
}

/// Parse and validate an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, DeskError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DeskError::InvalidTimezone(name.to_string()))
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate betting record for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    /// 0–100, two decimal places.
    pub win_percentage: Decimal,
    pub total_staked: Decimal,
    pub total_earnings: Decimal,
    pub net_profit_loss: Decimal,
    pub biggest_win: Decimal,
    pub biggest_loss: Decimal,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bets={} (W{}/L{}/P{}) | win%={}% | staked=${:.2} | earned=${:.2} | net=${:.2}",
            self.total_bets,
            self.wins,
            self.losses,
            self.pending,
            self.win_percentage,
            self.total_staked,
            self.total_earnings,
            self.net_profit_loss,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything a desk operation can fail with.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeskError {
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already a favorite: {0}")]
    AlreadyFavorite(String),

    #[error("Not a favorite: {0}")]
    NotFavorite(String),

    #[error("No selections in bet slip")]
    NoSelections,

    #[error("Invalid stake ${stake}: {reason}")]
    InvalidStake { stake: Decimal, reason: String },

    #[error("Invalid American price: {0}")]
    InvalidPrice(Decimal),

    #[error("Amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Bet #{index} already settled as {result}")]
    AlreadySettled { index: usize, result: BetResult },

    #[error("Bet index {index} out of range ({len} bets)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Account store {path} is corrupt: {message}")]
    StorageCorrupt { path: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Odds fetch failed: {0}")]
    Fetch(String),

    #[error("Odds fetch timed out after {secs}s")]
    FetchTimeout { secs: u64 },

    #[error("An odds refresh is already in flight")]
    RefreshInFlight,
}

impl DeskError {
    /// Expected, recoverable validation failures the user can fix by
    /// re-entering input. Everything else is an infrastructure failure.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            DeskError::StorageCorrupt { .. }
                | DeskError::Storage(_)
                | DeskError::Fetch(_)
                | DeskError::FetchTimeout { .. }
                | DeskError::RefreshInFlight
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
