//! Filter/sort engine: turns an odds snapshot into display rows.
//!
//! Pure: the same snapshot, query, account and sort state always produce
//! the same rows.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::favorites::is_favorite_match;
use crate::types::{Account, DeskError, OddsSnapshot};

/// League filter value that disables league filtering.
pub const ALL_LEAGUES: &str = "All";

const NO_BOOKMAKER: &str = "N/A";
const NO_ODDS: &str = "No bookmakers available";

// ---------------------------------------------------------------------------
// Columns & sort state
// ---------------------------------------------------------------------------

/// Sortable board columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SortColumn {
    League,
    HomeTeam,
    AwayTeam,
    Odds,
    Bookmaker,
    CommenceTime,
}

impl SortColumn {
    /// Default display order.
    pub const ALL: &'static [SortColumn] = &[
        SortColumn::League,
        SortColumn::HomeTeam,
        SortColumn::AwayTeam,
        SortColumn::Odds,
        SortColumn::Bookmaker,
        SortColumn::CommenceTime,
    ];
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortColumn::League => write!(f, "League"),
            SortColumn::HomeTeam => write!(f, "Home Team"),
            SortColumn::AwayTeam => write!(f, "Away Team"),
            SortColumn::Odds => write!(f, "Odds"),
            SortColumn::Bookmaker => write!(f, "Bookmaker"),
            SortColumn::CommenceTime => write!(f, "Commence Time"),
        }
    }
}

impl std::str::FromStr for SortColumn {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "league" => Ok(SortColumn::League),
            "home_team" | "home" => Ok(SortColumn::HomeTeam),
            "away_team" | "away" => Ok(SortColumn::AwayTeam),
            "odds" => Ok(SortColumn::Odds),
            "bookmaker" => Ok(SortColumn::Bookmaker),
            "commence_time" | "time" => Ok(SortColumn::CommenceTime),
            _ => Err(DeskError::InvalidInput(format!("unknown column: {s}"))),
        }
    }
}

impl TryFrom<String> for SortColumn {
    type Error = DeskError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Current sort column and direction. No column means feed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: Option<SortColumn>,
    pub descending: bool,
}

impl SortState {
    pub fn by(column: SortColumn) -> Self {
        Self {
            column: Some(column),
            descending: false,
        }
    }

    /// Header click: same column flips direction, a new column starts
    /// ascending.
    pub fn toggle(&mut self, column: SortColumn) {
        if self.column == Some(column) {
            self.descending = !self.descending;
        } else {
            self.column = Some(column);
            self.descending = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Query & rows
// ---------------------------------------------------------------------------

/// User-entered filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuery {
    /// Exact league name, or `"All"`.
    pub league: String,
    /// Exact home or away team name. Empty or `None` disables the filter.
    pub team: Option<String>,
    pub favorites_only: bool,
}

impl Default for RowQuery {
    fn default() -> Self {
        Self {
            league: ALL_LEAGUES.to_string(),
            team: None,
            favorites_only: false,
        }
    }
}

impl RowQuery {
    fn team_filter(&self) -> Option<&str> {
        self.team.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// One display row: a matchup as quoted by one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub odds: String,
    pub bookmaker: String,
    pub commence_time: DateTime<Utc>,
    pub local_commence_time: String,
    pub is_favorite: bool,
}

/// Build filtered, sorted rows for display.
pub fn build_rows(
    snapshot: &OddsSnapshot,
    query: &RowQuery,
    account: Option<&Account>,
    sort: SortState,
) -> Vec<Row> {
    let team = query.team_filter();
    let mut rows = Vec::new();

    for m in &snapshot.matchups {
        if query.league != ALL_LEAGUES && m.league != query.league {
            continue;
        }
        // Exact equality, not substring containment.
        if let Some(team) = team {
            if m.home_team != team && m.away_team != team {
                continue;
            }
        }

        let is_favorite = account
            .map(|a| is_favorite_match(a, &m.league, &m.home_team, &m.away_team))
            .unwrap_or(false);
        if query.favorites_only && !is_favorite {
            continue;
        }

        let local_commence_time = localize(m.commence_time, account);
        let row = |odds: String, bookmaker: String| Row {
            league: m.league.clone(),
            home_team: m.home_team.clone(),
            away_team: m.away_team.clone(),
            odds,
            bookmaker,
            commence_time: m.commence_time,
            local_commence_time: local_commence_time.clone(),
            is_favorite,
        };

        if m.bookmaker_quotes.is_empty() {
            rows.push(row(NO_ODDS.to_string(), NO_BOOKMAKER.to_string()));
        } else {
            for quote in &m.bookmaker_quotes {
                rows.push(row(quote.summary(), quote.bookmaker.clone()));
            }
        }
    }

    sort_rows(&mut rows, sort);
    rows
}

/// Stable sort by the selected column.
pub fn sort_rows(rows: &mut [Row], sort: SortState) {
    let Some(column) = sort.column else {
        return;
    };
    rows.sort_by(|a, b| {
        let ord = compare(a, b, column);
        if sort.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn compare(a: &Row, b: &Row, column: SortColumn) -> Ordering {
    match column {
        SortColumn::League => a.league.cmp(&b.league),
        // Paired keys keep both sides of a matchup adjacent.
        SortColumn::HomeTeam => (&a.home_team, &a.away_team).cmp(&(&b.home_team, &b.away_team)),
        SortColumn::AwayTeam => (&a.away_team, &a.home_team).cmp(&(&b.away_team, &b.home_team)),
        SortColumn::Odds => a.odds.cmp(&b.odds),
        SortColumn::Bookmaker => a.bookmaker.cmp(&b.bookmaker),
        SortColumn::CommenceTime => a.commence_time.cmp(&b.commence_time),
    }
}

/// Account timezone if logged in, raw feed time otherwise.
fn localize(time: DateTime<Utc>, account: Option<&Account>) -> String {
    match account {
        Some(a) => time.with_timezone(&a.tz()).format("%Y-%m-%d %H:%M %Z").to_string(),
        None => time.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
