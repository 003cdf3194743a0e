//! Mock odds source for integration testing.
//!
//! Serves a scripted sequence of boards, can be forced to fail, and counts
//! fetches. All in-memory with no network access.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use oddsdesk::odds::OddsSource;
use oddsdesk::types::{BookmakerQuote, DeskError, Matchup, OddsSnapshot, OutcomePrice};

pub struct MockOddsSource {
    boards: Mutex<VecDeque<OddsSnapshot>>,
    /// If set, every fetch fails with this error.
    force_error: Mutex<Option<DeskError>>,
    fetches: AtomicUsize,
}

impl MockOddsSource {
    /// Serve `boards` in order; the last one repeats once the rest are used.
    pub fn new(boards: Vec<OddsSnapshot>) -> Self {
        Self {
            boards: Mutex::new(boards.into()),
            force_error: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_error(&self, err: DeskError) {
        *self.force_error.lock().unwrap() = Some(err);
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OddsSource for MockOddsSource {
    async fn fetch(&self) -> Result<OddsSnapshot, DeskError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.force_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut boards = self.boards.lock().unwrap();
        let board = if boards.len() > 1 {
            boards.pop_front()
        } else {
            boards.front().cloned()
        };
        Ok(board.unwrap_or_else(OddsSnapshot::empty))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Board builders
// ---------------------------------------------------------------------------

pub fn quote(bookmaker: &str, home: (&str, Decimal), away: (&str, Decimal)) -> BookmakerQuote {
    BookmakerQuote {
        bookmaker: bookmaker.to_string(),
        outcomes: vec![
            OutcomePrice { name: home.0.to_string(), price: home.1 },
            OutcomePrice { name: away.0.to_string(), price: away.1 },
        ],
    }
}

pub fn matchup(league: &str, home: &str, away: &str, day: u32, hour: u32) -> Matchup {
    Matchup {
        league: league.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        commence_time: Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap(),
        bookmaker_quotes: vec![
            quote("DraftKings", (home, dec!(-150)), (away, dec!(130))),
            quote("FanDuel", (home, dec!(-145)), (away, dec!(125))),
        ],
    }
}

/// Two NBA games and one EPL game.
pub fn opening_board() -> OddsSnapshot {
    OddsSnapshot::new(vec![
        matchup("NBA", "Los Angeles Lakers", "Boston Celtics", 20, 23),
        matchup("NBA", "Denver Nuggets", "Phoenix Suns", 21, 2),
        matchup("EPL", "Arsenal", "Chelsea", 21, 14),
    ])
}

/// The opening board plus a new Lakers game.
pub fn next_board() -> OddsSnapshot {
    let mut board = opening_board();
    board
        .matchups
        .push(matchup("NBA", "Golden State Warriors", "Los Angeles Lakers", 22, 3));
    board
}
