//! Favorite-match alerts raised when a refresh brings new games onto the board.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use super::favorites::is_favorite_match;
use crate::types::{Account, Matchup, OddsSnapshot};

/// A favorite matchup that was not on the previous board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FavoriteAlert {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
}

type MatchKey<'a> = (&'a str, &'a str, &'a str, DateTime<Utc>);

fn key(m: &Matchup) -> MatchKey<'_> {
    (&m.league, &m.home_team, &m.away_team, m.commence_time)
}

/// Favorite matchups in `current` that `previous` did not have. With no
/// previous snapshot every favorite on the board is new.
pub fn favorite_alerts(
    previous: Option<&OddsSnapshot>,
    current: &OddsSnapshot,
    account: &Account,
) -> Vec<FavoriteAlert> {
    let seen: HashSet<MatchKey<'_>> = previous
        .map(|p| p.matchups.iter().map(key).collect())
        .unwrap_or_default();

    current
        .matchups
        .iter()
        .filter(|m| is_favorite_match(account, &m.league, &m.home_team, &m.away_team))
        .filter(|m| !seen.contains(&key(m)))
        .map(|m| FavoriteAlert {
            league: m.league.clone(),
            home_team: m.home_team.clone(),
            away_team: m.away_team.clone(),
            commence_time: m.commence_time,
        })
        .collect()
}
