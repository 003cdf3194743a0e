//! Favorite teams and leagues.
//!
//! `is_favorite_match` is the one favorite predicate in the crate: row
//! highlighting, the favorites-only filter, and refresh alerts all call it.

use std::collections::BTreeSet;

use crate::types::{Account, DeskError};

fn normalized(name: &str, field: &str) -> Result<String, DeskError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DeskError::InvalidInput(format!("{field} name is empty")));
    }
    Ok(name.to_string())
}

fn add(set: &mut BTreeSet<String>, name: &str, field: &str) -> Result<(), DeskError> {
    let name = normalized(name, field)?;
    if set.contains(&name) {
        return Err(DeskError::AlreadyFavorite(name));
    }
    set.insert(name);
    Ok(())
}

fn remove(set: &mut BTreeSet<String>, name: &str, field: &str) -> Result<(), DeskError> {
    let name = normalized(name, field)?;
    if !set.remove(&name) {
        return Err(DeskError::NotFavorite(name));
    }
    Ok(())
}

pub fn add_favorite_team(account: &mut Account, team: &str) -> Result<(), DeskError> {
    add(&mut account.favorite_teams, team, "team")
}

pub fn remove_favorite_team(account: &mut Account, team: &str) -> Result<(), DeskError> {
    remove(&mut account.favorite_teams, team, "team")
}

pub fn add_favorite_league(account: &mut Account, league: &str) -> Result<(), DeskError> {
    add(&mut account.favorite_leagues, league, "league")
}

pub fn remove_favorite_league(account: &mut Account, league: &str) -> Result<(), DeskError> {
    remove(&mut account.favorite_leagues, league, "league")
}

/// True if the league is a favorite league or either team is a favorite team.
pub fn is_favorite_match(account: &Account, league: &str, home_team: &str, away_team: &str) -> bool {
    account.favorite_leagues.contains(league)
        || account.favorite_teams.contains(home_team)
        || account.favorite_teams.contains(away_team)
}
