//! The Odds API integration.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Endpoint: `GET /v4/sports/{sport}/odds?regions=..&markets=..&oddsFormat=..`
//! Auth: `apiKey` query parameter. Usage is reported in the
//! `x-requests-remaining` / `x-requests-used` response headers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::OddsSource;
use crate::config::OddsConfig;
use crate::types::{BookmakerQuote, DeskError, Matchup, OddsSnapshot, OutcomePrice};

const SOURCE_NAME: &str = "the-odds-api";

/// Placeholder for fields the feed leaves out.
const MISSING: &str = "N/A";

// ---------------------------------------------------------------------------
// API response types (The Odds API JSON → Rust)
// ---------------------------------------------------------------------------

/// One game from `/v4/sports/{sport}/odds`. Only the fields we use.
#[derive(Debug, Deserialize)]
struct ApiGame {
    #[serde(default)]
    sport_title: Option<String>,
    #[serde(default)]
    home_team: Option<String>,
    #[serde(default)]
    away_team: Option<String>,
    commence_time: DateTime<Utc>,
    #[serde(default)]
    bookmakers: Vec<ApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct ApiBookmaker {
    title: String,
    #[serde(default)]
    markets: Vec<ApiMarket>,
}

/// A market such as `h2h` (moneyline) or `spreads`.
#[derive(Debug, Deserialize)]
struct ApiMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<ApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct ApiOutcome {
    name: String,
    price: Decimal,
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

fn normalize(games: Vec<ApiGame>, market: &str) -> OddsSnapshot {
    let matchups = games
        .into_iter()
        .map(|game| {
            let bookmaker_quotes = game
                .bookmakers
                .into_iter()
                .filter_map(|bm| {
                    // Prefer the requested market; fall back to the first one listed.
                    let idx = bm.markets.iter().position(|m| m.key == market).unwrap_or(0);
                    let chosen = bm.markets.into_iter().nth(idx)?;
                    Some(BookmakerQuote {
                        bookmaker: bm.title,
                        outcomes: chosen
                            .outcomes
                            .into_iter()
                            .map(|o| OutcomePrice { name: o.name, price: o.price })
                            .collect(),
                    })
                })
                .collect();

            Matchup {
                league: game.sport_title.unwrap_or_else(|| MISSING.to_string()),
                home_team: game.home_team.unwrap_or_else(|| MISSING.to_string()),
                away_team: game.away_team.unwrap_or_else(|| MISSING.to_string()),
                commence_time: game.commence_time,
                bookmaker_quotes,
            }
        })
        .collect();

    OddsSnapshot::new(matchups)
}

/// Parse a raw `/odds` response body into a snapshot.
pub fn parse_snapshot(body: &str, market: &str) -> Result<OddsSnapshot, DeskError> {
    let games: Vec<ApiGame> = serde_json::from_str(body)
        .map_err(|e| DeskError::Fetch(format!("malformed odds payload: {e}")))?;
    Ok(normalize(games, market))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The Odds API client.
pub struct TheOddsApiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    sport: String,
    regions: String,
    markets: String,
    odds_format: String,
    timeout_secs: u64,
}

impl TheOddsApiClient {
    pub fn new(config: &OddsConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("ODDSDESK/0.1.0")
            .build()
            .context("Failed to build HTTP client for The Odds API")?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            sport: config.sport.clone(),
            regions: config.regions.clone(),
            markets: config.markets.clone(),
            odds_format: config.odds_format.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn odds_url(&self) -> String {
        format!("{}/sports/{}/odds", self.base_url, self.sport)
    }

    /// The market used for normalisation: the first one requested.
    fn primary_market(&self) -> &str {
        self.markets.split(',').next().unwrap_or("h2h").trim()
    }

    fn map_send_error(&self, e: reqwest::Error) -> DeskError {
        if e.is_timeout() {
            DeskError::FetchTimeout { secs: self.timeout_secs }
        } else {
            // The URL carries the API key; keep it out of errors and logs.
            DeskError::Fetch(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl OddsSource for TheOddsApiClient {
    async fn fetch(&self) -> Result<OddsSnapshot, DeskError> {
        debug!(sport = %self.sport, regions = %self.regions, "Fetching odds");

        let resp = self
            .http
            .get(self.odds_url())
            .query(&[
                ("apiKey", self.api_key.expose_secret().as_str()),
                ("regions", self.regions.as_str()),
                ("markets", self.markets.as_str()),
                ("oddsFormat", self.odds_format.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if let Some(remaining) = resp.headers().get("x-requests-remaining") {
            debug!(remaining = ?remaining, "Odds API quota");
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeskError::Fetch(format!("Odds API returned {status}: {body}")));
        }

        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let snapshot = parse_snapshot(&body, self.primary_market())?;

        info!(matchups = snapshot.len(), source = SOURCE_NAME, "Odds fetched");
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
