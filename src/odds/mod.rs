//! Odds feed collaborators.
//!
//! Defines the `OddsSource` trait and provides implementations for:
//! - The Odds API (live HTTP fetch)
//! - a saved API payload on disk (offline use)

pub mod refresher;
pub mod the_odds_api;

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use crate::types::{DeskError, OddsSnapshot};

/// Abstraction over odds feeds.
///
/// Each call returns a complete snapshot; callers replace rather than
/// merge.
#[async_trait]
pub trait OddsSource: Send + Sync {
    /// Fetch and normalise the current board.
    async fn fetch(&self) -> Result<OddsSnapshot, DeskError>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}

/// Reads a saved The Odds API response from disk.
pub struct FileSource {
    path: PathBuf,
    market: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, market: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            market: market.into(),
        }
    }
}

#[async_trait]
impl OddsSource for FileSource {
    async fn fetch(&self) -> Result<OddsSnapshot, DeskError> {
        let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DeskError::Fetch(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let snapshot = the_odds_api::parse_snapshot(&body, &self.market)?;
        debug!(path = %self.path.display(), matchups = snapshot.len(), "Loaded odds from file");
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        "file"
    }
}
