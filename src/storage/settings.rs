//! Display preferences, kept apart from the account store.
//!
//! Losing this file only costs the user their layout, so unreadable or
//! invalid settings fall back to defaults with a warning.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::write_atomic;
use crate::engine::rows::{SortColumn, SortState};
use crate::types::DeskError;

pub const MIN_FONT_SIZE: u16 = 8;
pub const MAX_FONT_SIZE: u16 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Board columns, left to right. Always a permutation of every column.
    pub column_order: Vec<SortColumn>,
    pub font_size: u16,
    pub sort: SortState,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            column_order: SortColumn::ALL.to_vec(),
            font_size: 12,
            sort: SortState::default(),
        }
    }
}

impl DisplaySettings {
    /// Check the settings are usable as-is.
    pub fn validate(&self) -> Result<(), DeskError> {
        let complete = self.column_order.len() == SortColumn::ALL.len()
            && SortColumn::ALL.iter().all(|c| self.column_order.contains(c));
        if !complete {
            return Err(DeskError::InvalidInput(
                "column order must list every column exactly once".into(),
            ));
        }
        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&self.font_size) {
            return Err(DeskError::InvalidInput(format!(
                "font size must be between {MIN_FONT_SIZE} and {MAX_FONT_SIZE}"
            )));
        }
        Ok(())
    }
}

/// Load settings, falling back to defaults when absent or unusable.
pub fn load_settings(path: &Path) -> DisplaySettings {
    if !path.exists() {
        debug!(path = %path.display(), "No display settings, using defaults");
        return DisplaySettings::default();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            serde_json::from_str::<DisplaySettings>(&json).map_err(|e| e.to_string())
        })
        .and_then(|s| s.validate().map(|_| s).map_err(|e| e.to_string()));

    match parsed {
        Ok(settings) => settings,
        Err(reason) => {
            warn!(path = %path.display(), reason = %reason, "Display settings unusable, using defaults");
            DisplaySettings::default()
        }
    }
}

/// Validate and persist settings.
pub fn save_settings(path: &Path, settings: &DisplaySettings) -> Result<(), DeskError> {
    settings.validate()?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| DeskError::Storage(format!("failed to serialise settings: {e}")))?;
    write_atomic(path, json.as_bytes())
}
