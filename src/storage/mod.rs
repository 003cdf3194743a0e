//! Persistence layer.
//!
//! The account store owns every account for the process lifetime and
//! writes the whole mapping back after each mutation. The on-disk form is
//! a versioned JSON document; older unversioned documents are migrated on
//! load and every loaded record is validated before it is trusted.

pub mod settings;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::engine::ledger;
use crate::types::{parse_timezone, Account, Bet, BetResult, DeskError, DEFAULT_TIMEZONE};

/// Current document version.
pub const STORE_VERSION: u32 = 1;

/// Default account store file path.
pub const DEFAULT_STORE_FILE: &str = "oddsdesk_accounts.json";

pub type AccountMap = BTreeMap<String, Account>;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Where the account mapping lives between runs.
#[cfg_attr(test, mockall::automock)]
pub trait StateBackend: Send + Sync {
    /// Read the persisted mapping. Absent state is an empty mapping, not
    /// an error.
    fn load(&self) -> Result<AccountMap, DeskError>;

    /// Replace the persisted mapping with `accounts`.
    fn save(&self, accounts: &AccountMap) -> Result<(), DeskError>;

    /// Move unreadable state out of the way so the next save cannot
    /// overwrite it. Returns where it went, if anywhere.
    fn quarantine(&self) -> Result<Option<PathBuf>, DeskError> {
        Ok(None)
    }

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// JSON file backend
// ---------------------------------------------------------------------------

/// Stores the mapping as one pretty-printed JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn corrupt(&self, message: impl Into<String>) -> DeskError {
        DeskError::StorageCorrupt {
            path: self.path.display().to_string(),
            message: message.into(),
        }
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&self) -> Result<AccountMap, DeskError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No account store found, starting fresh");
            return Ok(AccountMap::new());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            DeskError::Storage(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let accounts = decode_document(&json).map_err(|msg| self.corrupt(msg))?;

        info!(
            path = %self.path.display(),
            accounts = accounts.len(),
            "Account store loaded from disk"
        );
        Ok(accounts)
    }

    fn save(&self, accounts: &AccountMap) -> Result<(), DeskError> {
        let json = encode_document(accounts)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), accounts = accounts.len(), "Account store saved");
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, DeskError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
        let target = PathBuf::from(target);

        std::fs::rename(&self.path, &target).map_err(|e| {
            DeskError::Storage(format!("failed to quarantine {}: {e}", self.path.display()))
        })?;
        Ok(Some(target))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write `contents` to `path` so that readers see either the old file or
/// the new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DeskError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |what: &str, e: std::io::Error| {
        DeskError::Storage(format!("{what} {}: {e}", path.display()))
    };

    std::fs::create_dir_all(&dir).map_err(|e| io_err("failed to create directory for", e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| io_err("failed to create temp file for", e))?;
    tmp.write_all(contents)
        .map_err(|e| io_err("failed to write", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_err("failed to sync", e))?;
    tmp.persist(path)
        .map_err(|e| io_err("failed to replace", e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Keeps the mapping in memory only. Used for ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    accounts: Mutex<AccountMap>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self) -> Result<AccountMap, DeskError> {
        Ok(self.accounts.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, accounts: &AccountMap) -> Result<(), DeskError> {
        *self.accounts.lock().unwrap_or_else(|e| e.into_inner()) = accounts.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    accounts: BTreeMap<String, AccountRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    favorites: FavoritesRecord,
    bets: Vec<BetRecord>,
    wins: u32,
    losses: u32,
    wallet: Decimal,
    timezone: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FavoritesRecord {
    teams: Vec<String>,
    leagues: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BetRecord {
    game: String,
    outcome: String,
    bookmaker: String,
    amount: Decimal,
    price: Decimal,
    result: BetResult,
}

/// Unversioned layout: username → record, with `timezone` and per-bet
/// `bookmaker` possibly missing.
#[derive(Debug, Deserialize)]
struct LegacyAccountRecord {
    favorites: FavoritesRecord,
    bets: Vec<LegacyBetRecord>,
    wins: u32,
    losses: u32,
    wallet: Decimal,
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyBetRecord {
    game: String,
    outcome: String,
    bookmaker: Option<String>,
    amount: Decimal,
    price: Decimal,
    result: BetResult,
}

impl LegacyAccountRecord {
    fn migrate(self, username: &str) -> AccountRecord {
        let timezone = self.timezone.unwrap_or_else(|| {
            warn!(user = username, "Legacy account has no timezone, migrating to UTC");
            DEFAULT_TIMEZONE.to_string()
        });
        let bets = self
            .bets
            .into_iter()
            .map(|b| BetRecord {
                bookmaker: b.bookmaker.unwrap_or_else(|| {
                    warn!(user = username, game = %b.game, "Legacy bet has no bookmaker");
                    String::new()
                }),
                game: b.game,
                outcome: b.outcome,
                amount: b.amount,
                price: b.price,
                result: b.result,
            })
            .collect();
        AccountRecord {
            favorites: self.favorites,
            bets,
            wins: self.wins,
            losses: self.losses,
            wallet: self.wallet,
            timezone,
        }
    }
}

impl From<&Account> for AccountRecord {
    fn from(a: &Account) -> Self {
        AccountRecord {
            favorites: FavoritesRecord {
                teams: a.favorite_teams.iter().cloned().collect(),
                leagues: a.favorite_leagues.iter().cloned().collect(),
            },
            bets: a
                .bets
                .iter()
                .map(|b| BetRecord {
                    game: b.game_description.clone(),
                    outcome: b.outcome_label.clone(),
                    bookmaker: b.bookmaker.clone(),
                    amount: b.stake,
                    price: b.price,
                    result: b.result,
                })
                .collect(),
            wins: a.wins,
            losses: a.losses,
            wallet: a.wallet,
            timezone: a.timezone.clone(),
        }
    }
}

impl AccountRecord {
    /// Convert to a domain account, enforcing the account invariants.
    fn into_account(self, username: &str) -> Result<Account, String> {
        if username.trim().is_empty() {
            return Err("empty username".into());
        }
        if self.wallet < Decimal::ZERO {
            return Err(format!("{username}: negative wallet {}", self.wallet));
        }
        if (self.wins as usize) + (self.losses as usize) > self.bets.len() {
            return Err(format!(
                "{username}: {} wins + {} losses exceeds {} bets",
                self.wins,
                self.losses,
                self.bets.len()
            ));
        }
        if let Some(b) = self.bets.iter().find(|b| b.amount <= Decimal::ZERO) {
            return Err(format!("{username}: bet on {} has non-positive stake", b.game));
        }
        for b in &self.bets {
            if b.price.abs() < dec!(100) {
                return Err(format!("{username}: bet on {} has price {}", b.game, b.price));
            }
            ledger::payout(b.amount, b.price)
                .map_err(|e| format!("{username}: bet on {}: {e}", b.game))?;
        }
        parse_timezone(&self.timezone).map_err(|e| format!("{username}: {e}"))?;

        Ok(Account {
            username: username.to_string(),
            favorite_teams: self.favorites.teams.into_iter().collect(),
            favorite_leagues: self.favorites.leagues.into_iter().collect(),
            wallet: self.wallet,
            bets: self
                .bets
                .into_iter()
                .map(|b| Bet {
                    game_description: b.game,
                    outcome_label: b.outcome,
                    bookmaker: b.bookmaker,
                    stake: b.amount,
                    price: b.price,
                    result: b.result,
                })
                .collect(),
            wins: self.wins,
            losses: self.losses,
            timezone: self.timezone,
        })
    }
}

fn encode_document(accounts: &AccountMap) -> Result<String, DeskError> {
    let doc = StoreDocument {
        version: STORE_VERSION,
        accounts: accounts
            .iter()
            .map(|(name, a)| (name.clone(), AccountRecord::from(a)))
            .collect(),
    };
    serde_json::to_string_pretty(&doc)
        .map_err(|e| DeskError::Storage(format!("failed to serialise account store: {e}")))
}

/// Parse and validate a stored document. The error is a human-readable
/// reason; the caller attaches the location.
fn decode_document(json: &str) -> Result<AccountMap, String> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let records = match value.get("version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(STORE_VERSION) => {
            let doc: StoreDocument = serde_json::from_value(value).map_err(|e| e.to_string())?;
            doc.accounts
        }
        Some(v) => return Err(format!("unsupported store version {v}")),
        None => {
            let legacy: BTreeMap<String, LegacyAccountRecord> =
                serde_json::from_value(value).map_err(|e| e.to_string())?;
            info!(accounts = legacy.len(), "Migrating unversioned account store");
            legacy
                .into_iter()
                .map(|(name, rec)| {
                    let rec = rec.migrate(&name);
                    (name, rec)
                })
                .collect()
        }
    };

    records
        .into_iter()
        .map(|(name, rec)| rec.into_account(&name).map(|a| (name, a)))
        .collect()
}

// ---------------------------------------------------------------------------
// Account store
// ---------------------------------------------------------------------------

/// In-memory account mapping backed by a `StateBackend`.
pub struct AccountStore {
    backend: Box<dyn StateBackend>,
    accounts: AccountMap,
    starting_wallet: Decimal,
    default_timezone: String,
}

impl AccountStore {
    /// Load the store, failing on unreadable state.
    pub fn open(
        backend: Box<dyn StateBackend>,
        starting_wallet: Decimal,
        default_timezone: &str,
    ) -> Result<Self, DeskError> {
        let accounts = backend.load()?;
        Ok(Self {
            backend,
            accounts,
            starting_wallet,
            default_timezone: default_timezone.to_string(),
        })
    }

    /// Load the store; if the persisted state is corrupt, quarantine it and
    /// start empty. The corruption error is handed back so the caller can
    /// surface it.
    pub fn open_or_recover(
        backend: Box<dyn StateBackend>,
        starting_wallet: Decimal,
        default_timezone: &str,
    ) -> Result<(Self, Option<DeskError>), DeskError> {
        let (accounts, warning) = match backend.load() {
            Ok(accounts) => (accounts, None),
            Err(err @ DeskError::StorageCorrupt { .. }) => {
                let moved = backend.quarantine()?;
                warn!(
                    error = %err,
                    quarantined = ?moved,
                    "Account store unreadable, starting with an empty store"
                );
                (AccountMap::new(), Some(err))
            }
            Err(other) => return Err(other),
        };
        let store = Self {
            backend,
            accounts,
            starting_wallet,
            default_timezone: default_timezone.to_string(),
        };
        Ok((store, warning))
    }

    /// All accounts, keyed by username.
    pub fn accounts(&self) -> &AccountMap {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Write the full mapping through the backend.
    pub fn save(&self) -> Result<(), DeskError> {
        self.backend.save(&self.accounts)
    }

    pub fn find_account(&self, username: &str) -> Result<&Account, DeskError> {
        self.accounts
            .get(username)
            .ok_or_else(|| DeskError::AccountNotFound(username.to_string()))
    }

    /// Create and persist a new account with the configured starting wallet.
    pub fn create_account(
        &mut self,
        username: &str,
        timezone: Option<&str>,
    ) -> Result<Account, DeskError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DeskError::InvalidInput("username is empty".into()));
        }
        if self.accounts.contains_key(username) {
            return Err(DeskError::DuplicateUsername(username.to_string()));
        }
        let timezone = timezone
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .unwrap_or(self.default_timezone.as_str())
            .to_string();
        parse_timezone(&timezone)?;

        let account = Account::new(username, self.starting_wallet, timezone);
        self.accounts.insert(username.to_string(), account.clone());

        if let Err(e) = self.backend.save(&self.accounts) {
            self.accounts.remove(username);
            error!(user = username, error = %e, "Failed to persist new account, rolled back");
            return Err(e);
        }

        info!(
            user = username,
            wallet = format!("${:.2}", account.wallet),
            timezone = %account.timezone,
            "Account created"
        );
        Ok(account)
    }

    /// Apply `f` to one account and persist the result as one unit.
    ///
    /// If `f` fails, or the write fails afterwards, the account is restored
    /// to its prior state and the error returned.
    pub fn update<T>(
        &mut self,
        username: &str,
        f: impl FnOnce(&mut Account) -> Result<T, DeskError>,
    ) -> Result<T, DeskError> {
        let account = self
            .accounts
            .get_mut(username)
            .ok_or_else(|| DeskError::AccountNotFound(username.to_string()))?;
        let before = account.clone();

        let out = match f(account) {
            Ok(out) => out,
            Err(e) => {
                *account = before;
                return Err(e);
            }
        };

        if let Err(e) = self.backend.save(&self.accounts) {
            if let Some(account) = self.accounts.get_mut(username) {
                *account = before;
            }
            error!(
                user = username,
                backend = %self.backend.describe(),
                error = %e,
                "Failed to persist account change, rolled back"
            );
            return Err(e);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
