//! ODDSDESK: sports odds board and play-money betting desk.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores accounts from disk, serves the dashboard API and refreshes
//! the odds board on an interval with graceful shutdown.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use oddsdesk::config;
use oddsdesk::dashboard::{self, run_refresh, DashboardState};
use oddsdesk::engine::desk::{Desk, Request, Session};
use oddsdesk::odds::refresher::Refresher;
use oddsdesk::odds::the_odds_api::TheOddsApiClient;
use oddsdesk::odds::{FileSource, OddsSource};
use oddsdesk::storage::settings::{load_settings, save_settings};
use oddsdesk::storage::{AccountStore, JsonFileBackend, MemoryBackend, StateBackend};
use oddsdesk::types::DeskError;

const BANNER: &str = r#"
  ___  ____  ____  ____  ____  _____ ____  _  __
 / _ \|  _ \|  _ \/ ___||  _ \| ____/ ___|| |/ /
| | | | | | | | | \___ \| | | |  _| \___ \| ' /
| |_| | |_| | |_| |___) | |_| | |___ ___) | . \
 \___/|____/|____/|____/|____/|_____|____/|_|\_\

  Live odds board & play-money betting desk
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        desk_name = %cfg.desk.name,
        starting_wallet = format!("${:.2}", cfg.desk.starting_wallet),
        refresh_interval_secs = cfg.odds.refresh_interval_secs,
        "ODDSDESK starting up"
    );

    // -- Restore accounts -------------------------------------------------

    let backend: Box<dyn StateBackend> = if cfg.desk.store_path.trim().is_empty() {
        warn!("No store path configured, accounts live in memory only");
        Box::new(MemoryBackend::new())
    } else {
        Box::new(JsonFileBackend::new(&cfg.desk.store_path))
    };
    let (store, recovered) =
        AccountStore::open_or_recover(backend, cfg.desk.starting_wallet, &cfg.desk.default_timezone)
            .context("Failed to open account store")?;
    if let Some(e) = recovered {
        warn!(error = %e, "Previous account store was quarantined");
    }
    info!(accounts = store.len(), "Account store loaded");

    let mut desk = Desk::new(store);
    let settings = load_settings(&cfg.desk.settings_path);
    let mut session = Session::new(settings.sort);

    if let Some(user) = &cfg.desk.default_user {
        login_default_user(&mut desk, &mut session, user)?;
    }

    // -- Odds source ------------------------------------------------------

    let source = build_odds_source(&cfg.odds)?;
    info!(source = source.name(), "Odds source ready");
    let refresher = Refresher::new(source, Duration::from_secs(cfg.odds.timeout_secs));

    let state = Arc::new(DashboardState::new(
        desk,
        session,
        refresher,
        settings,
        Some(cfg.desk.settings_path.clone()),
    ));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop --------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.odds.refresh_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.odds.refresh_interval_secs,
        "Entering refresh loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_refresh(&state).await {
                    Ok(summary) => info!(
                        source = %summary.source,
                        matchups = summary.matchups,
                        leagues = summary.leagues.len(),
                        alerts = summary.alerts.len(),
                        "Refresh complete"
                    ),
                    // A manual refresh from the dashboard is already running.
                    Err(DeskError::RefreshInFlight) => {
                        info!("Refresh skipped, one already in flight");
                    }
                    Err(e) => {
                        error!(error = %e, "Refresh failed, keeping previous board");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // -- Save final state -------------------------------------------------

    let desk = state.desk.read().await;
    desk.save().context("Failed to save account store")?;
    let settings = state.settings.read().await;
    if let Err(e) = save_settings(&cfg.desk.settings_path, &settings) {
        warn!(error = %e, "Failed to save display settings");
    }
    info!(accounts = desk.store().len(), "ODDSDESK shut down cleanly.");

    Ok(())
}

/// Log in the configured account, creating it on first run.
fn login_default_user(desk: &mut Desk, session: &mut Session, user: &str) -> Result<()> {
    let login = desk.handle(session, Request::Login { username: user.to_string() });
    match login {
        Ok(_) => Ok(()),
        Err(DeskError::AccountNotFound(_)) => {
            desk.handle(
                session,
                Request::CreateAccount { username: user.to_string(), timezone: None },
            )
            .with_context(|| format!("Failed to create default account {user}"))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to log in default account {user}")),
    }
}

/// The Odds API when a key is set, otherwise a saved payload on disk.
fn build_odds_source(cfg: &config::OddsConfig) -> Result<Arc<dyn OddsSource>> {
    match config::AppConfig::resolve_env(&cfg.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            let client = TheOddsApiClient::new(cfg, SecretString::new(key))?;
            Ok(Arc::new(client))
        }
        _ => match &cfg.fallback_file {
            Some(path) => {
                warn!(
                    env = %cfg.api_key_env,
                    path = %path.display(),
                    "No odds API key, serving odds from file"
                );
                let market = cfg.markets.split(',').next().unwrap_or("h2h").trim();
                Ok(Arc::new(FileSource::new(path.clone(), market)))
            }
            None => bail!(
                "No odds API key in {} and no odds.fallback_file configured",
                cfg.api_key_env
            ),
        },
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oddsdesk=info"));

    let json_logging = std::env::var("ODDSDESK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
