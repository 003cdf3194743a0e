//! End-to-end desk scenarios: accounts, favorites, refreshes, the ledger
//! and persistence across restarts.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use oddsdesk::engine::desk::{Desk, Request, Response, Session};
use oddsdesk::engine::rows::{RowQuery, SortColumn};
use oddsdesk::odds::refresher::Refresher;
use oddsdesk::storage::{AccountStore, JsonFileBackend};
use oddsdesk::types::{BetResult, DeskError, Selection, Settlement};

use crate::mock_odds::{next_board, opening_board, MockOddsSource};

fn open_desk(path: &Path) -> Desk {
    let store =
        AccountStore::open(Box::new(JsonFileBackend::new(path)), dec!(1000), "UTC").unwrap();
    Desk::new(store)
}

fn selection(outcome: &str, price: Decimal) -> Selection {
    Selection {
        outcome: outcome.to_string(),
        bookmaker: "DraftKings".to_string(),
        price,
    }
}

fn rows(desk: &mut Desk, session: &mut Session, query: RowQuery) -> Vec<oddsdesk::engine::rows::Row> {
    match desk.handle(session, Request::Rows(query)).unwrap() {
        Response::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");

    let source = Arc::new(MockOddsSource::new(vec![opening_board(), next_board()]));
    let refresher = Refresher::new(source.clone(), Duration::from_secs(5));

    let mut desk = open_desk(&path);
    let mut session = Session::default();
    desk.handle(
        &mut session,
        Request::CreateAccount {
            username: "alice".into(),
            timezone: Some("America/New_York".into()),
        },
    )
    .unwrap();
    desk.handle(
        &mut session,
        Request::AddFavoriteTeam { team: "Los Angeles Lakers".into() },
    )
    .unwrap();

    // First board: the Lakers game is new to this session.
    let alerts = desk.replace_snapshot(refresher.refresh().await.unwrap(), &session);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].away_team, "Boston Celtics");

    let favorites = rows(
        &mut desk,
        &mut session,
        RowQuery { favorites_only: true, ..RowQuery::default() },
    );
    assert_eq!(favorites.len(), 2, "one row per bookmaker");
    assert!(favorites.iter().all(|r| r.is_favorite));
    assert_eq!(favorites[0].local_commence_time, "2026-10-20 19:00 EDT");

    // Stake splits to 50.00 + 50.01.
    let placed = desk
        .handle(
            &mut session,
            Request::PlaceBet {
                game: "Los Angeles Lakers vs Boston Celtics".into(),
                selections: vec![
                    selection("Los Angeles Lakers", dec!(-150)),
                    selection("Boston Celtics", dec!(130)),
                ],
                total_stake: dec!(100.01),
            },
        )
        .unwrap();
    match placed {
        Response::BetsPlaced { bets, wallet } => {
            assert_eq!(bets[0].stake, dec!(50.00));
            assert_eq!(bets[1].stake, dec!(50.01));
            assert_eq!(wallet, dec!(899.99));
        }
        other => panic!("expected placement, got {other:?}"),
    }

    desk.handle(&mut session, Request::SettleBet { index: 0, outcome: Settlement::Win })
        .unwrap();
    desk.handle(&mut session, Request::SettleBet { index: 1, outcome: Settlement::Loss })
        .unwrap();

    match desk.handle(&mut session, Request::Statistics).unwrap() {
        Response::Statistics(stats) => {
            assert_eq!(stats.total_bets, 2);
            assert_eq!(stats.wins, 1);
            assert_eq!(stats.losses, 1);
            assert_eq!(stats.win_percentage, dec!(50));
            assert_eq!(stats.total_staked, dec!(100.01));
            assert_eq!(stats.total_earnings, dec!(83.33));
            assert_eq!(stats.net_profit_loss, dec!(-16.68));
            assert_eq!(stats.biggest_win, dec!(83.33));
            assert_eq!(stats.biggest_loss, dec!(50.01));
        }
        other => panic!("expected statistics, got {other:?}"),
    }

    // Second board: only the new Lakers game raises an alert.
    let alerts = desk.replace_snapshot(refresher.refresh().await.unwrap(), &session);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].home_team, "Golden State Warriors");
    assert_eq!(source.fetches(), 2);

    // Restart from disk.
    drop(desk);
    let mut desk = open_desk(&path);
    let mut session = Session::default();
    desk.handle(&mut session, Request::Login { username: "alice".into() })
        .unwrap();
    let account = desk.current_account(&session).unwrap().clone();
    assert_eq!(account.wallet, dec!(983.32));
    assert_eq!(account.timezone, "America/New_York");
    assert_eq!((account.wins, account.losses), (1, 1));
    assert_eq!(account.bets[0].result, BetResult::Win);
    assert_eq!(account.bets[1].bookmaker, "DraftKings");
    assert!(account.favorite_teams.contains("Los Angeles Lakers"));
    assert!(desk.snapshot().is_none(), "odds are never persisted");

    // Deleting a settled bet keeps the wallet and drops its win.
    desk.handle(&mut session, Request::DeleteBet { index: 0 }).unwrap();
    let account = desk.current_account(&session).unwrap();
    assert_eq!(account.wallet, dec!(983.32));
    assert_eq!((account.wins, account.losses), (0, 1));
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_board() {
    let dir = tempfile::tempdir().unwrap();
    let mut desk = open_desk(&dir.path().join("accounts.json"));
    let session = Session::default();

    let source = Arc::new(MockOddsSource::new(vec![opening_board()]));
    let refresher = Refresher::new(source.clone(), Duration::from_secs(5));
    desk.replace_snapshot(refresher.refresh().await.unwrap(), &session);

    source.set_error(DeskError::Fetch("503 Service Unavailable".into()));
    let err = refresher.refresh().await.unwrap_err();
    assert!(matches!(err, DeskError::Fetch(_)));
    assert!(!err.is_user_error());
    assert_eq!(desk.snapshot().unwrap().len(), 3);

    source.clear_error();
    assert!(refresher.refresh().await.is_ok());
}

#[tokio::test]
async fn test_anonymous_board_uses_feed_times() {
    let dir = tempfile::tempdir().unwrap();
    let mut desk = open_desk(&dir.path().join("accounts.json"));
    let mut session = Session::default();
    desk.replace_snapshot(opening_board(), &session);

    desk.handle(&mut session, Request::SortBy { column: SortColumn::CommenceTime })
        .unwrap();
    let all = rows(&mut desk, &mut session, RowQuery::default());
    assert_eq!(all.len(), 6);
    assert_eq!(all[0].local_commence_time, "2026-10-20T23:00:00Z");
    assert!(all.iter().all(|r| !r.is_favorite));

    let favorites = rows(
        &mut desk,
        &mut session,
        RowQuery { favorites_only: true, ..RowQuery::default() },
    );
    assert!(favorites.is_empty());

    let arsenal = rows(
        &mut desk,
        &mut session,
        RowQuery { team: Some("Arsenal".into()), ..RowQuery::default() },
    );
    assert_eq!(arsenal.len(), 2);
    assert!(arsenal.iter().all(|r| r.league == "EPL"));
}

#[test]
fn test_corrupt_store_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    let (mut store, warning) = AccountStore::open_or_recover(
        Box::new(JsonFileBackend::new(&path)),
        dec!(1000),
        "UTC",
    )
    .unwrap();
    assert!(matches!(warning, Some(DeskError::StorageCorrupt { .. })));
    assert!(store.is_empty());

    let quarantined: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("accounts.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);

    store.create_account("bob", None).unwrap();
    assert!(path.exists());
}

#[test]
fn test_legacy_store_is_migrated_on_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");
    std::fs::write(
        &path,
        r#"{
          "carol": {
            "favorites": {"teams": ["Arsenal"], "leagues": []},
            "bets": [
              {"game": "Arsenal vs Chelsea", "outcome": "Arsenal", "amount": 20.0,
               "price": 120, "result": "pending"}
            ],
            "wins": 0,
            "losses": 0,
            "wallet": 980.0
          }
        }"#,
    )
    .unwrap();

    let mut desk = open_desk(&path);
    let mut session = Session::default();
    desk.handle(&mut session, Request::Login { username: "carol".into() })
        .unwrap();
    let account = desk.current_account(&session).unwrap();
    assert_eq!(account.timezone, "UTC");
    assert_eq!(account.bets[0].bookmaker, "");
    assert_eq!(account.wallet, dec!(980));

    desk.save().unwrap();
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["version"], 1);
    assert_eq!(saved["accounts"]["carol"]["timezone"], "UTC");
}
