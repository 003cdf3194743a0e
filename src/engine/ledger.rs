//! Ledger: wallet debits and credits, bet placement, settlement, and
//! statistics.
//!
//! Every function here works on a single `&mut Account` and validates
//! before it mutates, so an `Err` always leaves the account untouched.
//! Money math is checked: an amount past `Decimal::MAX` is an
//! `AmountOutOfRange` error, never a panic.
//! Persistence is the caller's job (see `AccountStore::update`).

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::info;

use crate::types::{
    format_american, Account, Bet, BetResult, DeskError, Selection, Settlement, Statistics,
};

/// Payouts and statistics are reported in cents.
const MONEY_DP: u32 = 2;

const CENT: Decimal = dec!(0.01);

// ---------------------------------------------------------------------------
// American odds
// ---------------------------------------------------------------------------

/// Total return per unit staked (stake included).
///
/// `+150` → 2.5, `-150` → 1.666…, `+100` → 2. A zero price is not a valid
/// American line and returns 1 (stake back); placement rejects it anyway.
pub fn american_payout_multiplier(price: Decimal) -> Result<Decimal, DeskError> {
    let gain = if price > Decimal::ZERO {
        Some(price / dec!(100))
    } else if price < Decimal::ZERO {
        dec!(100).checked_div(price.abs())
    } else {
        Some(Decimal::ZERO)
    };
    gain.and_then(|g| Decimal::ONE.checked_add(g))
        .ok_or_else(|| DeskError::AmountOutOfRange(format!("price {}", format_american(price))))
}

/// Amount credited for a winning stake, rounded to cents.
pub fn payout(stake: Decimal, price: Decimal) -> Result<Decimal, DeskError> {
    let multiplier = american_payout_multiplier(price)?;
    stake
        .checked_mul(multiplier)
        .map(|p| p.round_dp(MONEY_DP))
        .ok_or_else(|| {
            DeskError::AmountOutOfRange(format!(
                "payout of {stake} at {}",
                format_american(price)
            ))
        })
}

/// Split `total` into `count` stakes whose sum is exactly `total`.
///
/// Shares are rounded down to cents while that still gives every
/// selection at least a cent; smaller stakes are split at full precision.
/// The last share takes the remainder either way.
pub fn split_stake(total: Decimal, count: usize) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }
    let exact = total / Decimal::from(count);
    let cents = exact.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero);
    let share = if cents >= CENT { cents } else { exact };
    let mut stakes = vec![share; count];
    stakes[count - 1] = total - share * Decimal::from(count - 1);
    stakes
}

fn checked_sum(
    values: impl IntoIterator<Item = Decimal>,
    what: &str,
) -> Result<Decimal, DeskError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| DeskError::AmountOutOfRange(what.to_string()))
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Place a bet slip: debit `total_stake` and record one pending bet per
/// selection, splitting the stake equally.
///
/// A stake above the wallet is always `InsufficientFunds`, whatever else
/// is wrong with the slip.
pub fn place_bet(
    account: &mut Account,
    game_description: &str,
    selections: &[Selection],
    total_stake: Decimal,
) -> Result<Vec<Bet>, DeskError> {
    if selections.is_empty() {
        return Err(DeskError::NoSelections);
    }
    if total_stake <= Decimal::ZERO {
        return Err(DeskError::InvalidStake {
            stake: total_stake,
            reason: "stake must be positive".into(),
        });
    }
    if total_stake > account.wallet {
        return Err(DeskError::InsufficientFunds {
            needed: total_stake,
            available: account.wallet,
        });
    }
    if let Some(bad) = selections.iter().find(|s| s.price.abs() < dec!(100)) {
        return Err(DeskError::InvalidPrice(bad.price));
    }

    let stakes = split_stake(total_stake, selections.len());
    if stakes.iter().any(|s| *s <= Decimal::ZERO) {
        return Err(DeskError::InvalidStake {
            stake: total_stake,
            reason: format!("too small to split across {} selections", selections.len()),
        });
    }

    let placed: Vec<Bet> = selections
        .iter()
        .zip(stakes)
        .map(|(sel, stake)| Bet {
            game_description: game_description.to_string(),
            outcome_label: sel.outcome.clone(),
            bookmaker: sel.bookmaker.clone(),
            stake,
            price: sel.price,
            result: BetResult::Pending,
        })
        .collect();
    // Every recorded bet must be settleable.
    for bet in &placed {
        bet.payout()?;
    }

    account.wallet -= total_stake;
    account.bets.extend(placed.iter().cloned());

    info!(
        user = %account.username,
        game = %game_description,
        selections = placed.len(),
        stake = format!("${:.2}", total_stake),
        wallet = format!("${:.2}", account.wallet),
        "Bet placed"
    );

    Ok(placed)
}

// ---------------------------------------------------------------------------
// Settlement & deletion
// ---------------------------------------------------------------------------

/// Settle a pending bet. Returns the amount credited (zero for a loss;
/// the stake was already debited at placement).
pub fn settle_bet(
    account: &mut Account,
    index: usize,
    outcome: Settlement,
) -> Result<Decimal, DeskError> {
    let len = account.bets.len();
    let bet = account
        .bets
        .get(index)
        .ok_or(DeskError::IndexOutOfRange { index, len })?;

    if !bet.is_pending() {
        return Err(DeskError::AlreadySettled {
            index,
            result: bet.result,
        });
    }

    let credited = match outcome {
        Settlement::Win => bet.payout()?,
        Settlement::Loss => Decimal::ZERO,
    };
    let wallet = account.wallet.checked_add(credited).ok_or_else(|| {
        DeskError::AmountOutOfRange(format!("wallet {} plus {credited}", account.wallet))
    })?;

    account.bets[index].result = outcome.into();
    account.wallet = wallet;
    match outcome {
        Settlement::Win => account.wins += 1,
        Settlement::Loss => account.losses += 1,
    }

    info!(
        user = %account.username,
        index,
        result = %BetResult::from(outcome),
        credited = format!("${:.2}", credited),
        wallet = format!("${:.2}", account.wallet),
        "Bet settled"
    );

    Ok(credited)
}

/// Remove a bet in any state.
///
/// Deleting is a record correction, not a refund: the wallet is left as
/// it is. A settled bet takes its win/loss count with it so the counters
/// never exceed the bet list.
pub fn delete_bet(account: &mut Account, index: usize) -> Result<Bet, DeskError> {
    if index >= account.bets.len() {
        return Err(DeskError::IndexOutOfRange {
            index,
            len: account.bets.len(),
        });
    }

    let bet = account.bets.remove(index);
    match bet.result {
        BetResult::Win => account.wins = account.wins.saturating_sub(1),
        BetResult::Loss => account.losses = account.losses.saturating_sub(1),
        BetResult::Pending => {}
    }

    info!(user = %account.username, index, result = %bet.result, "Bet deleted");
    Ok(bet)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Aggregate the account's bet history. Pure; fails only when a total
/// does not fit in a `Decimal`.
pub fn compute_statistics(account: &Account) -> Result<Statistics, DeskError> {
    let bets = &account.bets;
    let total_bets = bets.len();

    let win_payouts = bets
        .iter()
        .filter(|b| b.result == BetResult::Win)
        .map(Bet::payout)
        .collect::<Result<Vec<Decimal>, DeskError>>()?;
    let loss_stakes: Vec<Decimal> = bets
        .iter()
        .filter(|b| b.result == BetResult::Loss)
        .map(|b| b.stake)
        .collect();

    let wins = win_payouts.len();
    let losses = loss_stakes.len();

    let win_percentage = if total_bets == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(wins) / Decimal::from(total_bets) * dec!(100)).round_dp(MONEY_DP)
    };

    let total_staked = checked_sum(bets.iter().map(|b| b.stake), "total staked")?;
    let total_earnings = checked_sum(win_payouts.iter().copied(), "total earnings")?;
    let net_profit_loss = total_earnings
        .checked_sub(total_staked)
        .ok_or_else(|| DeskError::AmountOutOfRange("net profit/loss".into()))?;

    Ok(Statistics {
        total_bets,
        wins,
        losses,
        pending: total_bets - wins - losses,
        win_percentage,
        total_staked,
        total_earnings,
        net_profit_loss,
        biggest_win: win_payouts.iter().copied().max().unwrap_or(Decimal::ZERO),
        biggest_loss: loss_stakes.iter().copied().max().unwrap_or(Decimal::ZERO),
    })
}

// ---------------------------------------------------------------------------
