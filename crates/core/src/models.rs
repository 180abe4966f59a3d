use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// One coin balance from the unified account.
///
/// Amounts are kept as the decimal strings the exchange sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEntry {
    pub asset: String,
    pub equity: String,
    pub wallet_balance: String,
    pub usd_value: String,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// An open derivatives position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    pub symbol: String,
    pub side: String,
    pub size: String,
    pub entry_price: String,
    pub mark_price: String,
    pub unrealized_pnl: String,
    pub leverage: String,
    pub position_value: String,
    pub liquidation_price: String,
    pub break_even_price: String,
    pub initial_margin: String,
    pub maintenance_margin: String,
    pub take_profit: String,
    pub stop_loss: String,
}

impl PositionEntry {
    pub fn is_open(&self) -> bool {
        is_positive_amount(&self.size)
    }
}

// ---------------------------------------------------------------------------
// Closed trades
// ---------------------------------------------------------------------------

/// A realized PnL record. `order_id` is unique within an aggregated set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedTradeRecord {
    pub order_id: String,
    pub symbol: String,
    pub order_type: String,
    pub side: String,
    pub qty: String,
    pub avg_entry_price: String,
    pub avg_exit_price: String,
    pub closed_pnl: String,
    pub created_time_ms: i64,
    pub updated_time_ms: i64,
    pub leverage: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Which upstream call a piece of the snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Wallet,
    Positions,
    ClosedTrades,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Section::Wallet => "wallet",
            Section::Positions => "positions",
            Section::ClosedTrades => "closed_trades",
        };
        f.write_str(name)
    }
}

/// Why a section of the snapshot came back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFailure {
    pub section: Section,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret_code: Option<i64>,
    pub message: String,
}

/// Wallet, positions and this month's closed trades, fetched together.
///
/// Recomputed on every request. Failed sections are empty and listed in
/// `diagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub wallet: Vec<WalletEntry>,
    pub positions: Vec<PositionEntry>,
    pub closed_trades: Vec<ClosedTradeRecord>,
    pub fetched_at_epoch_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<SectionFailure>,
}

impl AccountSnapshot {
    pub fn is_degraded(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// The three upstream envelopes before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccountInfo {
    pub wallet: Envelope,
    pub positions: Envelope,
    pub closed_pnl: Envelope,
}

/// Sum of `closed_pnl` over `trades`. Unparsable amounts are skipped.
pub fn total_closed_pnl(trades: &[ClosedTradeRecord]) -> Decimal {
    trades
        .iter()
        .filter_map(|t| parse_amount(&t.closed_pnl))
        .sum()
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse an exchange amount and check it is strictly positive.
///
/// Accepts plain and scientific notation. Anything unparsable is not positive.
pub fn is_positive_amount(raw: &str) -> bool {
    parse_amount(raw).is_some_and(|d| d > Decimal::ZERO)
}
