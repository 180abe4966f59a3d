//! Exchange payloads to display records.
//!
//! Amounts are copied as received. A value sent as a JSON number is rendered
//! to its decimal text, `null` or a missing field becomes `""`, and a missing
//! leverage becomes `"1"`.

use acctdash_core::*;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

const DEFAULT_LEVERAGE: &str = "1";

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn leverage_or_default(raw: String) -> String {
    if raw.trim().is_empty() {
        DEFAULT_LEVERAGE.to_string()
    } else {
        raw
    }
}

fn millis(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Raw exchange shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCoin {
    #[serde(default, deserialize_with = "text")]
    coin: String,
    #[serde(default, deserialize_with = "text")]
    equity: String,
    #[serde(default, deserialize_with = "text")]
    wallet_balance: String,
    #[serde(default, deserialize_with = "text")]
    usd_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    #[serde(default, deserialize_with = "text")]
    symbol: String,
    #[serde(default, deserialize_with = "text")]
    side: String,
    #[serde(default, deserialize_with = "text")]
    size: String,
    #[serde(default, deserialize_with = "text")]
    avg_price: String,
    #[serde(default, deserialize_with = "text")]
    mark_price: String,
    #[serde(default, deserialize_with = "text")]
    unrealised_pnl: String,
    #[serde(default, deserialize_with = "text")]
    leverage: String,
    #[serde(default, deserialize_with = "text")]
    position_value: String,
    #[serde(default, deserialize_with = "text")]
    liq_price: String,
    #[serde(default, deserialize_with = "text")]
    break_even_price: String,
    #[serde(default, deserialize_with = "text", rename = "positionIM")]
    position_im: String,
    #[serde(default, deserialize_with = "text", rename = "positionMM")]
    position_mm: String,
    #[serde(default, deserialize_with = "text")]
    take_profit: String,
    #[serde(default, deserialize_with = "text")]
    stop_loss: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClosedPnl {
    #[serde(default, deserialize_with = "text")]
    order_id: String,
    #[serde(default, deserialize_with = "text")]
    symbol: String,
    #[serde(default, deserialize_with = "text")]
    order_type: String,
    #[serde(default, deserialize_with = "text")]
    side: String,
    #[serde(default, deserialize_with = "text")]
    qty: String,
    #[serde(default, deserialize_with = "text")]
    avg_entry_price: String,
    #[serde(default, deserialize_with = "text")]
    avg_exit_price: String,
    #[serde(default, deserialize_with = "text")]
    closed_pnl: String,
    #[serde(default, deserialize_with = "text")]
    created_time: String,
    #[serde(default, deserialize_with = "text")]
    updated_time: String,
    #[serde(default, deserialize_with = "text")]
    leverage: String,
}

// ---------------------------------------------------------------------------
// Section normalization
// ---------------------------------------------------------------------------

fn check(section: Section, envelope: &Envelope) -> Result<(), SectionFailure> {
    if envelope.is_ok() {
        return Ok(());
    }
    let message = match envelope.ret_code() {
        None => "response carried no retCode".to_string(),
        Some(_) => envelope.ret_msg().to_string(),
    };
    Err(SectionFailure {
        section,
        ret_code: envelope.ret_code(),
        message,
    })
}

fn parse_items<T: for<'de> Deserialize<'de>>(section: Section, items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(%section, error = %e, "Dropping unreadable record");
                None
            }
        })
        .collect()
}

/// Coins from the first account in a wallet-balance response.
pub fn normalize_wallet(envelope: &Envelope) -> Result<Vec<WalletEntry>, SectionFailure> {
    check(Section::Wallet, envelope)?;

    let coins = envelope
        .list()
        .first()
        .and_then(|account| account.get("coin"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    Ok(parse_items::<RawCoin>(Section::Wallet, coins)
        .into_iter()
        .map(|c| WalletEntry {
            asset: c.coin,
            equity: c.equity,
            wallet_balance: c.wallet_balance,
            usd_value: c.usd_value,
        })
        .collect())
}

/// Open positions only: anything with `size <= 0` is dropped here.
pub fn normalize_positions(envelope: &Envelope) -> Result<Vec<PositionEntry>, SectionFailure> {
    check(Section::Positions, envelope)?;

    Ok(parse_items::<RawPosition>(Section::Positions, envelope.list())
        .into_iter()
        .map(|p| PositionEntry {
            symbol: p.symbol,
            side: p.side,
            size: p.size,
            entry_price: p.avg_price,
            mark_price: p.mark_price,
            unrealized_pnl: p.unrealised_pnl,
            leverage: leverage_or_default(p.leverage),
            position_value: p.position_value,
            liquidation_price: p.liq_price,
            break_even_price: p.break_even_price,
            initial_margin: p.position_im,
            maintenance_margin: p.position_mm,
            take_profit: p.take_profit,
            stop_loss: p.stop_loss,
        })
        .filter(PositionEntry::is_open)
        .collect())
}

/// Closed trades in the order received, with leverage defaulted.
pub fn normalize_closed_trades(
    envelope: &Envelope,
) -> Result<Vec<ClosedTradeRecord>, SectionFailure> {
    check(Section::ClosedTrades, envelope)?;

    Ok(parse_items::<RawClosedPnl>(Section::ClosedTrades, envelope.list())
        .into_iter()
        .map(|t| ClosedTradeRecord {
            created_time_ms: millis(&t.created_time),
            updated_time_ms: millis(&t.updated_time),
            order_id: t.order_id,
            symbol: t.symbol,
            order_type: t.order_type,
            side: t.side,
            qty: t.qty,
            avg_entry_price: t.avg_entry_price,
            avg_exit_price: t.avg_exit_price,
            closed_pnl: t.closed_pnl,
            leverage: leverage_or_default(t.leverage),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(list: Value) -> Envelope {
        Envelope::new(json!({ "retCode": 0, "retMsg": "OK", "result": { "list": list } }))
    }

    #[test]
    fn test_wallet_flattens_first_account() {
        let envelope = ok(json!([
            { "coin": [
                { "coin": "USDT", "equity": "100.5", "walletBalance": "100", "usdValue": "100.49" },
                { "coin": "BTC", "equity": 0.01, "walletBalance": "0.01", "usdValue": null }
            ]},
            { "coin": [ { "coin": "IGNORED" } ] }
        ]));
        let wallet = normalize_wallet(&envelope).unwrap();
        assert_eq!(wallet.len(), 2);
        assert_eq!(
            wallet[0],
            WalletEntry {
                asset: "USDT".to_string(),
                equity: "100.5".to_string(),
                wallet_balance: "100".to_string(),
                usd_value: "100.49".to_string(),
            }
        );
        assert_eq!(wallet[1].equity, "0.01");
        assert_eq!(wallet[1].usd_value, "");
    }

    #[test]
    fn test_wallet_without_accounts_is_empty() {
        assert!(normalize_wallet(&ok(json!([]))).unwrap().is_empty());
    }

    #[test]
    fn test_positions_filtered_by_size() {
        let envelope = ok(json!([
            { "symbol": "BTCUSDT", "side": "Buy", "size": "0.001", "avgPrice": "60000",
              "positionIM": "6", "positionMM": "0.3", "liqPrice": "50000", "unrealisedPnl": "1.2" },
            { "symbol": "ETHUSDT", "side": "", "size": "0", "leverage": "5" }
        ]));
        let positions = normalize_positions(&envelope).unwrap();
        assert_eq!(positions.len(), 1);

        let p = &positions[0];
        assert_eq!(p.symbol, "BTCUSDT");
        assert_eq!(p.entry_price, "60000");
        assert_eq!(p.initial_margin, "6");
        assert_eq!(p.maintenance_margin, "0.3");
        assert_eq!(p.liquidation_price, "50000");
        assert_eq!(p.unrealized_pnl, "1.2");
        assert_eq!(p.leverage, "1");
        assert_eq!(p.take_profit, "");
    }

    #[test]
    fn test_closed_trades_pass_through_with_default_leverage() {
        let envelope = ok(json!([
            { "orderId": "A1", "symbol": "BTCUSDT", "orderType": "Market", "side": "Sell",
              "qty": "0.01", "avgEntryPrice": "60000", "avgExitPrice": "61000",
              "closedPnl": "10", "createdTime": "1700000000000", "updatedTime": "1700000001000" },
            { "orderId": "B2", "leverage": "25", "updatedTime": "oops" }
        ]));
        let trades = normalize_closed_trades(&envelope).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].order_id, "A1");
        assert_eq!(trades[0].leverage, "1");
        assert_eq!(trades[0].created_time_ms, 1_700_000_000_000);
        assert_eq!(trades[0].updated_time_ms, 1_700_000_001_000);
        assert_eq!(trades[1].leverage, "25");
        assert_eq!(trades[1].updated_time_ms, 0);
    }

    #[test]
    fn test_failed_envelope_reports_section() {
        let remote = Envelope::new(json!({ "retCode": 10001, "retMsg": "params error" }));
        let failure = normalize_positions(&remote).unwrap_err();
        assert_eq!(failure.section, Section::Positions);
        assert_eq!(failure.ret_code, Some(10001));
        assert_eq!(failure.message, "params error");

        let missing = Envelope::new(json!({ "result": { "list": [] } }));
        let failure = normalize_wallet(&missing).unwrap_err();
        assert_eq!(failure.ret_code, None);

        let local = Envelope::failure("timed out");
        let failure = normalize_closed_trades(&local).unwrap_err();
        assert_eq!(failure.ret_code, Some(-1));
        assert_eq!(failure.message, "timed out");
    }

    #[test]
    fn test_non_object_records_are_dropped() {
        let envelope = ok(json!([
            "garbage",
            { "symbol": "SOLUSDT", "size": "2" }
        ]));
        let positions = normalize_positions(&envelope).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "SOLUSDT");
    }
}
