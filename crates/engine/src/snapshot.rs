use std::sync::Arc;

use acctdash_brokers_bybit::BybitClient;
use acctdash_core::*;
use tracing::{info, warn};

use crate::normalize::{normalize_closed_trades, normalize_positions, normalize_wallet};

/// Issue the three upstream calls one after another.
///
/// Each envelope is returned untouched; failures stay inside their section.
pub async fn fetch_account_info(client: &BybitClient) -> RawAccountInfo {
    let wallet = client.wallet().await;
    let positions = client.positions().await;
    let closed_pnl = client.fetch_month_closed_pnl().await;

    RawAccountInfo {
        wallet,
        positions,
        closed_pnl,
    }
}

/// Turn raw envelopes into a snapshot. A failed section is left empty and
/// recorded in `diagnostics`.
pub fn normalize_account_info(raw: &RawAccountInfo, fetched_at_epoch_ms: i64) -> AccountSnapshot {
    let mut diagnostics = Vec::new();

    let wallet = section(normalize_wallet(&raw.wallet), &mut diagnostics);
    let positions = section(normalize_positions(&raw.positions), &mut diagnostics);
    let closed_trades = section(normalize_closed_trades(&raw.closed_pnl), &mut diagnostics);

    AccountSnapshot {
        wallet,
        positions,
        closed_trades,
        fetched_at_epoch_ms,
        diagnostics,
    }
}

fn section<T>(
    result: Result<Vec<T>, SectionFailure>,
    diagnostics: &mut Vec<SectionFailure>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(failure) => {
            warn!(
                section = %failure.section,
                ret_code = ?failure.ret_code,
                message = %failure.message,
                "Section unavailable, returning it empty"
            );
            diagnostics.push(failure);
            Vec::new()
        }
    }
}

/// Fetch and normalize one snapshot with an existing client.
pub async fn assemble_snapshot(client: &BybitClient) -> AccountSnapshot {
    let raw = fetch_account_info(client).await;
    let snapshot = normalize_account_info(&raw, client.effective_time());

    info!(
        wallet = snapshot.wallet.len(),
        positions = snapshot.positions.len(),
        closed_trades = snapshot.closed_trades.len(),
        degraded = snapshot.is_degraded(),
        "Account snapshot assembled"
    );
    snapshot
}

/// Connect a client for `credentials`, failing fast if they did not resolve.
///
/// No request is issued when `credentials` is an error.
pub async fn connect_client(
    credentials: Result<Credentials, ConfigError>,
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<BybitClient, SnapshotError> {
    let credentials = credentials?;
    Ok(BybitClient::connect(credentials, config, transport).await?)
}

/// Raw `{wallet, positions, closedPnl}` envelopes for one request.
pub async fn load_account_info(
    credentials: Result<Credentials, ConfigError>,
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<RawAccountInfo, SnapshotError> {
    let client = connect_client(credentials, config, transport).await?;
    Ok(fetch_account_info(&client).await)
}

/// A normalized snapshot for one request.
pub async fn load_snapshot(
    credentials: Result<Credentials, ConfigError>,
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<AccountSnapshot, SnapshotError> {
    let client = connect_client(credentials, config, transport).await?;
    Ok(assemble_snapshot(&client).await)
}
