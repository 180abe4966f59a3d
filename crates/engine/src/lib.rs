//! Account snapshot assembly: three upstream calls, normalized into one
//! [`AccountSnapshot`](acctdash_core::AccountSnapshot) with per-section
//! failure isolation.

pub mod normalize;
pub mod snapshot;

pub use normalize::{normalize_closed_trades, normalize_positions, normalize_wallet};
pub use snapshot::{
    assemble_snapshot, connect_client, fetch_account_info, load_account_info, load_snapshot,
    normalize_account_info,
};
