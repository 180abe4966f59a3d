//! Bybit v5 account client.
//!
//! Read-only: wallet balance, open positions and closed-pnl history, signed
//! with HMAC-SHA256 and timestamped against the exchange clock.

pub mod client;
pub mod history;
pub mod signing;
pub mod simulated;
pub mod transport;

pub use client::BybitClient;
pub use history::{backward_windows, dedup_and_sort, month_start_ms, TimeWindow};
pub use signing::{SignedRequest, Signer};
pub use simulated::ScriptedTransport;
pub use transport::ReqwestTransport;
