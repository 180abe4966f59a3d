use std::sync::Arc;
use std::time::Duration;

use acctdash_core::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::signing::{Params, Signer};

pub const SERVER_TIME_PATH: &str = "/v5/market/time";
pub const WALLET_BALANCE_PATH: &str = "/v5/account/wallet-balance";
pub const POSITION_LIST_PATH: &str = "/v5/position/list";
pub const CLOSED_PNL_PATH: &str = "/v5/position/closed-pnl";

/// Longest body excerpt quoted in a failure envelope.
const BODY_EXCERPT_LEN: usize = 200;

/// Milliseconds since the Unix epoch on the local clock.
pub fn local_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Signed REST client for the Bybit v5 API.
///
/// Owns the clock offset used to timestamp requests. The offset is only
/// changed by [`BybitClient::sync_clock`] and stays at its previous value (0
/// initially) when a sync fails. A client is meant to be driven by one task
/// at a time.
pub struct BybitClient {
    config: ClientConfig,
    signer: Signer,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    clock_offset_ms: i64,
}

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .field("clock_offset_ms", &self.clock_offset_ms)
            .finish()
    }
}

impl BybitClient {
    /// Build a client without touching the network. The clock offset starts at 0.
    pub fn new(
        credentials: Credentials,
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url(credentials.use_test_environment())
            .trim_end_matches('/')
            .to_string();
        let signer = Signer::new(credentials, config.recv_window_ms)?;
        Ok(Self {
            config,
            signer,
            base_url,
            transport,
            clock_offset_ms: 0,
        })
    }

    /// Build a client and run one best-effort clock sync.
    pub async fn connect(
        credentials: Credentials,
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        let mut client = Self::new(credentials, config, transport)?;
        // Failure is already logged; the client runs unsynced.
        let _ = client.sync_clock().await;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn clock_offset_ms(&self) -> i64 {
        self.clock_offset_ms
    }

    /// Local time corrected by the last measured offset. Read fresh per request.
    pub fn effective_time(&self) -> i64 {
        local_time_ms().saturating_add(self.clock_offset_ms)
    }

    // -----------------------------------------------------------------------
    // Clock sync
    // -----------------------------------------------------------------------

    /// Probe the server time and store `server - local` as the offset.
    ///
    /// On failure the previous offset is kept and the error is logged; the
    /// returned error is informational only.
    pub async fn sync_clock(&mut self) -> Result<i64, ClockSyncError> {
        let measured = self.probe_server_time().await.and_then(|server_ms| {
            server_ms.checked_sub(local_time_ms()).ok_or_else(|| {
                ClockSyncError::Malformed(format!("server time {server_ms} out of range"))
            })
        });

        match measured {
            Ok(offset) => {
                self.clock_offset_ms = offset;
                info!(offset_ms = offset, "Clock synchronized with exchange");
                Ok(offset)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    offset_ms = self.clock_offset_ms,
                    "Clock sync failed, keeping previous offset"
                );
                Err(e)
            }
        }
    }

    async fn probe_server_time(&self) -> Result<i64, ClockSyncError> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{}", self.base_url, SERVER_TIME_PATH),
            path: SERVER_TIME_PATH.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            timeout: Duration::from_secs(self.config.time_sync_timeout_secs),
        };

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(ClockSyncError::Status(response.status));
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| ClockSyncError::Malformed(e.to_string()))?;
        parse_server_time_ms(&body)
    }

    // -----------------------------------------------------------------------
    // Signed requests
    // -----------------------------------------------------------------------

    /// Sign and send one request, returning the exchange envelope.
    ///
    /// Never fails: anything that goes wrong locally comes back as
    /// `{retCode: -1, retMsg: <cause>}`.
    pub async fn request(&self, method: HttpMethod, path: &str, params: &Params<'_>) -> Envelope {
        let signed = self
            .signer
            .prepare(method, path, params, self.effective_time());
        debug!(
            method = method.as_str(),
            path,
            timestamp = signed.timestamp,
            payload = %signed.payload(),
            "Sending signed request"
        );

        let request = HttpRequest {
            method,
            url: signed.url(&self.base_url),
            path: path.to_string(),
            headers: signed.headers(&self.signer),
            query: signed.sorted_query,
            timeout: Duration::from_secs(self.config.request_timeout_secs),
        };

        match self.transport.send(request).await {
            Ok(response) => decode_envelope(path, response),
            Err(e) => {
                warn!(path, error = %e, "Request failed before reaching the exchange");
                Envelope::failure(e.to_string())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    pub async fn get_wallet_balance(&self, account_type: &str) -> Envelope {
        let params = [("accountType", Some(account_type.to_string()))];
        self.request(HttpMethod::Get, WALLET_BALANCE_PATH, &params).await
    }

    pub async fn get_positions(
        &self,
        category: &str,
        symbol: Option<&str>,
        settle_coin: Option<&str>,
    ) -> Envelope {
        let params = [
            ("category", Some(category.to_string())),
            ("symbol", symbol.map(str::to_string)),
            ("settleCoin", settle_coin.map(str::to_string)),
        ];
        self.request(HttpMethod::Get, POSITION_LIST_PATH, &params).await
    }

    pub async fn get_closed_pnl(
        &self,
        category: &str,
        limit: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Envelope {
        let params = [
            ("category", Some(category.to_string())),
            ("limit", Some(limit.to_string())),
            ("startTime", start_time.map(|t| t.to_string())),
            ("endTime", end_time.map(|t| t.to_string())),
        ];
        self.request(HttpMethod::Get, CLOSED_PNL_PATH, &params).await
    }

    /// Wallet balance for the configured account type.
    pub async fn wallet(&self) -> Envelope {
        self.get_wallet_balance(&self.config.account_type).await
    }

    /// Positions for the configured category, settled in the configured coin.
    pub async fn positions(&self) -> Envelope {
        self.get_positions(&self.config.category, None, Some(&self.config.settle_coin))
            .await
    }
}

/// Read the server time from a `/v5/market/time` body, preferring the
/// nanosecond field.
pub fn parse_server_time_ms(body: &Value) -> Result<i64, ClockSyncError> {
    let result = body
        .get("result")
        .ok_or_else(|| ClockSyncError::Malformed("missing result".to_string()))?;

    if let Some(nanos) = result.get("timeNano").and_then(int_field) {
        return Ok(nanos / 1_000_000);
    }
    if let Some(secs) = result.get("timeSecond").and_then(int_field) {
        return secs.checked_mul(1000).ok_or_else(|| {
            ClockSyncError::Malformed(format!("timeSecond {secs} out of range"))
        });
    }
    Err(ClockSyncError::Malformed("missing timeSecond".to_string()))
}

fn int_field(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn decode_envelope(path: &str, response: HttpResponse) -> Envelope {
    let body: Value = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        Err(_) if !response.is_success() => return http_failure(path, &response),
        Err(e) => {
            warn!(path, error = %e, "Exchange returned a malformed body");
            return Envelope::failure(TransportError::Decode(e.to_string()).to_string());
        }
    };

    if body.get("retCode").is_none() && !response.is_success() {
        return http_failure(path, &response);
    }

    let envelope = Envelope::new(body);
    if !envelope.is_ok() {
        debug!(
            path,
            ret_code = ?envelope.ret_code(),
            ret_msg = envelope.ret_msg(),
            "Exchange returned an error"
        );
    }
    envelope
}

fn http_failure(path: &str, response: &HttpResponse) -> Envelope {
    warn!(path, status = response.status, "Exchange returned a non-success status");
    Envelope::failure(format!(
        "HTTP {}: {}",
        response.status,
        excerpt(&response.body)
    ))
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
