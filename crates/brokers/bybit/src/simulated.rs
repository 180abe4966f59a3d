use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use acctdash_core::*;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{
    local_time_ms, CLOSED_PNL_PATH, POSITION_LIST_PATH, SERVER_TIME_PATH, WALLET_BALANCE_PATH,
};

type Responder = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// An in-process transport that answers from a routing table.
///
/// Replies are keyed by request path. Every request is recorded, so tests
/// can assert on what was sent and how often. Unrouted paths fail with a
/// connection error.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, Responder>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with HTTP 200 and `body`.
    pub fn with_json(self, path: &str, body: Value) -> Self {
        let body = body.to_string();
        self.with_handler(path, move |_| {
            Ok(HttpResponse {
                status: 200,
                body: body.clone(),
            })
        })
    }

    /// Answer `path` with a fixed status and raw body.
    pub fn with_status(self, path: &str, status: u16, body: &str) -> Self {
        let body = body.to_string();
        self.with_handler(path, move |_| {
            Ok(HttpResponse {
                status,
                body: body.clone(),
            })
        })
    }

    /// Fail every call to `path` with `error`.
    pub fn with_error(self, path: &str, error: TransportError) -> Self {
        self.with_handler(path, move |_| Err(error.clone()))
    }

    /// Compute the reply for `path` from the request.
    pub fn with_handler<F>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        self.routes.insert(path.to_string(), Arc::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn calls_to(&self, path: &str) -> Vec<HttpRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    /// A plausible unified account: two coins, one open and one flat
    /// position, and a closed trade in every history window plus one that
    /// every window reports.
    pub fn sample_account() -> Self {
        Self::new()
            .with_handler(SERVER_TIME_PATH, |_| {
                let now = local_time_ms();
                Ok(json_response(json!({
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": {
                        "timeSecond": (now / 1000).to_string(),
                        "timeNano": (i128::from(now) * 1_000_000).to_string(),
                    },
                })))
            })
            .with_json(
                WALLET_BALANCE_PATH,
                json!({
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": { "list": [{
                        "accountType": "UNIFIED",
                        "totalEquity": "10523.41",
                        "coin": [
                            { "coin": "USDT", "equity": "9321.12", "walletBalance": "9300.00", "usdValue": "9321.95" },
                            { "coin": "BTC", "equity": "0.0175", "walletBalance": "0.0175", "usdValue": "1201.46" }
                        ]
                    }]},
                }),
            )
            .with_json(
                POSITION_LIST_PATH,
                json!({
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": { "category": "linear", "list": [
                        {
                            "symbol": "BTCUSDT", "side": "Buy", "size": "0.010",
                            "avgPrice": "67120.5", "markPrice": "68655.2", "unrealisedPnl": "15.347",
                            "leverage": "10", "positionValue": "671.205", "liqPrice": "60811.3",
                            "breakEvenPrice": "67157.4", "positionIM": "67.12", "positionMM": "3.69",
                            "takeProfit": "72000", "stopLoss": "64000"
                        },
                        {
                            "symbol": "ETHUSDT", "side": "", "size": "0",
                            "avgPrice": "0", "markPrice": "3520.1", "unrealisedPnl": "0",
                            "leverage": "5", "positionValue": "0", "liqPrice": "",
                            "breakEvenPrice": "0", "positionIM": "0", "positionMM": "0",
                            "takeProfit": "0", "stopLoss": "0"
                        }
                    ]},
                }),
            )
            .with_handler(CLOSED_PNL_PATH, |req| {
                let end = req
                    .query_param("endTime")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or_else(local_time_ms);
                let start = req
                    .query_param("startTime")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(end);
                let list = vec![
                    sample_trade(&format!("sim-{}", end), "BTCUSDT", "Sell", "12.84", start, end),
                    sample_trade("sim-recurring", "ETHUSDT", "Buy", "-3.10", start, start),
                ];
                Ok(json_response(json!({
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": { "category": "linear", "list": list },
                })))
            })
    }
}

fn json_response(body: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: body.to_string(),
    }
}

fn sample_trade(
    order_id: &str,
    symbol: &str,
    side: &str,
    pnl: &str,
    created: i64,
    updated: i64,
) -> Value {
    json!({
        "orderId": order_id,
        "symbol": symbol,
        "orderType": "Market",
        "side": side,
        "qty": "0.010",
        "avgEntryPrice": "66200.0",
        "avgExitPrice": "67484.0",
        "closedPnl": pnl,
        "createdTime": created.to_string(),
        "updatedTime": updated.to_string(),
        "leverage": "10",
    })
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match self.routes.get(&request.path) {
            Some(responder) => responder(&request),
            None => Err(TransportError::Connect(format!(
                "no route for {}",
                request.path
            ))),
        }
    }
}
