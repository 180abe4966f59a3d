//! Closed-PnL history over ranges wider than one API call may cover.
//!
//! The range is walked backward from its end in windows no wider than the
//! configured width, one page per window. Adjacent windows share a boundary
//! instant, so the merged list is deduplicated by `orderId` (first seen wins)
//! and sorted by `updatedTime`, newest first. A failed window is skipped
//! unless every window failed, in which case the last failure is returned.

use std::collections::HashSet;

use acctdash_core::Envelope;
use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::BybitClient;

/// A closed time interval `[start_ms, end_ms]` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Partition `[range_start_ms, range_end_ms]` walking backward from the end.
///
/// Each window is `[max(range_start, end - width), end]` and the next one ends
/// where the previous started. Empty when the range is empty or `width_ms`
/// is not positive.
pub fn backward_windows(range_start_ms: i64, range_end_ms: i64, width_ms: i64) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if width_ms <= 0 {
        return windows;
    }

    let mut current_end = range_end_ms;
    while current_end > range_start_ms {
        let start = range_start_ms.max(current_end.saturating_sub(width_ms));
        windows.push(TimeWindow {
            start_ms: start,
            end_ms: current_end,
        });
        current_end = start;
    }
    windows
}

/// Epoch milliseconds of 00:00:00.000 on the first day of `now`'s month, in
/// `now`'s time zone.
pub fn month_start_ms<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let first_day = now.date_naive() - chrono::Duration::days(i64::from(now.day0()));
    let midnight = first_day.and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.timestamp_millis())
        // Midnight skipped by a DST change; fall back to the UTC reading.
        .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
}

/// Keep the first record per `orderId`, then sort by `updatedTime` descending.
///
/// Records without an `orderId` are dropped. The sort is stable, so records
/// with equal `updatedTime` keep their first-seen order.
pub fn dedup_and_sort(records: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(records.len());

    for record in records {
        let Some(order_id) = record.get("orderId").and_then(Value::as_str) else {
            warn!(record = %record, "Dropping closed-pnl record without orderId");
            continue;
        };
        if seen.insert(order_id.to_string()) {
            unique.push(record);
        }
    }

    unique.sort_by_key(|r| std::cmp::Reverse(updated_time_ms(r)));
    unique
}

/// `updatedTime` as epoch milliseconds; 0 when missing or unparsable.
pub fn updated_time_ms(record: &Value) -> i64 {
    match record.get("updatedTime") {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        _ => 0,
    }
}

impl BybitClient {
    /// Fetch every closed-pnl record in `[start_ms, end_ms]`.
    ///
    /// A window that fails is logged and skipped, the rest still count. The
    /// result is a success envelope wrapping the merged list, or the last
    /// failure when no window succeeded.
    pub async fn fetch_closed_pnl_range(&self, start_ms: i64, end_ms: i64) -> Envelope {
        let windows = backward_windows(start_ms, end_ms, self.config().history_window_ms());
        let category = self.config().category.clone();
        let limit = self.config().history_page_limit;

        info!(
            start_ms,
            end_ms,
            windows = windows.len(),
            "Fetching closed-pnl history"
        );

        let mut records = Vec::new();
        let mut last_failure = None;
        let mut succeeded = 0usize;
        for window in &windows {
            let envelope = self
                .get_closed_pnl(&category, limit, Some(window.start_ms), Some(window.end_ms))
                .await;

            if !envelope.is_ok() {
                warn!(
                    start_ms = window.start_ms,
                    end_ms = window.end_ms,
                    ret_code = ?envelope.ret_code(),
                    ret_msg = envelope.ret_msg(),
                    "Skipping failed closed-pnl window"
                );
                last_failure = Some(envelope);
                continue;
            }
            succeeded += 1;

            let page = envelope.list();
            debug!(
                start_ms = window.start_ms,
                end_ms = window.end_ms,
                records = page.len(),
                "Fetched closed-pnl window"
            );
            if page.len() >= limit as usize {
                warn!(
                    start_ms = window.start_ms,
                    end_ms = window.end_ms,
                    limit,
                    "Closed-pnl window hit the page limit, older records may be missing"
                );
            }
            records.extend(page.iter().cloned());
        }

        if succeeded == 0 {
            if let Some(failure) = last_failure {
                warn!(windows = windows.len(), "Every closed-pnl window failed");
                return failure;
            }
        }

        let merged = dedup_and_sort(records);
        debug!(records = merged.len(), "Merged closed-pnl history");
        Envelope::from_list(merged)
    }

    /// Closed-pnl records from the start of the current local month until now.
    pub async fn fetch_month_closed_pnl(&self) -> Envelope {
        let now = Local::now();
        self.fetch_closed_pnl_range(month_start_ms(&now), now.timestamp_millis())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CLOSED_PNL_PATH;
    use crate::simulated::ScriptedTransport;
    use acctdash_core::{ClientConfig, Credentials, HttpResponse, TransportError};
    use chrono::{FixedOffset, Utc};
    use serde_json::json;
    use std::sync::Arc;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const WEEK_MS: i64 = 7 * DAY_MS;

    fn assert_covers(windows: &[TimeWindow], start: i64, end: i64) {
        assert_eq!(windows.first().map(|w| w.end_ms), Some(end));
        assert_eq!(windows.last().map(|w| w.start_ms), Some(start));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].start_ms, pair[1].end_ms, "gap between windows");
        }
        for w in windows {
            assert!(w.start_ms < w.end_ms);
            assert!(w.end_ms - w.start_ms <= WEEK_MS);
        }
    }

    #[test]
    fn test_31_day_range_takes_five_windows() {
        let end = 1_700_000_000_000;
        let start = end - 31 * DAY_MS;
        let windows = backward_windows(start, end, WEEK_MS);
        assert_eq!(windows.len(), 5);
        assert_covers(&windows, start, end);
        assert_eq!(windows[4].end_ms - windows[4].start_ms, 3 * DAY_MS);
    }

    #[test]
    fn test_short_and_empty_ranges() {
        let end = 1_700_000_000_000;
        let windows = backward_windows(end - 3 * DAY_MS, end, WEEK_MS);
        assert_eq!(
            windows,
            vec![TimeWindow {
                start_ms: end - 3 * DAY_MS,
                end_ms: end
            }]
        );

        assert!(backward_windows(end, end, WEEK_MS).is_empty());
        assert!(backward_windows(end + 1, end, WEEK_MS).is_empty());
        assert!(backward_windows(0, end, 0).is_empty());
    }

    #[test]
    fn test_exact_multiple_of_width() {
        let end = 1_700_000_000_000;
        let windows = backward_windows(end - 14 * DAY_MS, end, WEEK_MS);
        assert_eq!(windows.len(), 2);
        assert_covers(&windows, end - 14 * DAY_MS, end);
    }

    #[test]
    fn test_month_start_in_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 15, 42, 9).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(month_start_ms(&now), expected.timestamp_millis());
    }

    #[test]
    fn test_month_start_uses_local_offset() {
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        // 2024-04-01 02:00 at +05:00 is still March in UTC.
        let now = tz.with_ymd_and_hms(2024, 4, 1, 2, 0, 0).unwrap();
        let expected = tz.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(month_start_ms(&now), expected.timestamp_millis());
    }

    #[test]
    fn test_dedup_keeps_first_and_sorts_descending() {
        let records = vec![
            json!({ "orderId": "A1", "updatedTime": "200", "closedPnl": "first" }),
            json!({ "orderId": "B2", "updatedTime": "300" }),
            json!({ "orderId": "A1", "updatedTime": "200", "closedPnl": "second" }),
            json!({ "orderId": "C3", "updatedTime": "100" }),
            json!({ "updatedTime": "999" }),
            json!({ "orderId": "D4" }),
        ];
        let merged = dedup_and_sort(records);

        let ids: Vec<&str> = merged.iter().map(|r| r["orderId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["B2", "A1", "C3", "D4"]);
        assert_eq!(merged[1]["closedPnl"], "first");
    }

    fn client(transport: Arc<ScriptedTransport>) -> BybitClient {
        BybitClient::new(
            Credentials::new("key", "secret", true).unwrap(),
            ClientConfig::default(),
            transport,
        )
        .unwrap()
    }

    fn page(list: Vec<serde_json::Value>) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: json!({ "retCode": 0, "retMsg": "OK", "result": { "list": list } }).to_string(),
        }
    }

    #[tokio::test]
    async fn test_overlapping_windows_yield_one_record() {
        let transport = Arc::new(ScriptedTransport::new().with_handler(CLOSED_PNL_PATH, |req| {
            let end: i64 = req.query_param("endTime").unwrap().parse().unwrap();
            Ok(page(vec![
                json!({ "orderId": "A1", "updatedTime": "1000" }),
                json!({ "orderId": format!("W{}", end), "updatedTime": end.to_string() }),
            ]))
        }));
        let client = client(transport.clone());

        let end = 1_700_000_000_000;
        let envelope = client.fetch_closed_pnl_range(end - 10 * DAY_MS, end).await;

        assert!(envelope.is_ok());
        assert_eq!(transport.calls_to(CLOSED_PNL_PATH).len(), 2);
        let list = envelope.list();
        assert_eq!(list.iter().filter(|r| r["orderId"] == "A1").count(), 1);
        assert_eq!(list.len(), 3);

        let times: Vec<i64> = list.iter().map(updated_time_ms).collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_window_requests_carry_bounds_and_limit() {
        let transport = Arc::new(
            ScriptedTransport::new().with_handler(CLOSED_PNL_PATH, |_| Ok(page(vec![]))),
        );
        let client = client(transport.clone());

        let end = 1_700_000_000_000;
        let start = end - 31 * DAY_MS;
        client.fetch_closed_pnl_range(start, end).await;

        let calls = transport.calls_to(CLOSED_PNL_PATH);
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0].query_param("endTime"), Some(end.to_string().as_str()));
        assert_eq!(calls[4].query_param("startTime"), Some(start.to_string().as_str()));
        for call in &calls {
            assert_eq!(call.query_param("category"), Some("linear"));
            assert_eq!(call.query_param("limit"), Some("50"));
        }
    }

    #[tokio::test]
    async fn test_failed_window_is_skipped() {
        let end = 1_700_000_000_000;
        let failing_end = end - 7 * DAY_MS;
        let transport = Arc::new(ScriptedTransport::new().with_handler(
            CLOSED_PNL_PATH,
            move |req| {
                let window_end: i64 = req.query_param("endTime").unwrap().parse().unwrap();
                if window_end == failing_end {
                    return Err(TransportError::Timeout("window timed out".into()));
                }
                Ok(page(vec![json!({
                    "orderId": format!("W{}", window_end),
                    "updatedTime": window_end.to_string(),
                })]))
            },
        ));
        let client = client(transport.clone());

        let envelope = client.fetch_closed_pnl_range(end - 20 * DAY_MS, end).await;

        assert!(envelope.is_ok());
        assert_eq!(transport.calls_to(CLOSED_PNL_PATH).len(), 3);
        let ids: Vec<&str> = envelope
            .list()
            .iter()
            .map(|r| r["orderId"].as_str().unwrap())
            .collect();
        assert_eq!(
            ids,
            vec![format!("W{}", end), format!("W{}", end - 14 * DAY_MS)]
        );
    }

    #[tokio::test]
    async fn test_every_window_failing_reports_the_failure() {
        let transport = Arc::new(ScriptedTransport::new().with_json(
            CLOSED_PNL_PATH,
            json!({ "retCode": 10002, "retMsg": "invalid request, please check your server timestamp" }),
        ));
        let client = client(transport.clone());

        let end = 1_700_000_000_000;
        let envelope = client.fetch_closed_pnl_range(end - 10 * DAY_MS, end).await;
        assert_eq!(transport.calls_to(CLOSED_PNL_PATH).len(), 2);
        assert!(!envelope.is_ok());
        assert_eq!(envelope.ret_code(), Some(10002));
        assert!(envelope.ret_msg().contains("server timestamp"));
    }

    #[tokio::test]
    async fn test_empty_range_is_an_empty_success() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());

        let end = 1_700_000_000_000;
        let envelope = client.fetch_closed_pnl_range(end, end).await;
        assert!(envelope.is_ok());
        assert!(envelope.list().is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_month_range_ends_at_start_of_call() {
        let transport = Arc::new(
            ScriptedTransport::new().with_handler(CLOSED_PNL_PATH, |_| Ok(page(vec![]))),
        );
        let client = client(transport.clone());

        let before = Local::now();
        client.fetch_month_closed_pnl().await;
        let after = Local::now();

        let calls = transport.calls_to(CLOSED_PNL_PATH);
        let end: i64 = calls[0].query_param("endTime").unwrap().parse().unwrap();
        assert!(end >= before.timestamp_millis() && end <= after.timestamp_millis());
        let start: i64 = calls.last().unwrap().query_param("startTime").unwrap().parse().unwrap();
        assert_eq!(start, month_start_ms(&before));
    }
}
