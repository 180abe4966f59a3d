use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Return code the exchange uses for success.
pub const RET_CODE_OK: i64 = 0;
/// Return code for failures raised on our side of the wire.
pub const RET_CODE_LOCAL_FAILURE: i64 = -1;

/// A parsed exchange response body: `{retCode, retMsg, result, ...}`.
///
/// The raw JSON is kept intact so it can be handed to callers untouched.
/// `retCode != 0` (or no `retCode` at all) is the single failure signal,
/// whether the failure happened locally or on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Value);

impl Envelope {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    /// Synthetic failure envelope for errors that never reached the exchange.
    pub fn failure(message: impl Into<String>) -> Self {
        Self(json!({
            "retCode": RET_CODE_LOCAL_FAILURE,
            "retMsg": message.into(),
        }))
    }

    /// Synthetic success envelope wrapping a list of records.
    pub fn from_list(list: Vec<Value>) -> Self {
        Self(json!({
            "retCode": RET_CODE_OK,
            "retMsg": "OK",
            "result": { "list": list },
        }))
    }

    pub fn ret_code(&self) -> Option<i64> {
        self.0.get("retCode").and_then(Value::as_i64)
    }

    pub fn ret_msg(&self) -> &str {
        self.0.get("retMsg").and_then(Value::as_str).unwrap_or("")
    }

    pub fn is_ok(&self) -> bool {
        self.ret_code() == Some(RET_CODE_OK)
    }

    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    /// `result.list`, or an empty slice if the shape is wrong.
    pub fn list(&self) -> &[Value] {
        self.result()
            .and_then(|r| r.get("list"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Envelope {
    fn from(body: Value) -> Self {
        Self(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_envelope() {
        let env = Envelope::failure("connection refused");
        assert_eq!(env.ret_code(), Some(-1));
        assert_eq!(env.ret_msg(), "connection refused");
        assert!(!env.is_ok());
        assert!(env.list().is_empty());
    }

    #[test]
    fn test_missing_ret_code_is_not_ok() {
        let env = Envelope::new(json!({ "result": { "list": [1, 2] } }));
        assert_eq!(env.ret_code(), None);
        assert!(!env.is_ok());
        assert_eq!(env.list().len(), 2);
    }

    #[test]
    fn test_list_tolerates_wrong_shape() {
        let env = Envelope::new(json!({ "retCode": 0, "result": { "list": "nope" } }));
        assert!(env.is_ok());
        assert!(env.list().is_empty());
    }

    #[test]
    fn test_serializes_transparently() {
        let env = Envelope::from_list(vec![json!({ "orderId": "A1" })]);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["retCode"], 0);
        assert_eq!(json["result"]["list"][0]["orderId"], "A1");
    }
}
