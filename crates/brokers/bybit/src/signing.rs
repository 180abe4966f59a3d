//! Request canonicalization and HMAC-SHA256 signing.
//!
//! The exchange recomputes `timestamp + api_key + recv_window + payload`
//! server-side, so the payload must be byte-identical to the query string
//! actually sent: absent parameters dropped, keys sorted ascending, values
//! unencoded.

use std::collections::BTreeMap;

use acctdash_core::{ConfigError, Credentials, HttpMethod};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters before canonicalization. `None` values are dropped.
pub type Params<'a> = [(&'a str, Option<String>)];

/// Drop absent values and sort by key. A repeated key keeps its last value.
pub fn canonical_pairs(params: &Params<'_>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .collect()
}

/// Join sorted pairs as `k=v&k=v`.
pub fn query_string(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Holds the key material and produces request signatures.
///
/// The HMAC is keyed once with the secret and cloned per signature.
#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    recv_window: String,
    mac: HmacSha256,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("credentials", &self.credentials)
            .field("recv_window", &self.recv_window)
            .finish()
    }
}

impl Signer {
    pub fn new(credentials: Credentials, recv_window_ms: u64) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(credentials.secret().as_bytes())
            .map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))?;
        Ok(Self {
            credentials,
            recv_window: recv_window_ms.to_string(),
            mac,
        })
    }

    pub fn api_key(&self) -> &str {
        self.credentials.key()
    }

    pub fn recv_window(&self) -> &str {
        &self.recv_window
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Lowercase hex HMAC-SHA256 of `timestamp + api_key + recv_window + payload`.
    pub fn sign(&self, payload: &str, timestamp: i64) -> String {
        let timestamp = timestamp.to_string();
        let key = self.credentials.key();
        let mut message = String::with_capacity(
            timestamp.len() + key.len() + self.recv_window.len() + payload.len(),
        );
        message.push_str(&timestamp);
        message.push_str(key);
        message.push_str(&self.recv_window);
        message.push_str(payload);

        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Canonicalize `params` and sign them at `timestamp`.
    pub fn prepare(
        &self,
        method: HttpMethod,
        path: &str,
        params: &Params<'_>,
        timestamp: i64,
    ) -> SignedRequest {
        let sorted_query = canonical_pairs(params);
        let signature = self.sign(&query_string(&sorted_query), timestamp);
        SignedRequest {
            method,
            path: path.to_string(),
            sorted_query,
            timestamp,
            signature,
        }
    }
}

/// One signed call. Built fresh per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub sorted_query: Vec<(String, String)>,
    pub timestamp: i64,
    pub signature: String,
}

impl SignedRequest {
    /// The exact payload that was signed.
    pub fn payload(&self) -> String {
        query_string(&self.sorted_query)
    }

    pub fn url(&self, base_url: &str) -> String {
        let payload = self.payload();
        if payload.is_empty() {
            format!("{}{}", base_url, self.path)
        } else {
            format!("{}{}?{}", base_url, self.path, payload)
        }
    }

    pub fn headers(&self, signer: &Signer) -> Vec<(String, String)> {
        vec![
            ("X-BAPI-API-KEY".to_string(), signer.api_key().to_string()),
            ("X-BAPI-SIGN".to_string(), self.signature.clone()),
            ("X-BAPI-SIGN-TYPE".to_string(), "2".to_string()),
            ("X-BAPI-TIMESTAMP".to_string(), self.timestamp.to_string()),
            ("X-BAPI-RECV-WINDOW".to_string(), signer.recv_window().to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }
}
