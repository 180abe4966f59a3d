use std::sync::Arc;

use acctdash_core::{ClientConfig, ConfigError, Credentials, HttpTransport};

/// Shared application state accessible by all route handlers.
///
/// Credentials are resolved once at startup. A missing key or secret is kept
/// as an error so every request can report it without touching the network.
pub struct AppState {
    pub credentials: Result<Credentials, ConfigError>,
    pub config: ClientConfig,
    pub transport: Arc<dyn HttpTransport>,
}

impl AppState {
    pub fn new(
        credentials: Result<Credentials, ConfigError>,
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            credentials,
            config,
            transport,
        }
    }
}
