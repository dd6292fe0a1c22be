//! Client settings: where requests go and how long they may take.

use std::time::Duration;

use crate::error::ApiError;

/// Production base URL of the Drip v2 API.
pub const DEFAULT_BASE_URL: &str = "https://api.getdrip.com/v2/";

/// Time allowed to establish the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the TLS handshake once connected.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a whole request, from dial to last body byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings used to build a `DripClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL, always ending in exactly one `/`.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            tls_handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Point the client somewhere other than production, e.g. a local mock.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = normalize_base_url(base_url);
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, tls_handshake: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.tls_handshake_timeout = tls_handshake;
        self.request_timeout = request;
        self
    }

    /// Limit for ureq's connect phase, which covers both the TCP dial and the
    /// TLS handshake. Each step has its own budget of the same length, so the
    /// phase gets the larger of the two, never more than the whole request.
    pub fn connect_phase_timeout(&self) -> Duration {
        self.connect_timeout
            .max(self.tls_handshake_timeout)
            .min(self.request_timeout)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let scheme_ok = self.base_url.starts_with("https://") || self.base_url.starts_with("http://");
        if !scheme_ok {
            return Err(ApiError::Config(format!(
                "base URL must be http(s), got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ApiError::Config("request timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn normalize_base_url(base_url: &str) -> String {
    format!("{}/", base_url.trim().trim_end_matches('/'))
}
