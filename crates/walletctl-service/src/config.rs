//! Service configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use walletctl_types::RequestContext;

use crate::LndConfig;

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Deadline for a whole request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub lnd: LndConfig,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            lnd: LndConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = LndConfig::default();
        Self {
            request_timeout_ms: std::env::var("WALLETCTL_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_request_timeout_ms),
            lnd: LndConfig {
                url: std::env::var("WALLETCTL_LND_URL").unwrap_or(defaults.url),
                macaroon_hex: std::env::var("WALLETCTL_LND_MACAROON_HEX").ok(),
                accept_invalid_certs: std::env::var("WALLETCTL_LND_ACCEPT_INVALID_CERTS")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(defaults.accept_invalid_certs),
                timeout_secs: defaults.timeout_secs,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// A fresh context for one request
    pub fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout())
    }
}
