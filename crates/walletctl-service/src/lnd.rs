//! LND funding backend over the REST gateway
//!
//! Reports the node's local channel balance. The node is a single
//! custodian, so the requesting identity does not change the answer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walletctl_types::{PublicKey, Sats};

use crate::{BackendError, FundingBackend};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Connection settings for an LND node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LndConfig {
    /// Base URL of the REST gateway
    #[serde(default = "default_lnd_url")]
    pub url: String,
    /// Hex-encoded macaroon sent with every call
    #[serde(default)]
    pub macaroon_hex: Option<String>,
    /// Accept the node's self-signed TLS certificate
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_lnd_timeout")]
    pub timeout_secs: u64,
}

fn default_lnd_url() -> String {
    "https://localhost:8080".to_string()
}

fn default_lnd_timeout() -> u64 {
    30
}

impl Default for LndConfig {
    fn default() -> Self {
        Self {
            url: default_lnd_url(),
            macaroon_hex: None,
            accept_invalid_certs: false,
            timeout_secs: default_lnd_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelBalanceResponse {
    #[serde(default)]
    local_balance: Option<LndAmount>,
}

#[derive(Debug, Deserialize)]
struct LndAmount {
    /// uint64 fields arrive as JSON strings from the gateway
    #[serde(default)]
    sat: Option<serde_json::Value>,
}

fn parse_sat(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// LND REST client
#[derive(Clone)]
pub struct LndRestBackend {
    client: reqwest::Client,
    base_url: String,
    macaroon_hex: Option<String>,
}

impl LndRestBackend {
    pub fn new(config: &LndConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            macaroon_hex: config.macaroon_hex.clone(),
        })
    }

    async fn channel_balance(&self) -> Result<ChannelBalanceResponse, BackendError> {
        let mut request = self
            .client
            .get(format!("{}/v1/balance/channels", self.base_url));
        if let Some(macaroon) = &self.macaroon_hex {
            request = request.header(MACAROON_HEADER, macaroon);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChannelBalanceResponse>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FundingBackend for LndRestBackend {
    async fn get_balance(&self, _identity: &PublicKey) -> Result<Sats, BackendError> {
        let balance = self.channel_balance().await?;
        let sats = match balance.local_balance.and_then(|b| b.sat) {
            Some(value) => parse_sat(&value)
                .ok_or_else(|| BackendError::Decode(format!("bad local_balance.sat: {}", value)))?,
            None => 0,
        };
        debug!(sats, "Fetched LND channel balance");
        Ok(Sats(sats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn identity() -> PublicKey {
        PublicKey::parse("c9b0a3d1f2e4c6b8a0d2f4e6c8b0a2d4f6e8c0b2a4d6f8e0c2b4a6d8f0e2c4b6")
            .unwrap()
    }

    fn backend_for(server: &MockServer, macaroon: Option<&str>) -> LndRestBackend {
        LndRestBackend::new(&LndConfig {
            url: server.base_url(),
            macaroon_hex: macaroon.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_local_balance_with_macaroon() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/balance/channels")
                    .header(MACAROON_HEADER, "0201036c6e64");
                then.status(200).json_body(json!({
                    "balance": "5000",
                    "local_balance": { "sat": "5000", "msat": "5000000" },
                    "remote_balance": { "sat": "100", "msat": "100000" }
                }));
            })
            .await;

        let backend = backend_for(&server, Some("0201036c6e64"));
        assert_eq!(backend.get_balance(&identity()).await.unwrap(), Sats(5000));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_local_balance_is_zero() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/balance/channels");
                then.status(200).json_body(json!({}));
            })
            .await;

        let backend = backend_for(&server, None);
        assert_eq!(backend.get_balance(&identity()).await.unwrap(), Sats(0));
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/balance/channels");
                then.status(500).body("permission denied");
            })
            .await;

        let backend = backend_for(&server, None);
        match backend.get_balance(&identity()).await {
            Err(BackendError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "permission denied");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_amount_is_decode_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/balance/channels");
                then.status(200)
                    .json_body(json!({ "local_balance": { "sat": "lots" } }));
            })
            .await;

        let backend = backend_for(&server, None);
        assert!(matches!(
            backend.get_balance(&identity()).await,
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_sat_accepts_numbers_and_strings() {
        assert_eq!(parse_sat(&json!("42")), Some(42));
        assert_eq!(parse_sat(&json!(42)), Some(42));
        assert_eq!(parse_sat(&json!(null)), None);
    }
}
