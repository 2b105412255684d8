//! Request events and the request lifecycle
//!
//! States form a closed enumeration. Transition targets are expressed with
//! [`TerminalState`], so `received` can never be written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AppId, Method, MilliSats, PublicKey, RequestEventId, TypesError};

/// Lifecycle state of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Recorded, handling in progress
    Received,
    /// Handler produced a success response
    HandlerExecuted,
    /// Handler failed and produced an error response
    HandlerError,
    /// Capability check refused the request
    HandlerDenied,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::HandlerExecuted => "handler_executed",
            Self::HandlerError => "handler_error",
            Self::HandlerDenied => "handler_denied",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Received => false,
            Self::HandlerExecuted | Self::HandlerError | Self::HandlerDenied => true,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "handler_executed" => Ok(Self::HandlerExecuted),
            "handler_error" => Ok(Self::HandlerError),
            "handler_denied" => Ok(Self::HandlerDenied),
            other => Err(TypesError::UnknownRequestState {
                value: other.to_string(),
            }),
        }
    }
}

/// A state a request may be advanced into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Executed,
    Error,
    Denied,
}

impl From<TerminalState> for RequestState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Executed => RequestState::HandlerExecuted,
            TerminalState::Error => RequestState::HandlerError,
            TerminalState::Denied => RequestState::HandlerDenied,
        }
    }
}

/// One record per inbound protocol request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: RequestEventId,
    pub app_id: AppId,
    /// Identifier of the protocol event that carried the request
    pub origin_event_id: String,
    /// Raw (still encrypted) request content
    pub content: String,
    pub state: RequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestEvent {
    /// Create a new event in the `received` state
    pub fn received(
        app_id: AppId,
        origin_event_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RequestEventId::new(),
            app_id,
            origin_event_id: origin_event_id.into(),
            content: content.into(),
            state: RequestState::Received,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A request as handed over by the transport layer, already authenticated
/// and decrypted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub method: Method,
    pub origin_event_id: String,
    pub content: String,
    pub sender_pubkey: PublicKey,
    /// Amount the request intends to spend, zero for reads
    #[serde(default)]
    pub amount: MilliSats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_received_is_non_terminal() {
        assert!(!RequestState::Received.is_terminal());
        for state in [TerminalState::Executed, TerminalState::Error, TerminalState::Denied] {
            assert!(RequestState::from(state).is_terminal());
        }
    }

    #[test]
    fn test_state_strings() {
        for state in [
            RequestState::Received,
            RequestState::HandlerExecuted,
            RequestState::HandlerError,
            RequestState::HandlerDenied,
        ] {
            assert_eq!(state.as_str().parse::<RequestState>().unwrap(), state);
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
    }

    #[test]
    fn test_received_event() {
        let event = RequestEvent::received(AppId::new(), "evt1", "ciphertext");
        assert_eq!(event.state, RequestState::Received);
        assert_eq!(event.origin_event_id, "evt1");
    }

    #[test]
    fn test_inbound_amount_defaults_to_zero() {
        let json = serde_json::json!({
            "method": "get_balance",
            "origin_event_id": "evt1",
            "content": "...",
            "sender_pubkey": "c9b0a3d1f2e4c6b8a0d2f4e6c8b0a2d4f6e8c0b2a4d6f8e0c2b4a6d8f0e2c4b6",
        });
        let request: InboundRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.method, Method::GetBalance);
        assert_eq!(request.amount, MilliSats::ZERO);
    }
}
