//! Response construction
//!
//! Builds the NIP-47 response body for a request. Encryption and signing
//! belong to the transport.

use serde::{Deserialize, Serialize};
use walletctl_types::{
    BudgetRenewal, InboundRequest, Method, MilliSats, PublicKey, RequestEventId, ResponseError,
};

/// `get_balance` result, amounts in millisats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePayload {
    pub balance: MilliSats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<MilliSats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_renewal: Option<BudgetRenewal>,
}

/// Exactly one of a result or an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(BalancePayload),
    Error(ResponseError),
}

/// NIP-47 response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub result_type: Method,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn success(method: Method, payload: BalancePayload) -> Self {
        Self {
            result_type: method,
            outcome: Outcome::Result(payload),
        }
    }

    pub fn failure(method: Method, error: ResponseError) -> Self {
        Self {
            result_type: method,
            outcome: Outcome::Error(error),
        }
    }

    pub fn result(&self) -> Option<&BalancePayload> {
        match &self.outcome {
            Outcome::Result(payload) => Some(payload),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ResponseError> {
        match &self.outcome {
            Outcome::Error(error) => Some(error),
            Outcome::Result(_) => None,
        }
    }
}

/// A response addressed back to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Ledger entry this response answers
    pub request_event_id: RequestEventId,
    /// Transport-level ID of the request, for correlation
    pub origin_event_id: String,
    pub recipient: PublicKey,
    pub response: Response,
}

impl ResponseEnvelope {
    /// JSON body of the response, as handed to the transport
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.response)
    }
}

pub fn build_response(
    request_event_id: &RequestEventId,
    request: &InboundRequest,
    outcome: Outcome,
) -> ResponseEnvelope {
    ResponseEnvelope {
        request_event_id: request_event_id.clone(),
        origin_event_id: request.origin_event_id.clone(),
        recipient: request.sender_pubkey.clone(),
        response: Response {
            result_type: request.method,
            outcome,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use walletctl_types::ErrorCode;

    fn request() -> InboundRequest {
        InboundRequest {
            method: Method::GetBalance,
            origin_event_id: "origin-1".to_string(),
            content: "{}".to_string(),
            sender_pubkey: PublicKey::parse(
                "c9b0a3d1f2e4c6b8a0d2f4e6c8b0a2d4f6e8c0b2a4d6f8e0c2b4a6d8f0e2c4b6",
            )
            .unwrap(),
            amount: MilliSats::default(),
        }
    }

    fn body(envelope: &ResponseEnvelope) -> Value {
        serde_json::from_str(&envelope.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_capped_result_shape() {
        let envelope = build_response(
            &RequestEventId::new(),
            &request(),
            Outcome::Result(BalancePayload {
                balance: MilliSats(2_000_000),
                max_amount: Some(MilliSats(3_000_000)),
                budget_renewal: Some(BudgetRenewal::Monthly),
            }),
        );
        assert_eq!(
            body(&envelope),
            json!({
                "result_type": "get_balance",
                "result": {
                    "balance": 2000000,
                    "max_amount": 3000000,
                    "budget_renewal": "monthly"
                }
            })
        );
    }

    #[test]
    fn test_uncapped_result_omits_budget_fields() {
        let envelope = build_response(
            &RequestEventId::new(),
            &request(),
            Outcome::Result(BalancePayload {
                balance: MilliSats(0),
                max_amount: None,
                budget_renewal: None,
            }),
        );
        assert_eq!(
            body(&envelope),
            json!({ "result_type": "get_balance", "result": { "balance": 0 } })
        );
    }

    #[test]
    fn test_error_shape_has_no_result() {
        let envelope = build_response(
            &RequestEventId::new(),
            &request(),
            Outcome::Error(ResponseError::new(
                ErrorCode::Restricted,
                "This app does not have permission to request get_balance",
            )),
        );
        let value = body(&envelope);
        assert_eq!(value["result_type"], "get_balance");
        assert_eq!(value["error"]["code"], "RESTRICTED");
        assert!(value.get("result").is_none());
        assert!(envelope.response.result().is_none());
    }

    #[test]
    fn test_envelope_addresses_sender() {
        let req = request();
        let id = RequestEventId::new();
        let envelope = build_response(&id, &req, Outcome::Error(ResponseError::internal("x")));
        assert_eq!(envelope.request_event_id, id);
        assert_eq!(envelope.origin_event_id, "origin-1");
        assert_eq!(envelope.recipient, req.sender_pubkey);
    }

    #[test]
    fn test_response_deserializes() {
        let response: Response = serde_json::from_value(json!({
            "result_type": "get_balance",
            "error": { "code": "INTERNAL", "message": "boom" }
        }))
        .unwrap();
        assert_eq!(response.error().map(|e| e.code), Some(ErrorCode::Internal));
    }
}
