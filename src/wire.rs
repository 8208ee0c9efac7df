//! Messages exchanged between the local and cloud services.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::types::{ClientId, Label, ScalarValue};

/// Balance text returned when a client has no transactions. Contains spaces,
/// so it can never be mistaken for base64.
pub const NO_TRANSACTIONS_SENTINEL: &str = "no transactions found";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_NO_TRANSACTIONS: &str = "no_transactions";

/// One encrypted deposit on its way to the cloud. Binary fields are raw
/// envelope bytes, never text-encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestRequest {
    pub client_id: ClientId,
    pub label: Label,
    pub encrypted_value: Vec<u8>,
    pub context: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestAck {
    pub status: String,
}

impl IngestAck {
    pub fn success() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRequest {
    pub client_id: ClientId,
}

/// JSON body of the cloud balance reply: base64 ciphertext or the sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEnvelope {
    pub balance: String,
}

/// Decoded cloud balance reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregateReply {
    Sum(Vec<u8>),
    NoTransactions,
}

impl AggregateReply {
    pub fn to_envelope(&self) -> BalanceEnvelope {
        let balance = match self {
            AggregateReply::Sum(bytes) => codec::to_transport_text(bytes),
            AggregateReply::NoTransactions => NO_TRANSACTIONS_SENTINEL.to_string(),
        };
        BalanceEnvelope { balance }
    }

    pub fn from_envelope(envelope: &BalanceEnvelope) -> Result<Self, CodecError> {
        if envelope.balance == NO_TRANSACTIONS_SENTINEL {
            return Ok(AggregateReply::NoTransactions);
        }
        codec::from_transport_text(&envelope.balance).map(AggregateReply::Sum)
    }
}

/// Local deposit request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub client_id: ClientId,
    #[serde(default)]
    pub label: Label,
    pub value: ScalarValue,
}

/// Local balance response: a rounded number, or the no-transactions status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalBalanceResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub balance: Option<ScalarValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
}

impl LocalBalanceResponse {
    pub fn balance(value: ScalarValue) -> Self {
        Self {
            balance: Some(value),
            status: None,
        }
    }

    pub fn no_transactions() -> Self {
        Self {
            balance: None,
            status: Some(STATUS_NO_TRANSACTIONS.to_string()),
        }
    }
}

/// JSON error body shared by both services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinel_and_sum_are_distinguishable() {
        let empty = AggregateReply::NoTransactions.to_envelope();
        assert_eq!(empty.balance, NO_TRANSACTIONS_SENTINEL);
        assert_eq!(
            AggregateReply::from_envelope(&empty).unwrap(),
            AggregateReply::NoTransactions
        );

        let sum = AggregateReply::Sum(vec![0, 0, 0]);
        let envelope = sum.to_envelope();
        assert_eq!(envelope.balance, "AAAA");
        assert_eq!(AggregateReply::from_envelope(&envelope).unwrap(), sum);
    }

    #[test]
    fn garbage_balance_text_is_a_codec_error() {
        let envelope = BalanceEnvelope {
            balance: "nada encontrado".into(),
        };
        assert!(AggregateReply::from_envelope(&envelope).is_err());
    }

    #[test]
    fn local_balance_json_shapes() {
        assert_eq!(
            serde_json::to_value(LocalBalanceResponse::balance(150.5)).unwrap(),
            serde_json::json!({"balance": 150.5})
        );
        assert_eq!(
            serde_json::to_value(LocalBalanceResponse::no_transactions()).unwrap(),
            serde_json::json!({"status": "no_transactions"})
        );
    }

    #[test]
    fn deposit_label_defaults_to_empty() {
        let req: DepositRequest =
            serde_json::from_str(r#"{"client_id":"c1","value":-30.0}"#).unwrap();
        assert_eq!(req.label, Label::default());
        assert_eq!(req.value, -30.0);
    }
}
