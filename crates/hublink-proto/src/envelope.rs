//! Request envelope and reply decoding

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Errors decoding an inbound hub reply
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Reply carried no arguments")]
    MissingArgument,

    #[error("Reply has no \"value\" field")]
    MissingValue,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Correlation data attached to every outbound request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallIdentifier {
    pub request_nonce: Uuid,
}

/// Outbound request envelope
///
/// Serializes as `{"callIdentifier": {"requestNonce": "<uuid>"}, "value": ...}`;
/// `value` is omitted entirely when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub call_identifier: CallIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Envelope {
    /// Build an envelope with a fresh random request nonce
    pub fn new(value: Option<Value>) -> Self {
        Self {
            call_identifier: CallIdentifier {
                request_nonce: Uuid::new_v4(),
            },
            value,
        }
    }

    pub fn nonce(&self) -> Uuid {
        self.call_identifier.request_nonce
    }

    /// Hub invocation arguments: the envelope is always the single argument
    pub fn into_arguments(self) -> Result<Vec<Value>, ProtoError> {
        Ok(vec![serde_json::to_value(self)?])
    }
}

/// Extract `args[0]["value"]` from an inbound reply and deserialize it
pub fn reply_value<T: DeserializeOwned>(args: &[Value]) -> Result<T, ProtoError> {
    let first = args.first().ok_or(ProtoError::MissingArgument)?;
    let value = first.get("value").ok_or(ProtoError::MissingValue)?;
    Ok(T::deserialize(value)?)
}
