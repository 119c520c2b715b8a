//! Device credential bundle

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Invalid token payload: {0}")]
    InvalidToken(#[from] serde_json::Error),

    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// Credential bundle handed to the app when a device is paired
///
/// Delivered as base64-encoded JSON with camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    /// Hardware serial number of the device
    pub serial_number: String,
    /// Bearer credential presented to the hub
    pub token: String,
    /// Identifier of the app installation the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_identifier: Option<String>,
}

impl AuthToken {
    pub fn from_base64(encoded: &str) -> Result<Self, AuthError> {
        let raw = STANDARD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn to_base64(&self) -> Result<String, AuthError> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}
