//! Connection descriptor consumed by the hub supervisor

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::token::{AuthError, AuthToken};

/// Where and as whom to connect
///
/// The supervisor calls [`Connection::refresh_token`] before every connection
/// attempt and then reads [`Connection::get_token`] into the channel's
/// `Authorization` header.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Service base URL
    fn url(&self) -> &str;

    /// Device serial number, used to tag log output
    fn serial_number(&self) -> &str;

    /// Obtain a fresh bearer credential if the current one needs renewing
    async fn refresh_token(&self) -> Result<(), AuthError>;

    /// Current bearer credential
    fn get_token(&self) -> String;
}

/// Connection with a fixed credential that is replaced out of band
#[derive(Debug)]
pub struct StaticConnection {
    url: String,
    serial_number: String,
    token: RwLock<AuthToken>,
    refreshes: AtomicUsize,
}

impl StaticConnection {
    pub fn new(url: impl Into<String>, token: AuthToken) -> Self {
        Self {
            url: url.into(),
            serial_number: token.serial_number.clone(),
            token: RwLock::new(token),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Build from the base64 bundle the app receives when pairing
    pub fn from_base64(url: impl Into<String>, encoded: &str) -> Result<Self, AuthError> {
        Ok(Self::new(url, AuthToken::from_base64(encoded)?))
    }

    /// Replace the bearer credential; picked up on the next connection attempt
    pub fn set_token(&self, token: impl Into<String>) {
        self.token.write().unwrap().token = token.into();
    }

    /// Number of times the supervisor asked for a refresh
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for StaticConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    async fn refresh_token(&self) -> Result<(), AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_token(&self) -> String {
        self.token.read().unwrap().token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AuthToken {
        AuthToken {
            serial_number: "FW-0042".to_string(),
            token: "first".to_string(),
            app_identifier: None,
        }
    }

    #[tokio::test]
    async fn test_static_connection() {
        let connection = StaticConnection::new("https://hub.example.com", token());

        assert_eq!(connection.url(), "https://hub.example.com");
        assert_eq!(connection.serial_number(), "FW-0042");
        assert_eq!(connection.get_token(), "first");

        connection.refresh_token().await.unwrap();
        connection.set_token("second");
        assert_eq!(connection.get_token(), "second");
        assert_eq!(connection.refresh_count(), 1);
    }

    #[test]
    fn test_from_base64() {
        let encoded = token().to_base64().unwrap();
        let connection = StaticConnection::from_base64("https://hub.example.com", &encoded).unwrap();
        assert_eq!(connection.serial_number(), "FW-0042");

        assert!(StaticConnection::from_base64("https://hub.example.com", "***").is_err());
    }
}
