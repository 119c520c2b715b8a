//! Credentials for the hub connection

pub mod connection;
pub mod token;

pub use connection::{Connection, StaticConnection};
pub use token::{AuthError, AuthToken};

// Re-export useful types
pub use async_trait::async_trait;
