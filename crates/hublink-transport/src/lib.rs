//! Channel abstraction for the hub connection
//!
//! The connection core never speaks the wire protocol itself. It drives any
//! [`HubChannel`]: a persistent, bidirectional, event-oriented connection with
//! lifecycle callbacks and mutable outgoing headers.

pub mod memory;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryChannel;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Live state of the underlying transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Callback fired when the channel opens or closes
pub type LifecycleCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback fired with a server-reported error message
pub type ErrorCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handler for a named inbound event; receives the invocation arguments
pub type EventHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Persistent message channel to the hub
///
/// Callbacks are invoked from the task driving [`HubChannel::run`], never from
/// inside [`HubChannel::close`]. `on_close` fires once for every `run` that
/// reached [`ChannelState::Connected`].
#[async_trait]
pub trait HubChannel: Send + Sync {
    fn on_open(&self, callback: LifecycleCallback);

    fn on_close(&self, callback: LifecycleCallback);

    fn on_error(&self, callback: ErrorCallback);

    /// Register a handler for a named inbound event
    fn on(&self, event: &str, handler: EventHandler);

    /// Invoke a hub method with the given arguments
    async fn send(&self, event: &str, arguments: Vec<Value>) -> TransportResult<()>;

    /// Connect and process messages until the connection closes or fails
    async fn run(&self) -> TransportResult<()>;

    /// Close the transport; a pending `run` returns afterwards
    async fn close(&self) -> TransportResult<()>;

    fn state(&self) -> ChannelState;

    /// Set a header sent with the next connection handshake
    fn set_header(&self, name: &str, value: String);

    fn header(&self, name: &str) -> Option<String>;
}
