//! Hublink - Public API for applications talking to a device control hub
//!
//! This library re-exports the hublink crates, providing a single entry point
//! for feature code that needs a supervised, authenticated hub connection.
//!
//! # Quick Start
//!
//! ```ignore
//! use hublink_lib::{ConnectionHub, HubConfig, StaticConnection};
//! use std::sync::Arc;
//!
//! let connection = Arc::new(StaticConnection::from_base64(
//!     "https://hub.example.com",
//!     &std::env::var("HUB_TOKEN_B64")?,
//! )?);
//!
//! let hub = ConnectionHub::with_channel(
//!     tokio::runtime::Handle::current(),
//!     connection,
//!     HubConfig::default(),
//!     |endpoint| Arc::new(MyChannel::connect_to(endpoint)),
//! )?;
//!
//! hub.on("GetVersionCallback", handler);
//! hub.start();
//! hub.send("GetVersion", None);
//! ```
//!
//! # Crates
//!
//! - [`proto`]: envelope and reply shapes
//! - [`transport`]: the [`HubChannel`] abstraction and an in-memory channel
//! - [`auth`]: connection descriptors and device tokens
//! - [`client`]: the [`ConnectionHub`] supervisor

pub use hublink_auth as auth;
pub use hublink_client as client;
pub use hublink_proto as proto;
pub use hublink_transport as transport;

pub use hublink_auth::{AuthError, AuthToken, Connection, StaticConnection};
pub use hublink_client::{
    ConfigError, ConnectionHub, ConnectivityListener, HubConfig, HubError, ListenerError,
    ListenerId,
};
pub use hublink_proto::{reply_value, ControllerStatus, Envelope, ProtoError};
pub use hublink_transport::{
    ChannelState, EventHandler, HubChannel, MemoryChannel, TransportError,
};
