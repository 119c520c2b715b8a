//! Hub client library - connection supervision for a single device
//!
//! ```ignore
//! use hublink_auth::StaticConnection;
//! use hublink_client::{ConnectionHub, HubConfig};
//! use std::sync::Arc;
//!
//! let connection = Arc::new(StaticConnection::from_base64(url, &token_b64)?);
//! let hub = ConnectionHub::with_channel(
//!     tokio::runtime::Handle::current(),
//!     connection,
//!     HubConfig::default(),
//!     |endpoint| Arc::new(MySignalRChannel::new(endpoint)),
//! )?;
//!
//! hub.start();
//! hub.send("GetVersion", None);
//! // ...
//! if let Some(teardown) = hub.stop() {
//!     teardown.await?;
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod hub;
pub mod listeners;
pub mod reconnect;

pub use backoff::RetryBackoff;
pub use config::{ConfigError, HubConfig, HubConfigBuilder};
pub use hub::{ConnectionHub, HubError};
pub use listeners::{ConnectivityListener, ListenerError, ListenerId, ListenerSet};
pub use reconnect::ReconnectJob;

pub use hublink_proto::{reply_value, Envelope};
pub use hublink_transport::{ChannelState, EventHandler, HubChannel};
