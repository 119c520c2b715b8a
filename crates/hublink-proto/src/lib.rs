//! Hub Protocol Definitions
//!
//! Message shapes exchanged with the remote control hub: the outbound request
//! envelope, inbound reply decoding, and the event names the connection core
//! reacts to itself.

pub mod envelope;
pub mod events;

pub use envelope::{reply_value, CallIdentifier, Envelope, ProtoError};
pub use events::{ControllerStatus, NOTIFY_APP_CONNECTION_EVENT};

/// Path of the mobile app hub, relative to the service base URL
pub const DEFAULT_HUB_PATH: &str = "/MobileAppHub";
