//! Hub events consumed by the connection core

use serde_json::Value;

/// Inbound event reporting whether the device controller is reachable by the hub
pub const NOTIFY_APP_CONNECTION_EVENT: &str = "SetNotifyAppConnectionCallback";

/// Status string the hub sends when the controller is online
const CONTROLLER_CONNECTED: &str = "ControllerConnected";

/// Controller connectivity as reported by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    Connected,
    Disconnected,
}

impl ControllerStatus {
    /// Interpret the arguments of a [`NOTIFY_APP_CONNECTION_EVENT`] invocation.
    ///
    /// Anything other than the exact `"ControllerConnected"` string, including a
    /// missing argument, counts as disconnected.
    pub fn from_args(args: &[Value]) -> Self {
        match args.first().and_then(Value::as_str) {
            Some(CONTROLLER_CONNECTED) => ControllerStatus::Connected,
            _ => ControllerStatus::Disconnected,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ControllerStatus::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_controller_status_from_args() {
        assert_eq!(
            ControllerStatus::from_args(&[json!("ControllerConnected")]),
            ControllerStatus::Connected
        );
        assert_eq!(
            ControllerStatus::from_args(&[json!("ControllerDisconnected")]),
            ControllerStatus::Disconnected
        );
        assert_eq!(
            ControllerStatus::from_args(&[]),
            ControllerStatus::Disconnected
        );
        assert_eq!(
            ControllerStatus::from_args(&[json!(1)]),
            ControllerStatus::Disconnected
        );
    }
}
