/// Acceptance test for the public API
///
/// Plays the role of feature code: a device property that pulls its value
/// with a request and caches whatever the reply callback delivers, on top of
/// a hub built from a base64 device token.
use futures::FutureExt;
use hublink_lib::{
    reply_value, AuthToken, ConnectionHub, HubChannel, HubConfig, MemoryChannel, StaticConnection,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration};

/// Minimal read-only property, the way feature code sits on the hub
struct VersionProperty {
    hub: ConnectionHub,
    value: Arc<Mutex<Option<String>>>,
}

impl VersionProperty {
    fn register(hub: &ConnectionHub) -> Self {
        let value = Arc::new(Mutex::new(None));
        let slot = value.clone();
        hub.on(
            "GetVersionCallback",
            Arc::new(move |args: Vec<Value>| {
                let slot = slot.clone();
                async move {
                    if let Ok(version) = reply_value::<String>(&args) {
                        *slot.lock().unwrap() = Some(version);
                    }
                }
                .boxed()
            }),
        );
        Self {
            hub: hub.clone(),
            value,
        }
    }

    fn pull(&self) {
        self.hub.send("GetVersion", None);
    }

    fn get(&self) -> Option<String> {
        self.value.lock().unwrap().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_feature_round_trip_over_supervised_hub() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();

    let token = AuthToken {
        serial_number: "FW-0042".to_string(),
        token: "secret".to_string(),
        app_identifier: Some("acceptance".to_string()),
    }
    .to_base64()
    .unwrap();
    let connection =
        Arc::new(StaticConnection::from_base64("https://hub.example.com", &token).unwrap());

    let channel = Arc::new(MemoryChannel::new("unused"));
    let for_hub: Arc<dyn HubChannel> = channel.clone();
    let hub = ConnectionHub::with_channel(
        Handle::current(),
        connection,
        HubConfig::default(),
        move |_endpoint| for_hub,
    )
    .unwrap();
    let version = VersionProperty::register(&hub);

    hub.start();
    while !hub.connected() {
        sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(
        channel.attempts()[0].authorization.as_deref(),
        Some("Bearer secret")
    );

    version.pull();
    while channel.sent().is_empty() {
        sleep(Duration::from_millis(1)).await;
    }
    let request = channel.sent()[0].clone();
    assert_eq!(request.event, "GetVersion");

    // The hub answers on the callback event
    channel
        .inject("GetVersionCallback", vec![json!({"value": "3.1.0"})])
        .await;
    assert_eq!(version.get().as_deref(), Some("3.1.0"));

    hub.stop().unwrap().await.unwrap();
    assert!(!hub.running());
}
