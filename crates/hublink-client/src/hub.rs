//! Connection supervisor
//!
//! [`ConnectionHub`] keeps one authenticated channel to the hub alive. It runs a
//! retry loop that refreshes credentials, runs the channel until it drops, and
//! waits a jittered, exponentially growing delay before trying again. While a
//! connection is open a watchdog recycles it every
//! [`HubConfig::forced_reconnect_interval`].
//!
//! `start`, `stop` and `send` are plain functions that schedule work on the
//! runtime captured at construction, so they can be called from threads that
//! are not running async code.

use futures::FutureExt;
use hublink_auth::{AuthError, Connection};
use hublink_proto::{ControllerStatus, Envelope, NOTIFY_APP_CONNECTION_EVENT};
use hublink_transport::{ChannelState, EventHandler, HubChannel, TransportError};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::backoff::RetryBackoff;
use crate::config::{ConfigError, HubConfig};
use crate::listeners::{ConnectivityListener, ListenerId, ListenerSet};
use crate::reconnect::ReconnectJob;

/// Hub errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Listeners cannot be changed while the hub is running")]
    Running,

    #[error("Unknown listener: {0}")]
    UnknownListener(ListenerId),

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Why a single connection attempt ended
#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl AttemptError {
    fn kind(&self) -> &'static str {
        match self {
            AttemptError::Auth(_) => "AuthError",
            AttemptError::Transport(_) => "TransportError",
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    /// Cancelled by `stop`; one token per `start`
    shutdown: Option<CancellationToken>,
    /// Retry loop of the latest `start`
    watcher: Option<JoinHandle<()>>,
    /// Cancelled once the teardown of the latest `stop` has finished
    teardown: Option<CancellationToken>,
}

struct HubInner {
    connection: Arc<dyn Connection>,
    channel: Arc<dyn HubChannel>,
    config: HubConfig,
    runtime: Handle,
    span: Span,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    backoff: Mutex<RetryBackoff>,
    reconnect: ReconnectJob,
    listeners: ListenerSet,
}

/// Supervisor for the hub connection of one device
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("serial_number", &self.inner.connection.serial_number())
            .field("running", &self.running())
            .field("connected", &self.connected())
            .finish()
    }
}

impl ConnectionHub {
    /// Create a stopped hub driving `channel`
    ///
    /// Fails if `config` would disable the backoff or the watchdog interval.
    pub fn new(
        runtime: Handle,
        connection: Arc<dyn Connection>,
        channel: Arc<dyn HubChannel>,
        config: HubConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let span = info_span!("hub", serial = %connection.serial_number());
        let inner = Arc::new(HubInner {
            backoff: Mutex::new(RetryBackoff::new(config.max_delay)),
            reconnect: ReconnectJob::new(config.forced_reconnect_interval),
            connection,
            channel,
            config,
            runtime,
            span,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
            listeners: ListenerSet::new(),
        });
        HubInner::register_callbacks(&inner);

        Ok(Self { inner })
    }

    /// Create a hub whose channel is built for the configured hub endpoint
    pub fn with_channel<F>(
        runtime: Handle,
        connection: Arc<dyn Connection>,
        config: HubConfig,
        make_channel: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnOnce(String) -> Arc<dyn HubChannel>,
    {
        config.validate()?;
        let channel = make_channel(config.endpoint(connection.url()));
        Self::new(runtime, connection, channel, config)
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether the channel transport is currently connected
    pub fn connected(&self) -> bool {
        self.inner.channel.state() == ChannelState::Connected
    }

    /// Start the retry loop. No-op if already running.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let shutdown = CancellationToken::new();
        lifecycle.shutdown = Some(shutdown.clone());
        let previous = lifecycle.watcher.take();
        let teardown = lifecycle.teardown.take();

        let inner = self.inner.clone();
        let watcher = self.inner.runtime.spawn(
            async move {
                // The loop and teardown of an earlier start may still be winding down
                if let Some(teardown) = teardown {
                    teardown.cancelled().await;
                }
                if let Some(previous) = previous {
                    let _ = previous.await;
                }
                inner.connection_watcher(shutdown).await;
            }
            .instrument(self.inner.span.clone()),
        );
        lifecycle.watcher = Some(watcher);
    }

    /// Stop retrying and tear the connection down. No-op if not running.
    ///
    /// The returned task completes once the forced-reconnect watchdog has been
    /// cancelled and the transport closed; dropping it does not abort teardown.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return None;
        }
        if let Some(shutdown) = lifecycle.shutdown.take() {
            shutdown.cancel();
        }
        let done = CancellationToken::new();
        lifecycle.teardown = Some(done.clone());
        drop(lifecycle);

        let inner = self.inner.clone();
        Some(self.inner.runtime.spawn(
            async move {
                let _done = done.drop_guard();
                inner.close_connection().await;
            }
            .instrument(self.inner.span.clone()),
        ))
    }

    /// Register a handler for a named inbound hub event
    pub fn on(&self, event: &str, handler: EventHandler) {
        self.inner.channel.on(event, handler);
    }

    /// Fire-and-forget invocation of a hub method.
    ///
    /// Returns the request nonce carried in the envelope so the caller can
    /// match a reply. Delivery is best effort: send failures are logged and
    /// dropped.
    pub fn send(&self, event: &str, value: Option<Value>) -> Uuid {
        let envelope = Envelope::new(value);
        let nonce = envelope.nonce();
        debug!(parent: &self.inner.span, event, payload = ?envelope, "Sending data");

        let arguments = match envelope.into_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(parent: &self.inner.span, "Failed to encode {} payload: {}", event, e);
                return nonce;
            }
        };

        let channel = self.inner.channel.clone();
        let event = event.to_string();
        self.inner.runtime.spawn(
            async move {
                if let Err(e) = channel.send(&event, arguments).await {
                    debug!("Dropped {} message: {}", event, e);
                }
            }
            .instrument(self.inner.span.clone()),
        );
        nonce
    }

    /// Serialize `value` and send it as the envelope payload
    pub fn send_value<T: Serialize>(&self, event: &str, value: &T) -> Result<Uuid, HubError> {
        let value = serde_json::to_value(value)?;
        Ok(self.send(event, Some(value)))
    }

    /// Register a connectivity listener. Only allowed while stopped.
    pub fn add_listener(
        &self,
        listener: Arc<dyn ConnectivityListener>,
    ) -> Result<ListenerId, HubError> {
        if self.running() {
            return Err(HubError::Running);
        }
        Ok(self.inner.listeners.insert(listener))
    }

    /// Remove a connectivity listener. Only allowed while stopped.
    pub fn remove_listener(&self, id: ListenerId) -> Result<(), HubError> {
        if self.running() {
            return Err(HubError::Running);
        }
        if !self.inner.listeners.remove(id) {
            return Err(HubError::UnknownListener(id));
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Whether a forced reconnect is currently scheduled
    pub async fn forced_reconnect_pending(&self) -> bool {
        self.inner.reconnect.is_active().await
    }
}

impl HubInner {
    fn register_callbacks(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        let span = inner.span.clone();
        inner.channel.on_open(Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_open().await;
                }
            }
            .instrument(span.clone())
            .boxed()
        }));

        let weak = Arc::downgrade(inner);
        let span = inner.span.clone();
        inner.channel.on_close(Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_close().await;
                }
            }
            .instrument(span.clone())
            .boxed()
        }));

        let span = inner.span.clone();
        inner.channel.on_error(Arc::new(move |message: String| {
            let _entered = span.enter();
            error!("Connection error occurred: {}", message);
            futures::future::ready(()).boxed()
        }));

        let weak = Arc::downgrade(inner);
        let span = inner.span.clone();
        inner.channel.on(
            NOTIFY_APP_CONNECTION_EVENT,
            Arc::new(move |args: Vec<Value>| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_connectivity(&args).await;
                    }
                }
                .instrument(span.clone())
                .boxed()
            }),
        );
    }

    async fn connection_watcher(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Connection watcher started");

        while !shutdown.is_cancelled() {
            if let Err(e) = self.attempt(&shutdown).await {
                warn!("Error during connection: {}: {}", e.kind(), e);
            }

            // Random backoff to avoid simultaneous connection attempts
            let delay = self.backoff.lock().unwrap().jittered();
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnecting");
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }

            self.backoff.lock().unwrap().advance();
        }

        info!("Connection watcher stopped");
    }

    /// One refresh-and-run cycle
    async fn attempt(&self, shutdown: &CancellationToken) -> Result<(), AttemptError> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            refreshed = self.refresh_token() => refreshed?,
        }

        let mut run = self.channel.run();
        let result = tokio::select! {
            biased;
            result = &mut run => result,
            _ = shutdown.cancelled() => {
                // Keep driving the run so its close callbacks still fire
                self.close_transport().await;
                run.await
            }
        };
        Ok(result?)
    }

    async fn refresh_token(&self) -> Result<(), AuthError> {
        self.connection.refresh_token().await?;
        self.channel.set_header(
            "Authorization",
            format!("Bearer {}", self.connection.get_token()),
        );
        info!("Auth token refreshed");
        Ok(())
    }

    async fn handle_open(&self) {
        self.backoff.lock().unwrap().reset();
        info!("Connection to server established");

        if !self.running.load(Ordering::SeqCst) {
            debug!("Hub stopped during handshake, closing");
            self.close_transport().await;
            return;
        }

        let channel = self.channel.clone();
        let scheduled = self
            .reconnect
            .start_if(
                || self.running.load(Ordering::SeqCst),
                move || async move {
                    info!("Forcing reconnect to keep the connection healthy");
                    if let Err(e) = channel.close().await {
                        warn!("Forced close failed: {}", e);
                    }
                },
            )
            .await;
        if scheduled {
            debug!(
                interval_secs = self.reconnect.interval().as_secs_f64(),
                "Forced reconnect scheduled"
            );
        }
    }

    async fn handle_close(&self) {
        info!("Connection to server closed");
        self.reconnect.cancel().await;
    }

    async fn handle_connectivity(&self, args: &[Value]) {
        let status = ControllerStatus::from_args(args);
        debug!(?status, "Controller connectivity changed");

        for (id, e) in self.listeners.notify(status.is_connected()).await {
            warn!("Connectivity {} failed: {}", id, e);
        }
    }

    async fn close_connection(&self) {
        self.reconnect.cancel().await;
        self.close_transport().await;
    }

    async fn close_transport(&self) {
        if let Err(e) = self.channel.close().await {
            debug!("Closing transport failed: {}", e);
        }
    }
}
