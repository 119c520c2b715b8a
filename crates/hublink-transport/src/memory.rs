//! In-process hub channel
//!
//! [`MemoryChannel`] behaves like a hub connection without a network: each
//! `run` consumes the next scripted [`Attempt`], and the "server side" is driven
//! through [`MemoryChannel::inject`], [`MemoryChannel::drop_connection`] and
//! friends. It records every attempt, close and send for inspection, which is
//! what feature code and the connection core are tested against.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    ChannelState, ErrorCallback, EventHandler, HubChannel, LifecycleCallback, TransportError,
    TransportResult,
};

/// Scripted outcome of one `run` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Handshake succeeds; the session stays open until closed
    Open,
    /// Handshake fails with the given reason
    Fail(String),
}

/// What the channel observed when a `run` started
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub at: Instant,
    pub authorization: Option<String>,
}

/// A message the client sent through the channel
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub event: String,
    pub arguments: Vec<Value>,
}

struct Session {
    token: CancellationToken,
    error: Option<String>,
}

pub struct MemoryChannel {
    url: String,
    state: RwLock<ChannelState>,
    headers: RwLock<HashMap<String, String>>,
    open_callbacks: RwLock<Vec<LifecycleCallback>>,
    close_callbacks: RwLock<Vec<LifecycleCallback>>,
    error_callbacks: RwLock<Vec<ErrorCallback>>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    script: Mutex<VecDeque<Attempt>>,
    session: Mutex<Option<Session>>,
    attempts: Mutex<Vec<AttemptRecord>>,
    sent: Mutex<Vec<SentMessage>>,
    close_calls: AtomicUsize,
    opened: AtomicBool,
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

impl MemoryChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: RwLock::new(ChannelState::Disconnected),
            headers: RwLock::new(HashMap::new()),
            open_callbacks: RwLock::new(Vec::new()),
            close_callbacks: RwLock::new(Vec::new()),
            error_callbacks: RwLock::new(Vec::new()),
            handlers: RwLock::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            session: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            opened: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue outcomes for upcoming `run` calls. Once the script is exhausted
    /// every attempt opens.
    pub fn script<I>(&self, attempts: I)
    where
        I: IntoIterator<Item = Attempt>,
    {
        self.script.lock().unwrap().extend(attempts);
    }

    /// Queue `count` failing handshakes
    pub fn fail_next(&self, count: usize) {
        self.script(
            (0..count).map(|n| Attempt::Fail(format!("scripted handshake failure #{}", n + 1))),
        );
    }

    /// Simulate a server invocation of `event`
    pub async fn inject(&self, event: &str, arguments: Vec<Value>) {
        let handlers = self
            .handlers
            .read()
            .unwrap()
            .get(event)
            .cloned()
            .unwrap_or_default();

        trace!("Injecting {} into {} handler(s)", event, handlers.len());
        for handler in handlers {
            handler(arguments.clone()).await;
        }
    }

    /// Simulate a server-reported error message
    pub async fn inject_error(&self, message: &str) {
        let callbacks = self.error_callbacks.read().unwrap().clone();
        for callback in callbacks {
            callback(message.to_string()).await;
        }
    }

    /// End the current session from the server side; `run` returns `Ok`
    pub fn drop_connection(&self) -> bool {
        self.end_session(None)
    }

    /// End the current session with a transport failure; `run` returns `Err`
    pub fn fail_connection(&self, reason: impl Into<String>) -> bool {
        self.end_session(Some(reason.into()))
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of client-initiated `close` calls
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn end_session(&self, error: Option<String>) -> bool {
        let mut session = self.session.lock().unwrap();
        match session.as_mut() {
            Some(active) if !active.token.is_cancelled() => {
                active.error = error;
                active.token.cancel();
                true
            }
            _ => false,
        }
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write().unwrap() = state;
    }

    async fn fire(&self, callbacks: &RwLock<Vec<LifecycleCallback>>) {
        let callbacks = callbacks.read().unwrap().clone();
        for callback in callbacks {
            callback().await;
        }
    }
}

#[async_trait]
impl HubChannel for MemoryChannel {
    fn on_open(&self, callback: LifecycleCallback) {
        self.open_callbacks.write().unwrap().push(callback);
    }

    fn on_close(&self, callback: LifecycleCallback) {
        self.close_callbacks.write().unwrap().push(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_callbacks.write().unwrap().push(callback);
    }

    fn on(&self, event: &str, handler: EventHandler) {
        self.handlers
            .write()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    async fn send(&self, event: &str, arguments: Vec<Value>) -> TransportResult<()> {
        if self.state() != ChannelState::Connected {
            if self.opened.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed);
            }
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().unwrap().push(SentMessage {
            event: event.to_string(),
            arguments,
        });
        Ok(())
    }

    async fn run(&self) -> TransportResult<()> {
        self.attempts.lock().unwrap().push(AttemptRecord {
            at: Instant::now(),
            authorization: self.header("Authorization"),
        });
        self.set_state(ChannelState::Connecting);

        let attempt = self.script.lock().unwrap().pop_front();
        if let Some(Attempt::Fail(reason)) = attempt {
            debug!("Handshake with {} failed: {}", self.url, reason);
            self.set_state(ChannelState::Disconnected);
            return Err(TransportError::Handshake(reason));
        }

        let token = CancellationToken::new();
        *self.session.lock().unwrap() = Some(Session {
            token: token.clone(),
            error: None,
        });
        self.set_state(ChannelState::Connected);
        self.opened.store(true, Ordering::SeqCst);
        self.fire(&self.open_callbacks).await;

        token.cancelled().await;

        let error = self
            .session
            .lock()
            .unwrap()
            .take()
            .and_then(|session| session.error);
        self.set_state(ChannelState::Disconnected);
        self.fire(&self.close_callbacks).await;

        match error {
            Some(reason) => Err(TransportError::Protocol(reason)),
            None => Ok(()),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.end_session(None);
        Ok(())
    }

    fn state(&self) -> ChannelState {
        *self.state.read().unwrap()
    }

    fn set_header(&self, name: &str, value: String) {
        self.headers.write().unwrap().insert(name.to_string(), value);
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers.read().unwrap().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scripted_failure_then_open() {
        let channel = Arc::new(MemoryChannel::new("memory://hub"));
        channel.fail_next(1);

        let result = channel.run().await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
        assert_eq!(channel.state(), ChannelState::Disconnected);

        let runner = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.run().await })
        };
        while channel.state() != ChannelState::Connected {
            tokio::task::yield_now().await;
        }

        channel.close().await.unwrap();
        assert!(runner.await.unwrap().is_ok());
        assert_eq!(channel.attempt_count(), 2);
        assert_eq!(channel.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_fire_from_run() {
        let channel = Arc::new(MemoryChannel::new("memory://hub"));
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let counter = opened.clone();
        channel.on_open(Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));
        let counter = closed.clone();
        channel.on_close(Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));

        let runner = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.run().await })
        };
        while opened.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(channel.fail_connection("reset by peer"));
        let result = runner.await.unwrap();
        assert!(matches!(result, Err(TransportError::Protocol(_))));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!channel.drop_connection());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let channel = MemoryChannel::new("memory://hub");
        let result = channel.send("GetVersion", vec![json!({})]).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_after_session_ends_reports_closed() {
        let channel = Arc::new(MemoryChannel::new("memory://hub"));
        let runner = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.run().await })
        };
        while channel.state() != ChannelState::Connected {
            tokio::task::yield_now().await;
        }
        channel.send("GetVersion", vec![json!({})]).await.unwrap();

        assert!(channel.drop_connection());
        runner.await.unwrap().unwrap();

        let result = channel.send("GetVersion", vec![json!({})]).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_inject_reaches_handlers() {
        let channel = MemoryChannel::new("memory://hub");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        channel.on(
            "GetVersionCallback",
            Arc::new(move |args: Vec<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(args);
                }
                .boxed()
            }),
        );

        channel
            .inject("GetVersionCallback", vec![json!({"value": "1.2.0"})])
            .await;
        channel.inject("Unrelated", vec![]).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0]["value"], "1.2.0");
    }

    #[tokio::test]
    async fn test_attempt_records_authorization_header() {
        let channel = MemoryChannel::new("memory://hub");
        channel.fail_next(1);
        channel.set_header("Authorization", "Bearer abc".to_string());

        let _ = channel.run().await;

        let attempts = channel.attempts();
        assert_eq!(attempts[0].authorization.as_deref(), Some("Bearer abc"));
    }
}
