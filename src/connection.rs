//! `MasterClientConnection`: the request/ack transport wrapper of spec's
//! §4.6 — one connection, many concurrent in-flight requests, each
//! correlated by a short token and guarded by a timeout.

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::events::TopicBus;
use crate::observable::Unsubscribe;
use crate::transport::{AckEnvelope, Transport};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Wraps one [`Transport`] with request/ack correlation and broadcast
/// fan-out. Shared across every [`crate::master_connection::MasterResourceConnection`]
/// built on top of it.
pub struct MasterClientConnection {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    next_token: AtomicU64,
    broadcast_bus: Arc<TopicBus<Value>>,
    wired_broadcasts: Mutex<HashSet<String>>,
}

impl MasterClientConnection {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            next_token: AtomicU64::new(0),
            broadcast_bus: TopicBus::new(),
            wired_broadcasts: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the underlying channel and publish `_socketConnect`.
    pub async fn connect(&self) -> Result<(), SyncError> {
        self.transport.connect().await?;
        log::info!("connected to {}", self.config.url);
        self.broadcast_bus.publish("_socketConnect", &Value::Null);
        Ok(())
    }

    /// Close the underlying channel and publish `_socketDisconnect`.
    /// In-flight requests are not cancelled; they will simply time out.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.transport.disconnect().await?;
        log::info!("disconnected from {}", self.config.url);
        self.broadcast_bus.publish("_socketDisconnect", &Value::Null);
        Ok(())
    }

    fn next_correlation_token(&self, op: &str) -> String {
        let n = self.next_token.fetch_add(1, Ordering::Relaxed);
        format!("{op}:{n:05}")
    }

    /// Issue a request and await its ack-or-timeout. Never panics and
    /// never resolves to anything but a tagged `Result`: a remote
    /// `{ok: false, val}` becomes `Err(SyncError::Remote(..))`, a missed
    /// deadline becomes `Err(SyncError::RequestTimeout)`.
    pub async fn request(&self, op: &str, payload: Value) -> Result<Value, SyncError> {
        let token = self.next_correlation_token(op);
        log::info!("request {token} -> {op} {payload}");

        let (tx, rx) = oneshot::channel::<AckEnvelope>();
        self.transport.emit(
            op,
            payload,
            Some(Box::new(move |envelope| {
                // A `send` after the receiver was dropped (timeout already
                // fired) is a no-op `Err`; this *is* the called-once guard,
                // not an additional flag to maintain.
                let _ = tx.send(envelope);
            })),
        );

        let timeout = Duration::from_millis(self.config.wait_for_response_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) if envelope.ok => {
                log::info!("request {token} resolved: {:?}", envelope.val);
                Ok(envelope.val)
            }
            Ok(Ok(envelope)) => {
                log::warn!("request {token} remote error: {:?}", envelope.val);
                Err(SyncError::Remote(envelope.val.to_string()))
            }
            Ok(Err(_canceled)) => {
                log::warn!("request {token} ack sender dropped without responding");
                Err(SyncError::Transport("connection closed before acknowledgement".into()))
            }
            Err(_elapsed) => {
                log::warn!("request {token} timed out after {}ms", self.config.wait_for_response_ms);
                Err(SyncError::RequestTimeout)
            }
        }
    }

    /// Subscribe to a server-pushed broadcast topic. The underlying
    /// transport event is wired exactly once per `event` name, no matter
    /// how many local subscribers accumulate; each ack-envelope received
    /// is unwrapped (`{ok, val}`) before fan-out, and errored broadcasts
    /// are dropped silently — there is no awaiter correlated to a
    /// broadcast.
    pub fn on_broadcast(self: &Arc<Self>, event: &str, handler: impl Fn(Value) + Send + Sync + 'static) -> Unsubscribe {
        self.ensure_broadcast_wired(event);
        self.broadcast_bus.subscribe(event, move |value: &Value| handler(value.clone()))
    }

    fn ensure_broadcast_wired(self: &Arc<Self>, event: &str) {
        let mut wired = self.wired_broadcasts.lock().expect("wired_broadcasts lock poisoned");
        if !wired.insert(event.to_string()) {
            return;
        }
        let bus = self.broadcast_bus.clone();
        let event_owned = event.to_string();
        // Transport subscriptions wired here live for the connection's
        // whole lifetime; they are not unsubscribed by any individual
        // `MasterResourceConnection::destroy`, which only tears down its
        // own topic-bus registrations (see master_connection.rs).
        self.transport.on(
            event,
            Box::new(move |payload: Value| match payload.get("ok").and_then(Value::as_bool) {
                Some(true) => {
                    let val = payload.get("val").cloned().unwrap_or(Value::Null);
                    bus.publish(&event_owned, &val);
                }
                Some(false) => {
                    log::warn!("dropping errored broadcast on {event_owned}: {payload}");
                }
                None => bus.publish(&event_owned, &payload),
            }),
        );
    }
}
