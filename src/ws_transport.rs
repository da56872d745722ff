//! `TungsteniteTransport`: a concrete [`Transport`] over a websocket,
//! shaped after the teacher's `websocket.rs` connect/split/message-loop
//! structure, but carrying a small JSON envelope instead of a protobuf
//! frame, since this crate has no wire schema of its own to compile.
//!
//! Wire envelopes:
//! - outgoing request:  `{"kind":"request","event","correlation","payload"}`
//! - incoming ack:       `{"kind":"ack","correlation","payload":{"ok","val"}}`
//! - incoming broadcast: `{"kind":"broadcast","event","payload"}`

use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::observable::Unsubscribe;
use crate::transport::{AckCallback, AckEnvelope, BroadcastHandler, Transport};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use futures_channel::mpsc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

struct BroadcastEntry {
    id: usize,
    handler: BroadcastHandler,
}

#[derive(Default)]
struct State {
    outgoing: Option<mpsc::UnboundedSender<WsMessage>>,
    loop_handle: Option<JoinHandle<()>>,
}

struct Inner {
    url: String,
    state: Mutex<State>,
    pending_acks: Mutex<HashMap<u64, AckCallback>>,
    broadcast_handlers: Mutex<HashMap<String, Vec<BroadcastEntry>>>,
    next_correlation: AtomicU64,
    next_handler_id: AtomicUsize,
}

impl Inner {
    fn maybe_log_error<T, U: std::fmt::Debug>(cause: &str, res: std::result::Result<T, U>) {
        if let Err(e) = res {
            log::warn!("{cause}: {e:?}");
        }
    }

    async fn message_loop(
        self: Arc<Self>,
        mut read: futures::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        >,
        mut write: futures::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            WsMessage,
        >,
        mut outgoing_recv: mpsc::UnboundedReceiver<WsMessage>,
    ) {
        loop {
            tokio::select! {
                incoming = read.next() => match incoming {
                    None => {
                        log::info!("websocket stream to {} closed", self.url);
                        break;
                    }
                    Some(Err(e)) => Self::maybe_log_error::<(), _>("error reading from websocket", Err(e)),
                    Some(Ok(WsMessage::Text(text))) => self.handle_incoming(&text),
                    Some(Ok(WsMessage::Ping(payload))) => {
                        Self::maybe_log_error("error sending pong", write.send(WsMessage::Pong(payload)).await)
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        log::info!("master closed websocket to {}", self.url);
                        break;
                    }
                    Some(Ok(other)) => log::warn!("unexpected websocket message: {other:?}"),
                },
                outgoing = outgoing_recv.next() => match outgoing {
                    None => break,
                    Some(msg) => Self::maybe_log_error("error writing to websocket", write.send(msg).await),
                },
            }
        }
    }

    fn handle_incoming(&self, text: &str) {
        let envelope: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("dropping unparseable websocket message: {e}");
                return;
            }
        };
        match envelope.get("kind").and_then(Value::as_str) {
            Some("ack") => self.handle_ack(&envelope),
            Some("broadcast") => self.handle_broadcast(&envelope),
            other => log::warn!("dropping websocket message with unknown kind {other:?}"),
        }
    }

    fn handle_ack(&self, envelope: &Value) {
        let Some(correlation) = envelope.get("correlation").and_then(Value::as_u64) else {
            log::warn!("dropping ack without a correlation id");
            return;
        };
        let Some(callback) = self.pending_acks.lock().expect("pending_acks lock poisoned").remove(&correlation) else {
            log::warn!("dropping ack for unknown or already-resolved correlation {correlation}");
            return;
        };
        let payload = envelope.get("payload").cloned().unwrap_or(Value::Null);
        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let val = payload.get("val").cloned().unwrap_or(Value::Null);
        callback(AckEnvelope { ok, val });
    }

    fn handle_broadcast(&self, envelope: &Value) {
        let Some(event) = envelope.get("event").and_then(Value::as_str) else {
            log::warn!("dropping broadcast without an event name");
            return;
        };
        let payload = envelope.get("payload").cloned().unwrap_or(Value::Null);
        if let Some(entries) = self.broadcast_handlers.lock().expect("broadcast_handlers lock poisoned").get(event) {
            for entry in entries {
                (entry.handler)(payload.clone());
            }
        }
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) {
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        if let Some(ack) = ack {
            self.pending_acks.lock().expect("pending_acks lock poisoned").insert(correlation, ack);
        }
        let envelope = json!({"kind": "request", "event": event, "correlation": correlation, "payload": payload});
        let sender = self.state.lock().expect("state lock poisoned").outgoing.clone();
        match sender {
            Some(sender) => {
                if sender.unbounded_send(WsMessage::Text(envelope.to_string().into())).is_err() {
                    log::warn!("dropping emit({event}): outgoing channel closed");
                }
            }
            None => log::warn!("dropping emit({event}): not connected"),
        }
    }
}

/// A websocket-backed [`Transport`]. Cheap to clone (an `Arc` around its
/// state), so the background message loop can hold its own handle
/// independent of the caller's.
pub struct TungsteniteTransport {
    inner: Arc<Inner>,
}

/// Append `apiKey` as a connection-level query parameter, per spec.md §6.
/// `user_id` has no transmission point here: this crate doesn't implement
/// the `createClient`/`getClient`/`removeClient` client-session trio the
/// catalog would otherwise carry it on (see `DESIGN.md`).
fn connect_url(config: &ClientConfig) -> String {
    let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return config.url.clone();
    };
    let separator = if config.url.contains('?') { '&' } else { '?' };
    format!("{}{separator}apiKey={}", config.url, percent_encode_query_value(api_key))
}

/// Minimal query-value escaping: percent-encode the handful of characters
/// that would otherwise break the query string, not full RFC 3986.
fn percent_encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' | '=' | '#' | '%' | '+' | ' ' | '\n' | '\r' => out.push_str(&format!("%{:02X}", ch as u32)),
            _ => out.push(ch),
        }
    }
    out
}

impl TungsteniteTransport {
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Inner {
                url: connect_url(config),
                state: Mutex::new(State::default()),
                pending_acks: Mutex::new(HashMap::new()),
                broadcast_handlers: Mutex::new(HashMap::new()),
                next_correlation: AtomicU64::new(0),
                next_handler_id: AtomicUsize::new(0),
            }),
        })
    }
}

impl Transport for TungsteniteTransport {
    fn connect(&self) -> BoxFuture<'_, Result<(), SyncError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(&inner.url)
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;
            let (write, read) = stream.split();
            let (outgoing_send, outgoing_recv) = mpsc::unbounded();

            let loop_inner = inner.clone();
            let handle = tokio::spawn(async move { loop_inner.message_loop(read, write, outgoing_recv).await });

            let mut state = inner.state.lock().expect("state lock poisoned");
            state.outgoing = Some(outgoing_send);
            state.loop_handle = Some(handle);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), SyncError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.state.lock().expect("state lock poisoned");
            state.outgoing = None;
            if let Some(handle) = state.loop_handle.take() {
                handle.abort();
            }
            Ok(())
        })
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) {
        self.inner.emit(event, payload, ack)
    }

    fn on(&self, event: &str, handler: BroadcastHandler) -> Unsubscribe {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .broadcast_handlers
            .lock()
            .expect("broadcast_handlers lock poisoned")
            .entry(event.to_string())
            .or_default()
            .push(BroadcastEntry { id, handler });

        let weak = Arc::downgrade(&self.inner);
        let event_owned = event.to_string();
        Unsubscribe::new_pub(move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(entries) = inner.broadcast_handlers.lock().expect("broadcast_handlers lock poisoned").get_mut(&event_owned) {
                    entries.retain(|e| e.id != id);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_url_is_unchanged_without_an_api_key() {
        let config = ClientConfig::new("wss://example.test/sync");
        assert_eq!(connect_url(&config), "wss://example.test/sync");
    }

    #[test]
    fn connect_url_appends_api_key_as_a_query_parameter() {
        let config = ClientConfig::new("wss://example.test/sync").with_api_key("secret-token");
        assert_eq!(connect_url(&config), "wss://example.test/sync?apiKey=secret-token");
    }

    #[test]
    fn connect_url_uses_ampersand_when_a_query_already_exists() {
        let config = ClientConfig::new("wss://example.test/sync?room=1").with_api_key("secret-token");
        assert_eq!(connect_url(&config), "wss://example.test/sync?room=1&apiKey=secret-token");
    }

    #[test]
    fn connect_url_percent_encodes_unsafe_characters_in_the_api_key() {
        let config = ClientConfig::new("wss://example.test/sync").with_api_key("a&b=c");
        assert_eq!(connect_url(&config), "wss://example.test/sync?apiKey=a%26b%3Dc");
    }
}
