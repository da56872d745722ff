//! The `Transport` contract: a duplex channel with request/ack and
//! broadcast semantics, per spec's §6. The wire format and concrete
//! channel implementation are external collaborators — this crate depends
//! only on this trait; [`crate::ws_transport::TungsteniteTransport`] is one
//! concrete implementation shipped for convenience.

use crate::observable::Unsubscribe;
use futures::future::BoxFuture;
use serde_json::Value;

/// The envelope a transport hands back for a single request's
/// acknowledgement: `{ok: true, val}` or `{ok: false, val}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AckEnvelope {
    pub ok: bool,
    pub val: Value,
}

/// A handler invoked once with a request's ack envelope.
pub type AckCallback = Box<dyn FnOnce(AckEnvelope) + Send>;

/// A handler invoked for every broadcast received on a subscribed event
/// name.
pub type BroadcastHandler = Box<dyn Fn(Value) + Send + Sync>;

/// A duplex channel to the master, abstracted behind request/ack and
/// broadcast primitives so the rest of the crate never depends on a
/// concrete wire protocol.
pub trait Transport: Send + Sync {
    /// Open the underlying channel.
    fn connect(&self) -> BoxFuture<'_, Result<(), crate::error::SyncError>>;

    /// Close the underlying channel.
    fn disconnect(&self) -> BoxFuture<'_, Result<(), crate::error::SyncError>>;

    /// Send `payload` tagged with request `event`; if `ack` is `Some`, the
    /// transport must invoke it exactly once with the matching response,
    /// or never, if the connection drops before a response arrives.
    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>);

    /// Subscribe to every occurrence of server-pushed event `event`
    /// (no ack). Returns an idempotent unsubscribe handle.
    fn on(&self, event: &str, handler: BroadcastHandler) -> Unsubscribe;
}
