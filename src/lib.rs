//! Client-side distributed-state runtime: peers dispatch actions to a
//! local reducer-driven resource, compute optimistic checksummed state,
//! and reconcile against a master-authoritative action stream.
//!
//! The pieces compose but are never auto-wired: a [`client_resource::ClientResource`]
//! knows nothing about [`master_connection::MasterResourceConnection`] or
//! vice versa. An application binds the two together — forwarding a
//! dispatched public action to `emit_action`, and feeding forward-actions
//! and reconciliation batches back into `reconciliate_action`/
//! `reconciliate_actions` — because only the application knows which
//! resource instance a given connection answers for.

pub mod action;
pub mod checksum;
pub mod client_resource;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod master_connection;
pub mod observable;
pub mod resource_id;
pub mod transport;
pub mod ws_transport;

pub use action::{Action, ActionOrActionTuple, CheckedAction, ReconciliatoryActions};
pub use checksum::{checksum_of, CheckedState};
pub use client_resource::ClientResource;
pub use config::ClientConfig;
pub use connection::MasterClientConnection;
pub use dispatcher::{Dispatched, Dispatcher, Reducer};
pub use error::SyncError;
pub use events::TopicBus;
pub use master_connection::MasterResourceConnection;
pub use observable::{Observable, Unsubscribe};
pub use resource_id::ResourceIdentifier;
pub use transport::{AckCallback, AckEnvelope, BroadcastHandler, Transport};
pub use ws_transport::TungsteniteTransport;
