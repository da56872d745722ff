//! `MasterResourceConnection`: the per-resource-type dispatch fabric of
//! spec's §4.5. Many of these share one [`MasterClientConnection`], each
//! filtering the same two wire broadcasts (`fwdAction`, `reconciliateActions`)
//! down to its own `resource_type` and re-publishing per-resource-id.

use crate::action::{Action, ActionOrActionTuple, CheckedAction, ReconciliatoryActions};
use crate::connection::MasterClientConnection;
use crate::error::SyncError;
use crate::events::TopicBus;
use crate::observable::Unsubscribe;
use crate::resource_id::ResourceIdentifier;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
struct FwdActionWire {
    rid: String,
    action: Action,
    checksum: String,
}

#[derive(Debug, Deserialize)]
struct ReconciliateActionsWire {
    rid: String,
    actions: Vec<CheckedAction>,
    #[serde(rename = "finalChecksum")]
    final_checksum: String,
}

/// Multiplexes one `resource_type`'s worth of forward-actions and
/// reconciliation batches out of the shared connection's `fwdAction`/
/// `reconciliateActions` broadcasts, and exposes the create/get/emit-action
/// request trio scoped to that type.
pub struct MasterResourceConnection {
    resource_type: String,
    connection: Arc<MasterClientConnection>,
    fwd_action_bus: Arc<TopicBus<CheckedAction>>,
    reconciliate_bus: Arc<TopicBus<ReconciliatoryActions>>,
    teardown: Mutex<Vec<Unsubscribe>>,
    destroyed: AtomicBool,
}

impl MasterResourceConnection {
    pub fn new(resource_type: impl Into<String>, connection: Arc<MasterClientConnection>) -> Arc<Self> {
        let resource_type = resource_type.into();
        let fwd_action_bus = TopicBus::new();
        let reconciliate_bus = TopicBus::new();

        let this = Arc::new(Self {
            resource_type: resource_type.clone(),
            connection: connection.clone(),
            fwd_action_bus: fwd_action_bus.clone(),
            reconciliate_bus: reconciliate_bus.clone(),
            teardown: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });

        let watched_type = resource_type.clone();
        let fwd_sub = connection.on_broadcast("fwdAction", move |value: Value| {
            match serde_json::from_value::<FwdActionWire>(value) {
                Ok(wire) => match ResourceIdentifier::try_from(wire.rid.as_str()) {
                    Ok(rid) if rid.resource_type == watched_type => {
                        fwd_action_bus.publish(
                            &rid.topic_key(),
                            &CheckedAction {
                                action: wire.action,
                                checksum: wire.checksum,
                            },
                        );
                    }
                    Ok(_) => {} // a different resource type's traffic
                    Err(err) => log::warn!("dropping fwdAction with unparseable rid: {err}"),
                },
                Err(err) => log::warn!("dropping malformed fwdAction broadcast: {err}"),
            }
        });

        let watched_type = resource_type.clone();
        let reconciliate_sub = connection.on_broadcast("reconciliateActions", move |value: Value| {
            match serde_json::from_value::<ReconciliateActionsWire>(value) {
                Ok(wire) => match ResourceIdentifier::try_from(wire.rid.as_str()) {
                    Ok(rid) if rid.resource_type == watched_type => {
                        reconciliate_bus.publish(
                            &rid.topic_key(),
                            &ReconciliatoryActions {
                                actions: wire.actions,
                                final_checksum: wire.final_checksum,
                            },
                        );
                    }
                    Ok(_) => {}
                    Err(err) => log::warn!("dropping reconciliateActions with unparseable rid: {err}"),
                },
                Err(err) => log::warn!("dropping malformed reconciliateActions broadcast: {err}"),
            }
        });

        this.teardown.lock().expect("teardown lock poisoned").push(fwd_sub);
        this.teardown.lock().expect("teardown lock poisoned").push(reconciliate_sub);
        this
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(SyncError::AlreadyDestroyed)
        } else {
            Ok(())
        }
    }

    /// Ask the master to create a new resource of this connection's type,
    /// returning the id it assigned.
    pub async fn create(&self, initial_state: Value) -> Result<String, SyncError> {
        self.ensure_live()?;
        let response = self
            .connection
            .request(
                "createResource",
                json!({"resourceType": self.resource_type, "resourceState": initial_state}),
            )
            .await?;
        response
            .get("resourceId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::StateNotSerializable("createResource response missing resourceId".into()))
    }

    /// Fetch the master's current state for `rid`.
    pub async fn get(&self, rid: &ResourceIdentifier) -> Result<Value, SyncError> {
        self.ensure_live()?;
        if rid.resource_type != self.resource_type {
            return Err(SyncError::InvalidResourceIdentifier(rid.to_canonical()));
        }
        self.connection
            .request("getResourceState", json!({"rid": rid.to_canonical()}))
            .await
    }

    /// Forward a locally-dispatched action to the master. For a tuple, both
    /// halves are transmitted — the master applies the private half and
    /// re-broadcasts only the public half to other peers via `fwdAction`;
    /// this connection never decides which half is public on its own.
    pub async fn emit_action(&self, rid: &ResourceIdentifier, action_or_tuple: &ActionOrActionTuple) -> Result<Value, SyncError> {
        self.ensure_live()?;
        if rid.resource_type != self.resource_type {
            return Err(SyncError::InvalidResourceIdentifier(rid.to_canonical()));
        }
        self.connection
            .request("emitAction", json!({"rid": rid.to_canonical(), "action": action_or_tuple}))
            .await
    }

    /// Subscribe to forward-actions the master broadcasts for `rid`. An
    /// outer binding is expected to feed each one into the matching
    /// `ClientResource::reconciliate_action`.
    pub fn on_fwd_action(&self, rid: &ResourceIdentifier, handler: impl Fn(&CheckedAction) + Send + Sync + 'static) -> Unsubscribe {
        self.fwd_action_bus.subscribe(rid.topic_key(), handler)
    }

    /// Subscribe to reconciliation batches the master broadcasts for `rid`.
    pub fn on_reconciliatory_actions(
        &self,
        rid: &ResourceIdentifier,
        handler: impl Fn(&ReconciliatoryActions) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.reconciliate_bus.subscribe(rid.topic_key(), handler)
    }

    /// Release this connection's two broadcast-topic registrations. Does
    /// not touch the shared [`MasterClientConnection`] or any other
    /// `MasterResourceConnection` built on top of it.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for unsubscribe in self.teardown.lock().expect("teardown lock poisoned").drain(..) {
            unsubscribe.unsubscribe();
        }
    }
}
