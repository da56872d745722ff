//! `ClientResource`: owns one observable of checked state for one logical
//! instance, exposing the dispatch/reconciliation API of spec's §4.4.

use crate::action::{Action, ActionOrActionTuple, CheckedAction};
use crate::checksum::{self, CheckedState};
use crate::dispatcher::{Dispatched, Dispatcher, Reducer};
use crate::error::SyncError;
use crate::observable::{Observable, Unsubscribe};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type DispatchedSubscribers<S> = Arc<Mutex<Vec<(usize, Arc<dyn Fn(&Dispatched<S>) + Send + Sync>)>>>;

/// The conceptual `FRESH -> LIVE -> DESTROYED` state machine. `Fresh` and
/// `Live` are observationally identical to callers (both accept
/// operations); the distinction exists only because spec names it, and
/// the implementation collapses it into a single `is_destroyed` flag —
/// any operation transitions an as-yet-untouched resource straight to
/// `Live` on first use, so no separate bit is needed for `Fresh` itself.
pub struct ClientResource<S, R> {
    observable: Arc<Observable<CheckedState<S>>>,
    dispatcher: Dispatcher<S, R>,
    dispatched_subscribers: DispatchedSubscribers<S>,
    next_dispatched_id: std::sync::atomic::AtomicUsize,
    destroyed: AtomicBool,
    teardown: Mutex<Vec<Unsubscribe>>,
}

impl<S, R> ClientResource<S, R>
where
    S: Clone + PartialEq + Send + Sync + Serialize + 'static,
    R: Reducer<S> + 'static,
{
    /// Construct with an explicit initial state.
    pub fn new(reducer: R, initial_state: S) -> Result<Arc<Self>, SyncError>
    where
        R: Clone,
    {
        let checked = checksum::compute(initial_state)?;
        Ok(Self::from_checked(reducer, checked))
    }

    /// Construct with no initial state: `reducer(undefined, {type: "_init"})`,
    /// spelled in Rust as applying the reducer to `S::default()` with a
    /// synthetic `"_init"` action.
    pub fn new_with_default_init(reducer: R, default_state: S) -> Result<Arc<Self>, SyncError>
    where
        R: Clone,
    {
        let init_action = Action::new("_init", None);
        let initial = reducer.apply(&default_state, &init_action);
        Self::new(reducer, initial)
    }

    fn from_checked(reducer: R, checked: CheckedState<S>) -> Arc<Self>
    where
        R: Clone,
    {
        let observable = Observable::new(checked);
        let dispatched_subscribers: DispatchedSubscribers<S> = Arc::new(Mutex::new(Vec::new()));
        let fanout = dispatched_subscribers.clone();
        let dispatcher = Dispatcher::new(observable.clone(), reducer, move |event| {
            let subscribers = fanout.lock().expect("dispatched-subscribers lock poisoned").clone();
            for (_, cb) in subscribers.iter() {
                cb(&event);
            }
        });
        Arc::new(Self {
            observable,
            dispatcher,
            dispatched_subscribers,
            next_dispatched_id: std::sync::atomic::AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
            teardown: Mutex::new(Vec::new()),
        })
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(SyncError::AlreadyDestroyed)
        } else {
            Ok(())
        }
    }

    /// Dispatch a single public action.
    pub fn dispatch(&self, action: Action) -> Result<(), SyncError> {
        self.ensure_live()?;
        self.dispatcher.dispatch(ActionOrActionTuple::Single(action))
    }

    /// Dispatch a tuple: locally applies `private`, announces `public`.
    pub fn dispatch_private(&self, private: Action, public: Action) -> Result<(), SyncError> {
        self.ensure_live()?;
        self.dispatcher
            .dispatch(ActionOrActionTuple::Tuple(Box::new(private), Box::new(public)))
    }

    /// Apply `action_or_tuple` and return the new checked state, without
    /// emitting `onDispatched`.
    pub fn apply_action(&self, action_or_tuple: ActionOrActionTuple) -> Result<CheckedState<S>, SyncError> {
        self.ensure_live()?;
        let prev = self.observable.get();
        let local_action = action_or_tuple.local_action();
        let next_state = self.apply_with_reducer(&prev.state, local_action);
        let next = checksum::compute(next_state)?;
        self.observable.update(next.clone());
        Ok(next)
    }

    fn apply_with_reducer(&self, state: &S, action: &Action) -> S {
        self.dispatcher.reducer_apply(state, action)
    }

    /// Apply the public half of `checked_action` and verify its checksum.
    /// On mismatch, the observable is left untouched and
    /// `SyncError::ChecksumMismatch` is returned.
    pub fn reconciliate_action(&self, checked_action: CheckedAction) -> Result<CheckedState<S>, SyncError> {
        self.ensure_live()?;
        let prev = self.observable.get();
        let next_state = self.apply_with_reducer(&prev.state, &checked_action.action);
        let next = checksum::compute(next_state)?;
        if next.checksum != checked_action.checksum {
            return Err(SyncError::ChecksumMismatch);
        }
        self.observable.update(next.clone());
        Ok(next)
    }

    /// Apply an entire reconciliation batch atomically: every action in
    /// order, checking the batch's final checksum once at the end. On
    /// mismatch nothing in the batch is retained.
    pub fn reconciliate_actions(
        &self,
        batch: crate::action::ReconciliatoryActions,
    ) -> Result<CheckedState<S>, SyncError> {
        self.ensure_live()?;
        let prev = self.observable.get();
        let mut state = prev.state.clone();
        for checked_action in &batch.actions {
            state = self.apply_with_reducer(&state, &checked_action.action);
        }
        let next = checksum::compute(state)?;
        if next.checksum != batch.final_checksum {
            return Err(SyncError::ChecksumMismatch);
        }
        self.observable.update(next.clone());
        Ok(next)
    }

    pub fn get(&self) -> Result<CheckedState<S>, SyncError> {
        self.ensure_live()?;
        Ok(self.observable.get())
    }

    pub fn get_unchecked_state(&self) -> Result<S, SyncError> {
        self.ensure_live()?;
        Ok(self.observable.get().state)
    }

    /// Replace the state directly, recomputing the checksum.
    pub fn update(&self, next: CheckedState<S>) -> Result<(), SyncError> {
        self.ensure_live()?;
        self.observable.update(next);
        Ok(())
    }

    /// Replace the unchecked state directly, recomputing the checksum.
    pub fn update_unchecked_state(&self, next_state: S) -> Result<(), SyncError> {
        self.ensure_live()?;
        let next = checksum::compute(next_state)?;
        self.observable.update(next);
        Ok(())
    }

    pub fn on_updated(self: &Arc<Self>, f: impl Fn(&CheckedState<S>) + Send + Sync + 'static) -> Unsubscribe {
        self.observable.on_update(f)
    }

    pub fn on_dispatched(self: &Arc<Self>, f: impl Fn(&Dispatched<S>) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.next_dispatched_id.fetch_add(1, Ordering::Relaxed);
        self.dispatched_subscribers
            .lock()
            .expect("dispatched-subscribers lock poisoned")
            .push((id, Arc::new(f)));
        let subscribers = self.dispatched_subscribers.clone();
        Unsubscribe::new_pub(move || {
            subscribers
                .lock()
                .expect("dispatched-subscribers lock poisoned")
                .retain(|(i, _)| *i != id);
        })
    }

    /// Register a teardown thunk to run exactly once on `destroy`.
    pub fn register_teardown(&self, unsubscribe: Unsubscribe) {
        self.teardown.lock().expect("teardown lock poisoned").push(unsubscribe);
    }

    /// Invoke every registered teardown thunk exactly once. Subsequent
    /// calls, and any other operation on `self`, become no-ops / fail with
    /// `AlreadyDestroyed`.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let thunks: Vec<Unsubscribe> = std::mem::take(&mut *self.teardown.lock().expect("teardown lock poisoned"));
        for thunk in thunks {
            thunk.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ReconciliatoryActions;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct CounterReducer;

    impl Reducer<i64> for CounterReducer {
        fn apply(&self, state: &i64, action: &Action) -> i64 {
            match action.r#type.as_str() {
                "inc" => state + 1,
                _ => *state,
            }
        }
    }

    // S1 — Local dispatch.
    #[test]
    fn local_dispatch_updates_state_and_fires_dispatched_once() {
        let resource = ClientResource::new(CounterReducer, 0_i64).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let _sub = resource.on_dispatched(move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        resource.dispatch(Action::new("inc", None)).unwrap();

        assert_eq!(resource.get().unwrap().state, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    // S2 — Reconciliation success.
    #[test]
    fn reconciliation_success_adopts_master_state() {
        let resource = ClientResource::new(CounterReducer, 5_i64).unwrap();
        let expected_checksum = checksum::checksum_of(&6_i64).unwrap();

        let result = resource
            .reconciliate_action(CheckedAction {
                action: Action::new("inc", None),
                checksum: expected_checksum.clone(),
            })
            .unwrap();

        assert_eq!(result.state, 6);
        assert_eq!(result.checksum, expected_checksum);
        assert_eq!(resource.get().unwrap().checksum, expected_checksum);
    }

    // S3 — Reconciliation mismatch: local has diverged to 7, master
    // expects a checksum computed against 6; the observable is untouched.
    #[test]
    fn reconciliation_mismatch_leaves_state_untouched() {
        let resource = ClientResource::new(CounterReducer, 5_i64).unwrap();
        resource.dispatch(Action::new("inc", None)).unwrap();
        resource.dispatch(Action::new("inc", None)).unwrap();
        assert_eq!(resource.get().unwrap().state, 7);

        let wrong_checksum = checksum::checksum_of(&6_i64).unwrap();
        let err = resource
            .reconciliate_action(CheckedAction {
                action: Action::new("inc", None),
                checksum: wrong_checksum,
            })
            .unwrap_err();

        assert!(matches!(err, SyncError::ChecksumMismatch));
        let still = resource.get().unwrap();
        assert_eq!(still.state, 7);
        assert_eq!(still.checksum, checksum::checksum_of(&7_i64).unwrap());
    }

    // S4 — Tuple dispatch: locally applies the private half, carries the
    // tuple shape through to `onDispatched` so an outer binding can send
    // only the public half.
    #[derive(Clone, Debug, PartialEq, serde::Serialize)]
    struct CardState {
        revealed: Option<String>,
    }

    #[derive(Clone)]
    struct RevealReducer;

    impl Reducer<CardState> for RevealReducer {
        fn apply(&self, state: &CardState, action: &Action) -> CardState {
            if action.r#type == "revealCard" {
                let card = action
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("card"))
                    .and_then(|c| c.as_str())
                    .map(String::from);
                CardState { revealed: card }
            } else {
                state.clone()
            }
        }
    }

    #[test]
    fn tuple_dispatch_applies_private_half_locally() {
        let resource = ClientResource::new(RevealReducer, CardState { revealed: None }).unwrap();
        let seen_tuple = Arc::new(Mutex::new(false));
        let seen_tuple2 = seen_tuple.clone();
        let _sub = resource.on_dispatched(move |d| {
            *seen_tuple2.lock().unwrap() = matches!(d.action, ActionOrActionTuple::Tuple(_, _));
        });

        let private = Action::new("revealCard", Some(serde_json::json!({"card": "A\u{2660}"})));
        let public = Action::new("revealCard", Some(serde_json::json!({"card": "?"})));
        resource.dispatch_private(private, public).unwrap();

        assert_eq!(resource.get_unchecked_state().unwrap().revealed.as_deref(), Some("A\u{2660}"));
        assert!(*seen_tuple.lock().unwrap());
    }

    #[test]
    fn reconciliate_actions_batch_is_atomic() {
        let resource = ClientResource::new(CounterReducer, 0_i64).unwrap();
        let batch = ReconciliatoryActions {
            actions: vec![
                CheckedAction {
                    action: Action::new("inc", None),
                    checksum: String::new(),
                },
                CheckedAction {
                    action: Action::new("inc", None),
                    checksum: String::new(),
                },
            ],
            final_checksum: checksum::checksum_of(&2_i64).unwrap(),
        };
        let result = resource.reconciliate_actions(batch).unwrap();
        assert_eq!(result.state, 2);
    }

    #[test]
    fn reconciliate_actions_batch_rejects_bad_final_checksum() {
        let resource = ClientResource::new(CounterReducer, 0_i64).unwrap();
        let batch = ReconciliatoryActions {
            actions: vec![CheckedAction {
                action: Action::new("inc", None),
                checksum: String::new(),
            }],
            final_checksum: "deadbeefdeadbeef".to_string(),
        };
        assert!(matches!(
            resource.reconciliate_actions(batch).unwrap_err(),
            SyncError::ChecksumMismatch
        ));
        assert_eq!(resource.get().unwrap().state, 0);
    }

    #[test]
    fn destroy_stops_subscriber_callbacks_and_is_idempotent() {
        let resource = ClientResource::new(CounterReducer, 0_i64).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let sub = resource.on_updated(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        resource.register_teardown(sub);

        resource.dispatch(Action::new("inc", None)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        resource.destroy();
        resource.destroy(); // idempotent, must not panic or double-run teardown

        assert!(matches!(resource.dispatch(Action::new("inc", None)), Err(SyncError::AlreadyDestroyed)));
    }

    #[test]
    fn new_with_default_init_runs_init_action() {
        #[derive(Clone)]
        struct InitReducer;
        impl Reducer<i64> for InitReducer {
            fn apply(&self, state: &i64, action: &Action) -> i64 {
                match action.r#type.as_str() {
                    "_init" => 100,
                    "inc" => state + 1,
                    _ => *state,
                }
            }
        }
        let resource = ClientResource::new_with_default_init(InitReducer, 0_i64).unwrap();
        assert_eq!(resource.get_unchecked_state().unwrap(), 100);
    }
}
