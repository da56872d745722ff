//! The `Dispatcher`: binds a reducer to an `Observable<CheckedState<S>>`
//! and turns an incoming action (or action tuple) into a state update plus
//! a "dispatched" event.

use crate::action::ActionOrActionTuple;
use crate::checksum::{self, CheckedState};
use crate::error::SyncError;
use crate::observable::Observable;
use std::sync::Arc;

/// A total reducer over the action type: applies `action` to `state` and
/// returns the next state. Implementations are expected to match
/// exhaustively on `action.r#type` and treat unknown types as a no-op,
/// since the crate does not itself enforce exhaustiveness at compile time.
///
/// Panics from `apply` are not caught anywhere in this crate; they
/// propagate to the caller of `dispatch`/`apply_action`, per spec.
pub trait Reducer<S>: Send + Sync {
    fn apply(&self, state: &S, action: &crate::action::Action) -> S;
}

/// Payload of the event emitted after a successful dispatch.
pub struct Dispatched<S> {
    pub action: ActionOrActionTuple,
    pub next: CheckedState<S>,
    pub prev: CheckedState<S>,
}

/// Binds one `Observable<CheckedState<S>>` to one `Reducer<S>`.
///
/// Does not expose an `unsubscribe()` of its own: unlike the
/// subscription-holding types in `observable.rs`/`events.rs`, a `Dispatcher`
/// holds no subscription to tear down. Subscribing/unsubscribing from
/// dispatch events lives one layer up, on `ClientResource::on_dispatched`,
/// which does return an `Unsubscribe`.
pub struct Dispatcher<S, R> {
    observable: Arc<Observable<CheckedState<S>>>,
    reducer: R,
    on_dispatched: Box<dyn Fn(Dispatched<S>) + Send + Sync>,
}

impl<S, R> Dispatcher<S, R>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    R: Reducer<S>,
{
    pub fn new(
        observable: Arc<Observable<CheckedState<S>>>,
        reducer: R,
        on_dispatched: impl Fn(Dispatched<S>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            observable,
            reducer,
            on_dispatched: Box::new(on_dispatched),
        }
    }

    /// Apply `action_or_tuple`'s local half through the reducer, update the
    /// bound observable, and emit `onDispatched`. The emitted event
    /// preserves the original tuple shape so an outer binding can forward
    /// only the public half.
    pub fn dispatch(&self, action_or_tuple: ActionOrActionTuple) -> Result<(), SyncError>
    where
        S: serde::Serialize,
    {
        let prev = self.observable.get();
        let local_action = action_or_tuple.local_action();
        let next_state = self.reducer.apply(&prev.state, local_action);
        let next = checksum::compute(next_state)?;
        self.observable.update(next.clone());
        (self.on_dispatched)(Dispatched {
            action: action_or_tuple,
            next,
            prev,
        });
        Ok(())
    }

    /// Apply the reducer directly, without touching the observable or
    /// firing `onDispatched` — used by [`crate::client_resource`] for
    /// `apply_action`/`reconciliate_action`, which have their own update
    /// and event semantics.
    pub(crate) fn reducer_apply(&self, state: &S, action: &crate::action::Action) -> S {
        self.reducer.apply(state, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CounterReducer;

    impl Reducer<i64> for CounterReducer {
        fn apply(&self, state: &i64, action: &Action) -> i64 {
            match action.r#type.as_str() {
                "inc" => state + 1,
                _ => *state,
            }
        }
    }

    #[test]
    fn dispatch_updates_observable_and_fires_once() {
        let observable = Observable::new(checksum::compute(0_i64).unwrap());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let last_action = Arc::new(Mutex::new(None));
        let last_action2 = last_action.clone();
        let dispatcher = Dispatcher::new(observable.clone(), CounterReducer, move |dispatched| {
            fired2.fetch_add(1, Ordering::SeqCst);
            *last_action2.lock().unwrap() = Some(dispatched.action);
        });

        dispatcher.dispatch(Action::new("inc", None).into()).unwrap();

        assert_eq!(observable.get().state, 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(last_action.lock().unwrap().is_some());
    }

    #[test]
    fn dispatch_preserves_tuple_shape_in_event() {
        let observable = Observable::new(checksum::compute(0_i64).unwrap());
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        let dispatcher = Dispatcher::new(observable, CounterReducer, move |dispatched| {
            *seen2.lock().unwrap() = Some(dispatched.action);
        });

        let tuple = ActionOrActionTuple::Tuple(
            Box::new(Action::new("inc", None)),
            Box::new(Action::new("inc", Some(serde_json::json!({"hidden": true})))),
        );
        dispatcher.dispatch(tuple).unwrap();

        let taken = seen.lock().unwrap().take().unwrap();
        match taken {
            ActionOrActionTuple::Tuple(_, _) => {}
            ActionOrActionTuple::Single(_) => panic!("tuple shape was not preserved"),
        }
    }
}
