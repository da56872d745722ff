//! `Observable<T>`: a single-value holder with subscribe-on-change
//! semantics, firing every subscriber synchronously and in subscription
//! order when `update` actually changes the value.
//!
//! Modeled on the subscriber-list-under-lock pubsub pattern: callbacks are
//! `Arc`-wrapped so the lock guarding the subscriber list can be dropped
//! before callbacks run, avoiding deadlock for a callback that itself
//! calls `get`/`subscribe`/`update`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: usize,
    callback: Callback<T>,
}

struct Inner<T> {
    value: T,
    subscribers: Vec<Subscriber<T>>,
}

/// Holds one value of type `T` and notifies subscribers synchronously on
/// change.
///
/// Equality for change-detection is structural (`PartialEq`); two `update`
/// calls with an equal value are no-ops, matching spec's "differs
/// (structural ... equality)" choice, documented here rather than left
/// ambiguous per-call.
pub struct Observable<T> {
    inner: RwLock<Inner<T>>,
    next_id: AtomicUsize,
}

/// A handle returned by [`Observable::on_update`]; call it once to stop
/// receiving updates. Calling it more than once is a no-op.
pub struct Unsubscribe {
    inner: Box<dyn FnMut() + Send>,
}

impl Unsubscribe {
    fn new(f: impl FnMut() + Send + 'static) -> Self {
        Self { inner: Box::new(f) }
    }

    /// Construct an `Unsubscribe` from outside this module (other pubsub
    /// registries, e.g. [`crate::events::TopicBus`], share this same handle
    /// type rather than inventing their own).
    pub fn new_pub(f: impl FnMut() + Send + 'static) -> Self {
        Self::new(f)
    }

    pub fn unsubscribe(mut self) {
        (self.inner)();
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Observable<T> {
    pub fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                value: initial,
                subscribers: Vec::new(),
            }),
            next_id: AtomicUsize::new(0),
        })
    }

    pub fn get(&self) -> T {
        self.inner.read().expect("Observable lock poisoned").value.clone()
    }

    /// Replace the current value if `next` differs from it, firing every
    /// subscriber registered *before* this call with the new value.
    /// Subscribers added by a callback invoked during this `update` do not
    /// themselves fire for this same update, since the fan-out list is
    /// snapshotted before any callback runs.
    pub fn update(&self, next: T) {
        let callbacks = {
            let mut guard = self.inner.write().expect("Observable lock poisoned");
            if guard.value == next {
                return;
            }
            guard.value = next.clone();
            guard.subscribers.iter().map(|s| s.callback.clone()).collect::<Vec<_>>()
        };
        for cb in &callbacks {
            cb(&next);
        }
    }

    pub fn on_update(self: &Arc<Self>, f: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().expect("Observable lock poisoned").subscribers.push(Subscriber {
            id,
            callback: Arc::new(f),
        });
        let weak = Arc::downgrade(self);
        Unsubscribe::new(move || {
            if let Some(strong) = weak.upgrade() {
                let mut guard = strong.inner.write().expect("Observable lock poisoned");
                guard.subscribers.retain(|s| s.id != id);
            }
        })
    }
}
