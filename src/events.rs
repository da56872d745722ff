//! Topic-keyed pubsub: `subscribe`/`publish` over a `String` topic, each
//! topic owning its own subscriber set. Used by the master connection's
//! broadcast fan-out (§4.6) and the per-resource-id routing topics
//! (`"rid:<canonical-rid>"`, §4.5).
//!
//! Each owner keeps its own registry rather than reaching for a process-
//! wide global one, per spec's design notes.

use crate::observable::Unsubscribe;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: usize,
    handler: Handler<T>,
}

/// A topic -> subscriber-set registry for values of type `T`.
pub struct TopicBus<T> {
    topics: RwLock<HashMap<String, Vec<Entry<T>>>>,
    next_id: AtomicUsize,
}

impl<T: 'static> TopicBus<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        })
    }

    /// Subscribe to `topic`. A callback registered here fires for every
    /// `publish` on `topic` that happens strictly after this call and
    /// strictly before the returned handle is unsubscribed.
    pub fn subscribe(self: &Arc<Self>, topic: impl Into<String>, handler: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.topics
            .write()
            .expect("TopicBus lock poisoned")
            .entry(topic.clone())
            .or_default()
            .push(Entry {
                id,
                handler: Arc::new(handler),
            });
        let weak = Arc::downgrade(self);
        Unsubscribe::new_pub(move || {
            if let Some(bus) = weak.upgrade() {
                if let Some(entries) = bus.topics.write().expect("TopicBus lock poisoned").get_mut(&topic) {
                    entries.retain(|e| e.id != id);
                }
            }
        })
    }

    /// Invoke every subscriber registered on `topic`, in subscription
    /// order. Unknown topics are a silent no-op.
    pub fn publish(&self, topic: &str, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .topics
            .read()
            .expect("TopicBus lock poisoned")
            .get(topic)
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(value);
        }
    }
}
