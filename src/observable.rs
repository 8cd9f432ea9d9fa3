use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;
use parking_lot::RwLock;

/// Identity handed out by [`Observable::subscribe`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry of listeners notified synchronously, in subscription order.
pub struct Observable<T> {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<ObserverId, Listener<T>>>,
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, Arc::new(listener));
        id
    }

    /// Removing an unknown id is a no-op.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.listeners.write().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers `value` to every listener subscribed when the call starts.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may subscribe or unsubscribe from inside the callback. A panicking
    /// listener is logged and skipped.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<(ObserverId, Listener<T>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                warn!("listener {id:?} panicked while handling an event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn delivers_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let obs = Observable::<bool>::new();
        for tag in 0..3 {
            let seen = seen.clone();
            obs.subscribe(move |v: &bool| seen.lock().push((tag, *v)));
        }

        obs.publish(&true);

        assert_eq!(*seen.lock(), vec![(0, true), (1, true), (2, true)]);
    }

    #[test]
    fn ids_are_not_reused_and_unsubscribe_is_idempotent() {
        let obs = Observable::<bool>::new();
        let a = obs.subscribe(|_| {});
        obs.unsubscribe(a);
        obs.unsubscribe(a);
        let b = obs.subscribe(|_| {});

        assert_ne!(a, b);
        assert_eq!(obs.len(), 1);
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let hits = Arc::new(Mutex::new(0));
        let obs = Observable::<bool>::new();
        obs.subscribe(|_| panic!("listener failure"));
        let counter = hits.clone();
        obs.subscribe(move |_| *counter.lock() += 1);

        obs.publish(&false);
        obs.publish(&true);

        assert_eq!(*hits.lock(), 2);
    }

    #[test]
    fn listener_may_subscribe_during_publish() {
        let obs = Arc::new(Observable::<bool>::new());
        let inner = obs.clone();
        obs.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        obs.publish(&true);

        assert_eq!(obs.len(), 2);
    }
}
