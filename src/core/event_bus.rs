//! Signal bus for model change notifications.
//!
//! Architecture:
//! - Observers subscribe with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues for deferred processing
//! - poll() returns queued signals for batch processing in a view loop
//!
//! Structural changes arrive as bracket pairs (`RowsAboutToInsert` →
//! `RowsInserted`, `RowsAboutToRemove` → `RowsRemoved`); observers must
//! treat model state between the two as not-yet-committed. Pairing is
//! enforced by the tree model itself (see `ChangeToken`), not here.

use std::sync::{Arc, Mutex, RwLock};

use crate::entities::tree::TreePath;

/// Change notification emitted by the tree model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackSignal {
    /// Rows `first..=last` are about to appear under `parent`.
    RowsAboutToInsert {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    RowsInserted {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    /// Rows `first..=last` under `parent` are about to go away.
    RowsAboutToRemove {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    RowsRemoved {
        parent: TreePath,
        first: usize,
        last: usize,
    },
    /// Non-structural in-place update of the node at `path`.
    FieldsChanged { path: TreePath, fields: Vec<String> },
}

type Callback = Arc<dyn Fn(&StackSignal) + Send + Sync>;

/// Pub/sub bus with deferred processing support.
///
/// Clones share the same subscriber list and queue, so a model can hand
/// out handles to views while keeping one for itself.
#[derive(Clone, Default)]
pub struct SignalBus {
    subscribers: Arc<RwLock<Vec<Callback>>>,
    queue: Arc<Mutex<Vec<StackSignal>>>,
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBus")
            .field(
                "subscribers",
                &self.subscribers.read().map(|s| s.len()).unwrap_or(0),
            )
            .field("queue_len", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all model signals.
    ///
    /// The callback is invoked synchronously from inside the mutating
    /// call. It receives a borrowed signal only; mutating the model from
    /// here trips the bracket guard and panics.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&StackSignal) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .expect("signal bus lock")
            .push(Arc::new(callback));
    }

    /// Invoke callbacks immediately and queue the signal for poll().
    pub fn emit(&self, signal: StackSignal) {
        for cb in self.subscribers.read().expect("signal bus lock").iter() {
            cb(&signal);
        }
        self.queue.lock().expect("signal bus lock").push(signal);
    }

    /// Drain all signals emitted since the last poll.
    pub fn poll(&self) -> Vec<StackSignal> {
        std::mem::take(&mut *self.queue.lock().expect("signal bus lock"))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("signal bus lock").len()
    }

    /// Drop all subscribers and pending signals.
    pub fn clear(&self) {
        self.subscribers.write().expect("signal bus lock").clear();
        self.queue.lock().expect("signal bus lock").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn insert(first: usize, last: usize) -> StackSignal {
        StackSignal::RowsInserted {
            parent: TreePath::root(),
            first,
            last,
        }
    }

    #[test]
    fn test_immediate_and_deferred() {
        let bus = SignalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(insert(0, 0));
        bus.emit(insert(1, 1));
        // callbacks fired synchronously
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        // both signals still queued for the deferred consumer
        assert_eq!(bus.poll().len(), 2);
        assert_eq!(bus.poll().len(), 0);
    }

    #[test]
    fn test_clone_shares_queue() {
        let bus = SignalBus::new();
        let handle = bus.clone();
        handle.emit(insert(0, 2));
        let polled = bus.poll();
        assert_eq!(polled, vec![insert(0, 2)]);
    }
}
