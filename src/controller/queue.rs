//! Coalescing task queue
//!
//! A key is pending at most once. A key that is enqueued while a worker
//! holds it is parked and re-queued when the worker calls [`TaskQueue::done`],
//! so one installation never has two passes running at the same time.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Identity of one installation
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstallationKey {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl InstallationKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for InstallationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

struct State<K> {
    pending: VecDeque<K>,
    queued: HashSet<K>,
    in_flight: HashSet<K>,
    requeue: HashSet<K>,
    closed: bool,
}

/// Work queue shared by the watcher and the worker pool
pub struct TaskQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

impl<K> Default for TaskQueue<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TaskQueue<K>
where
    K: Clone + Eq + Hash,
{
    /// Empty open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                requeue: HashSet::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Request a pass for `key`. Returns false when the request was merged
    /// into one already pending or parked, or the queue is closed.
    pub fn enqueue(&self, key: K) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.queued.contains(&key) {
            return false;
        }
        if state.in_flight.contains(&key) {
            return state.requeue.insert(key);
        }
        state.queued.insert(key.clone());
        state.pending.push_back(key);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Wait for the next key; `None` once the queue is closed
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(key) = state.pending.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    let more = !state.pending.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release `key` after its pass; a parked request is queued again
    pub fn done(&self, key: &K) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if state.requeue.remove(key) && !state.closed {
            state.queued.insert(key.clone());
            state.pending.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Drop every pending or parked request for `key`
    pub fn forget(&self, key: &K) {
        let mut state = self.state.lock();
        if state.queued.remove(key) {
            state.pending.retain(|k| k != key);
        }
        state.requeue.remove(key);
    }

    /// Stop handing out keys and wake every waiter
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        state.queued.clear();
        state.requeue.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    /// True once [`TaskQueue::close`] was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending keys
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// True when no key is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
