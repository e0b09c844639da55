use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    id: u64,
    /// First event sequence number this listener is entitled to.
    from_seq: u64,
    callback: Callback<T>,
}

struct Registry<T> {
    next_id: u64,
    next_seq: u64,
    listeners: Vec<Listener<T>>,
    pending: VecDeque<(u64, T)>,
    dispatching: bool,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            next_seq: 0,
            listeners: Vec::new(),
            pending: VecDeque::new(),
            dispatching: false,
        }
    }
}

/// Ordered, re-entrancy safe fan-out of events to subscribed callbacks.
///
/// Events are delivered in the order they were enqueued. A callback that
/// triggers another event (directly or through the component that owns the
/// `Observers`) does not recurse: the nested event is queued and delivered
/// once every listener has seen the current one. Only one thread dispatches
/// at a time; an event enqueued while another thread is dispatching is
/// delivered by that thread.
///
/// Owners typically call [`Observers::enqueue`] while holding their own state
/// lock, so the queue order matches the order of state changes, and then
/// [`Observers::flush`] after releasing it.
pub struct Observers<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }
}

impl<T: Send + 'static> Observers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every event enqueued from now on.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            let from_seq = registry.next_seq;
            registry.listeners.push(Listener {
                id,
                from_seq,
                callback: Arc::new(callback),
            });
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                lock(&registry).listeners.retain(|listener| listener.id != id);
            }
        })
    }

    /// Queues `event` for delivery without dispatching it.
    pub fn enqueue(&self, event: T) {
        let mut registry = lock(&self.registry);
        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.pending.push_back((seq, event));
    }

    /// Delivers queued events unless another call is already doing so.
    pub fn flush(&self) {
        {
            let mut registry = lock(&self.registry);
            if registry.dispatching {
                return;
            }
            registry.dispatching = true;
        }
        let _reset = DispatchReset {
            registry: &self.registry,
        };

        loop {
            let (event, targets) = {
                let mut registry = lock(&self.registry);
                let Some((seq, event)) = registry.pending.pop_front() else {
                    registry.dispatching = false;
                    return;
                };
                let targets: Vec<Callback<T>> = registry
                    .listeners
                    .iter()
                    .filter(|listener| listener.from_seq <= seq)
                    .map(|listener| listener.callback.clone())
                    .collect();
                (event, targets)
            };
            for callback in targets {
                callback(&event);
            }
        }
    }

    /// Enqueues and immediately flushes a single event.
    pub fn notify(&self, event: T) {
        self.enqueue(event);
        self.flush();
    }

    /// Drops every listener and any undelivered event.
    pub fn clear(&self) {
        let mut registry = lock(&self.registry);
        registry.listeners.clear();
        registry.pending.clear();
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }
}

/// Clears the dispatching flag when a callback panics mid-dispatch.
struct DispatchReset<'a, T> {
    registry: &'a Mutex<Registry<T>>,
}

impl<T> Drop for DispatchReset<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.registry).dispatching = false;
        }
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription that owns nothing.
    pub fn empty() -> Self {
        Self { release: None }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    /// Keeps the listener registered for the lifetime of its source.
    pub fn detach(mut self) {
        self.release = None;
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
