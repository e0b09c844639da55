use std::sync::Arc;

use client_logging::{client_debug, client_warn, NAV_TARGET};

use crate::fragment::{decode_fragment, encode_fragment};
use crate::navigation::NavigationSource;
use crate::observers::Subscription;
use crate::selection::{Applied, Selection, SelectionStore};

/// Keeps the address fragment and a [`SelectionStore`] consistent.
///
/// The fragment is the source of truth for navigation. [`HashSync::select`]
/// only writes the fragment; the store is updated by the same change handler
/// that serves external navigation, so one navigation yields one store write.
/// Each received fragment is stamped with a generation drawn from the store,
/// and the store rejects writes older than the newest it has accepted.
///
/// Dropping the synchronizer releases its fragment listener.
pub struct HashSync {
    inner: Arc<SyncInner>,
    listener: Subscription,
}

struct SyncInner {
    store: SelectionStore,
    navigation: Arc<dyn NavigationSource>,
}

impl HashSync {
    /// Seeds `store` from the current fragment and starts listening for changes.
    pub fn attach(store: SelectionStore, navigation: Arc<dyn NavigationSource>) -> Self {
        let inner = Arc::new(SyncInner { store, navigation });

        let initial = inner.navigation.fragment();
        client_debug!(target: NAV_TARGET, "initial fragment {initial:?}");
        inner.receive(&initial);

        let weak = Arc::downgrade(&inner);
        let listener = inner
            .navigation
            .on_change(Box::new(move |fragment: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.receive(fragment);
                }
            }));

        Self { inner, listener }
    }

    /// Navigates to `next` by rewriting the fragment.
    pub fn select(&self, next: &Selection) {
        let fragment = encode_fragment(next);
        client_debug!(target: NAV_TARGET, "select -> {fragment:?}");
        self.inner.navigation.set_fragment(&fragment);
    }

    pub fn store(&self) -> &SelectionStore {
        &self.inner.store
    }

    pub fn current(&self) -> Selection {
        self.inner.store.get()
    }

    /// Stops listening for fragment changes.
    pub fn teardown(self) {
        self.listener.unsubscribe();
    }
}

impl SyncInner {
    fn receive(&self, fragment: &str) {
        let generation = self.store.next_generation();
        self.apply(generation, decode_fragment(fragment));
    }

    fn apply(&self, generation: u64, selection: Selection) -> Applied {
        let applied = self.store.apply(generation, selection);
        match applied {
            Applied::Stale => {
                client_warn!(target: NAV_TARGET, "discarded stale fragment decode #{generation}");
            }
            Applied::Changed | Applied::Unchanged => {
                client_debug!(target: NAV_TARGET, "fragment decode #{generation}: {applied:?}");
            }
        }
        applied
    }
}
