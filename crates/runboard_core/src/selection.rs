use std::sync::{Arc, Mutex};

use crate::observers::{lock, Observers, Subscription};

/// What the user is looking at. Empty ids mean "none selected".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selection {
    pub project_id: String,
    pub run_id: String,
}

impl Selection {
    pub fn new(project_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            run_id: run_id.into(),
        }
    }

    /// A project selection with no run.
    pub fn project(project_id: impl Into<String>) -> Self {
        Self::new(project_id, "")
    }

    pub fn is_empty(&self) -> bool {
        self.project_id.is_empty() && self.run_id.is_empty()
    }

    pub fn has_run(&self) -> bool {
        !self.run_id.is_empty()
    }
}

/// Outcome of a generation-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The selection changed and observers were notified.
    Changed,
    /// The selection already matched; nothing was emitted.
    Unchanged,
    /// A newer generation was already applied; the write was dropped.
    Stale,
}

#[derive(Debug, Default)]
struct Current {
    selection: Selection,
    /// Last generation handed out by [`SelectionStore::next_generation`].
    issued: u64,
    /// Highest generation accepted through [`SelectionStore::apply`].
    generation: u64,
}

#[derive(Default)]
struct Shared {
    current: Mutex<Current>,
    observers: Observers<Selection>,
}

/// Observable holder of the current [`Selection`].
///
/// Cloning yields another handle to the same state; create a fresh store with
/// [`SelectionStore::new`] for an isolated instance. All writes funnel through
/// the store's lock, which also fixes the order in which observers see them.
#[derive(Clone, Default)]
pub struct SelectionStore {
    shared: Arc<Shared>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Selection {
        lock(&self.shared.current).selection.clone()
    }

    /// Replaces the selection if any field differs. Returns whether it changed.
    pub fn set(&self, next: Selection) -> bool {
        let changed = {
            let mut current = lock(&self.shared.current);
            self.replace(&mut current, next)
        };
        self.shared.observers.flush();
        changed
    }

    /// Reserves a generation for a write that will be applied later.
    ///
    /// Generations are strictly increasing per store, regardless of how many
    /// writers draw from it.
    pub fn next_generation(&self) -> u64 {
        let mut current = lock(&self.shared.current);
        current.issued += 1;
        current.issued
    }

    /// Like [`SelectionStore::set`], but drops the write when a newer
    /// `generation` has already been applied.
    pub fn apply(&self, generation: u64, next: Selection) -> Applied {
        let applied = {
            let mut current = lock(&self.shared.current);
            if generation < current.generation {
                Applied::Stale
            } else {
                current.generation = generation;
                if self.replace(&mut current, next) {
                    Applied::Changed
                } else {
                    Applied::Unchanged
                }
            }
        };
        self.shared.observers.flush();
        applied
    }

    /// Registers `callback` for every subsequent change.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Selection) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.observers.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.observers.listener_count()
    }

    /// Drops every subscriber. The selection itself is kept.
    pub fn teardown(&self) {
        self.shared.observers.clear();
    }

    fn replace(&self, current: &mut Current, next: Selection) -> bool {
        if current.selection == next {
            return false;
        }
        current.selection = next.clone();
        self.shared.observers.enqueue(next);
        true
    }
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("selection", &self.get())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
