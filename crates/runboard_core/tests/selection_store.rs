use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use runboard_core::{Applied, Selection, SelectionStore};

fn counting(store: &SelectionStore) -> (Arc<AtomicUsize>, runboard_core::Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let sub = store.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (count, sub)
}

#[test]
fn starts_with_nothing_selected() {
    let store = SelectionStore::new();
    assert_eq!(store.get(), Selection::default());
    assert!(store.get().is_empty());
}

#[test]
fn unchanged_set_does_not_notify() {
    let store = SelectionStore::new();
    let (count, _sub) = counting(&store);

    assert!(store.set(Selection::new("alpha", "run-1")));
    assert!(!store.set(Selection::new("alpha", "run-1")));

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn any_differing_field_notifies_with_new_value() {
    let store = SelectionStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let _sub = store.subscribe(move |selection| log.lock().unwrap().push(selection.clone()));

    store.set(Selection::project("alpha"));
    store.set(Selection::new("alpha", "run-1"));
    store.set(Selection::new("beta", "run-1"));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Selection::project("alpha"),
            Selection::new("alpha", "run-1"),
            Selection::new("beta", "run-1"),
        ]
    );
}

#[test]
fn clones_share_state_but_new_stores_are_isolated() {
    let store = SelectionStore::new();
    let handle = store.clone();
    let other = SelectionStore::new();

    handle.set(Selection::project("alpha"));

    assert_eq!(store.get(), Selection::project("alpha"));
    assert_eq!(other.get(), Selection::default());
}

#[test]
fn unsubscribe_stops_notifications() {
    let store = SelectionStore::new();
    let (count, sub) = counting(&store);

    store.set(Selection::project("alpha"));
    sub.unsubscribe();
    store.set(Selection::project("beta"));

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn teardown_clears_subscribers_but_keeps_selection() {
    let store = SelectionStore::new();
    let (count, _sub) = counting(&store);
    store.set(Selection::project("alpha"));

    store.teardown();
    assert_eq!(store.subscriber_count(), 0);

    store.set(Selection::project("beta"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(), Selection::project("beta"));
}

#[test]
fn apply_rejects_older_generations() {
    let store = SelectionStore::new();

    assert_eq!(store.apply(2, Selection::project("b")), Applied::Changed);
    assert_eq!(store.apply(2, Selection::project("b")), Applied::Unchanged);
    assert_eq!(store.apply(1, Selection::project("a")), Applied::Stale);
    assert_eq!(store.get(), Selection::project("b"));
}

#[test]
fn subscriber_writing_back_sees_ordered_notifications() {
    let store = SelectionStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let writer = store.clone();
    let _redirect = store.subscribe(move |selection| {
        if selection.project_id == "legacy" {
            writer.set(Selection::project("current"));
        }
    });
    let log = seen.clone();
    let _log = store.subscribe(move |selection| log.lock().unwrap().push(selection.project_id.clone()));

    store.set(Selection::project("legacy"));

    assert_eq!(*seen.lock().unwrap(), vec!["legacy", "current"]);
    assert_eq!(store.get(), Selection::project("current"));
}
