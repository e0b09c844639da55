use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use runboard_core::{
    decode_fragment, encode_fragment, HashSync, MemoryNavigation, NavigationSource, Selection,
    SelectionStore,
};

fn navigation(link: &str) -> Arc<MemoryNavigation> {
    Arc::new(MemoryNavigation::parse(link).expect("valid link"))
}

#[test]
fn attach_seeds_store_from_fragment() {
    let nav = navigation("http://localhost:5173/#proj-42/r:run-7");
    let store = SelectionStore::new();

    let _sync = HashSync::attach(store.clone(), nav);

    assert_eq!(store.get(), Selection::new("proj-42", "run-7"));
}

#[test]
fn select_updates_fragment_and_notifies_once() {
    let nav = navigation("http://localhost:5173/#proj-42/r:run-7");
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), nav.clone());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let _sub = store.subscribe(move |selection| log.lock().unwrap().push(selection.clone()));

    sync.select(&Selection::project("proj-9"));

    assert_eq!(nav.hash(), "#proj-9");
    assert_eq!(store.get(), Selection::project("proj-9"));
    assert_eq!(*seen.lock().unwrap(), vec![Selection::project("proj-9")]);
}

#[test]
fn selecting_the_current_value_is_silent() {
    let nav = navigation("http://localhost/#alpha/r:1");
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), nav.clone());

    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let _sub = store.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    sync.select(&Selection::new("alpha", "1"));

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(nav.history_len(), 1);
}

#[test]
fn external_navigation_updates_store() {
    let nav = navigation("http://localhost/");
    let store = SelectionStore::new();
    let _sync = HashSync::attach(store.clone(), nav.clone());

    nav.set_fragment("beta/r:run-3/tasks");

    assert_eq!(store.get(), Selection::new("beta", "run-3"));
}

#[test]
fn rapid_back_and_forward_lands_on_last_fragment() {
    let nav = navigation("http://localhost/#a");
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), nav.clone());

    sync.select(&Selection::project("b"));
    sync.select(&Selection::new("b", "run-1"));
    nav.back();
    nav.back();
    nav.forward();

    assert_eq!(nav.fragment(), "b");
    assert_eq!(store.get(), Selection::project("b"));
}

#[test]
fn malformed_fragment_yields_no_run() {
    let nav = navigation("http://localhost/#alpha/run-1");
    let store = SelectionStore::new();
    let _sync = HashSync::attach(store.clone(), nav);

    assert_eq!(store.get(), Selection::project("alpha"));
}

#[test]
fn dropping_synchronizer_releases_listener() {
    let nav = navigation("http://localhost/#alpha");
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), nav.clone());
    nav.set_fragment("alpha/r:1");
    nav.set_fragment("alpha/r:2");

    sync.teardown();
    nav.set_fragment("beta");

    assert_eq!(store.get(), Selection::new("alpha", "2"));

    let scoped = HashSync::attach(store.clone(), nav.clone());
    assert_eq!(store.get(), Selection::project("beta"));
    drop(scoped);
    nav.set_fragment("gamma");
    assert_eq!(store.get(), Selection::project("beta"));
}

#[test]
fn store_subscriber_may_navigate_again() {
    let nav = navigation("http://localhost/");
    let store = SelectionStore::new();
    let sync = Arc::new(HashSync::attach(store.clone(), nav.clone()));

    let redirect = Arc::downgrade(&sync);
    let _sub = store.subscribe(move |selection| {
        if selection.project_id == "old" {
            if let Some(sync) = redirect.upgrade() {
                sync.select(&Selection::project("new"));
            }
        }
    });

    sync.select(&Selection::project("old"));

    assert_eq!(nav.fragment(), "new");
    assert_eq!(store.get(), Selection::project("new"));
}

#[test]
fn fragment_round_trips_for_slug_ids() {
    let samples = [
        Selection::project("proj-42"),
        Selection::new("proj-42", "run-7"),
        Selection::new("a_b.c~d", "0f9a3c2e-1b7d-4c4e-9d65-3e1f7a0b8c21"),
        Selection::new("x", "r:nested"),
    ];

    for selection in samples {
        let encoded = encode_fragment(&selection);
        if selection.run_id.is_empty() {
            assert!(!encoded.contains("/r:"));
        }
        assert_eq!(decode_fragment(&encoded), selection);
    }
}

#[test]
fn round_trip_through_the_address_bar() {
    let nav = navigation("http://localhost/");
    let store = SelectionStore::new();
    let sync = HashSync::attach(store.clone(), nav.clone());

    let selection = Selection::new("proj-42", "run-7");
    sync.select(&selection);

    assert_eq!(nav.url().as_str(), "http://localhost/#proj-42/r:run-7");
    assert_eq!(store.get(), selection);
}
