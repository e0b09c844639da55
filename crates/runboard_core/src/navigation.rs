use std::sync::Mutex;

use url::Url;

use crate::observers::{lock, Observers, Subscription};

/// Callback invoked with the new fragment text (no leading `#`).
pub type FragmentHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Source of the page address fragment and its change notifications.
pub trait NavigationSource: Send + Sync {
    /// Current fragment text, without the leading `#`.
    fn fragment(&self) -> String;

    /// Navigates to `fragment`. Change handlers fire only if the fragment
    /// actually differs from the current one.
    fn set_fragment(&self, fragment: &str);

    /// Registers a handler for fragment changes, released when the returned
    /// subscription is dropped.
    fn on_change(&self, handler: FragmentHandler) -> Subscription;
}

#[derive(Debug)]
struct History {
    entries: Vec<Url>,
    index: usize,
}

impl History {
    fn current(&self) -> &Url {
        &self.entries[self.index]
    }
}

/// In-process page address with back/forward history.
///
/// Fragment text is whatever [`Url`] exposes after normalization, so
/// characters that are not valid in a fragment come back percent-encoded.
pub struct MemoryNavigation {
    history: Mutex<History>,
    observers: Observers<String>,
}

impl MemoryNavigation {
    pub fn new(url: Url) -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![url],
                index: 0,
            }),
            observers: Observers::new(),
        }
    }

    pub fn parse(link: &str) -> Result<Self, url::ParseError> {
        Url::parse(link).map(Self::new)
    }

    pub fn url(&self) -> Url {
        lock(&self.history).current().clone()
    }

    /// Fragment including the leading `#`, or empty when there is none.
    pub fn hash(&self) -> String {
        match fragment_of(lock(&self.history).current()) {
            fragment if fragment.is_empty() => String::new(),
            fragment => format!("#{fragment}"),
        }
    }

    /// Steps one entry back. Returns false at the start of history.
    pub fn back(&self) -> bool {
        self.step(|index, _| index.checked_sub(1))
    }

    /// Steps one entry forward. Returns false at the end of history.
    pub fn forward(&self) -> bool {
        self.step(|index, len| (index + 1 < len).then_some(index + 1))
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).entries.len()
    }

    fn step(&self, next: impl FnOnce(usize, usize) -> Option<usize>) -> bool {
        let moved = {
            let mut history = lock(&self.history);
            match next(history.index, history.entries.len()) {
                Some(index) => {
                    let before = fragment_of(history.current());
                    history.index = index;
                    let after = fragment_of(history.current());
                    if before != after {
                        self.observers.enqueue(after);
                    }
                    true
                }
                None => false,
            }
        };
        self.observers.flush();
        moved
    }
}

impl NavigationSource for MemoryNavigation {
    fn fragment(&self) -> String {
        fragment_of(lock(&self.history).current())
    }

    fn set_fragment(&self, fragment: &str) {
        {
            let mut history = lock(&self.history);
            let mut next = history.current().clone();
            next.set_fragment(Some(fragment));
            let after = fragment_of(&next);
            if after != fragment_of(history.current()) {
                let keep = history.index + 1;
                history.entries.truncate(keep);
                history.entries.push(next);
                history.index = keep;
                self.observers.enqueue(after);
            }
        }
        self.observers.flush();
    }

    fn on_change(&self, handler: FragmentHandler) -> Subscription {
        self.observers
            .subscribe(move |fragment: &String| handler(fragment.as_str()))
    }
}

fn fragment_of(url: &Url) -> String {
    url.fragment().unwrap_or_default().to_string()
}
