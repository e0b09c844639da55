//! Runboard core: view selection state, fragment codec and hash synchronization.
mod fragment;
mod hash_sync;
mod navigation;
mod observers;
mod selection;

pub use fragment::{decode_fragment, encode_fragment, RUN_PREFIX};
pub use hash_sync::HashSync;
pub use navigation::{FragmentHandler, MemoryNavigation, NavigationSource};
pub use observers::{Observers, Subscription};
pub use selection::{Applied, Selection, SelectionStore};
