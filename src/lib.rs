//! granary — a client-side read-through cache for asynchronous fetch results.
//!
//! Entries are keyed by a logical domain plus a canonicalized filter object:
//! filters that differ only in property order or in null/empty noise address
//! the same entry. Concurrent identical fetches are deduplicated through an
//! in-flight registry, and every entry carries explicit lifecycle state
//! (loading / validating / error) behind watch channels that external
//! reactive layers can subscribe to.
//!
//! ```ignore
//! let ctx: ContextPointer<Users> = CacheContext::new();
//! let binding = create_cache_binding(
//!     &ctx,
//!     BindingConfig::new("users", Arc::new(FetchFn(fetch_users)))
//!         .with_filters(|| Some(json!({ "status": "active", "page": 1 }))),
//! );
//! binding.tick().await;          // fetch once the binding is ready
//! let users = binding.data();    // cached value, reactive via subscribe_data()
//! ```

pub mod binding;
pub mod context;
pub mod coordinator;
pub mod entry;
mod error;
pub mod fetch;
pub mod key;
pub mod readiness;
pub mod store;


pub use binding::{BindingConfig, CacheBinding, FilterFn};
pub use context::{create_cache_binding, CacheContext, ContextPointer, ContextStats};
pub use coordinator::{FetchCoordinator, FetchId, InFlightStats, SharedFetch};
pub use entry::{CacheEntry, EntryState};
pub use error::{Error, SharedSource};
pub use fetch::{Fetch, FetchFn};
pub use key::{canonical_filters, canonicalize, key_of, EMPTY_KEY};
pub use readiness::{ProbeError, Readiness};
pub use store::{CacheStats, CacheStore, SubScope};
