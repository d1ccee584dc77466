//! Fetch-and-sync controller built on the keyed cache.
//!
//! Inspired by TanStack Query, a `SyncQuery<T>` ties one consumer to one cache
//! key. It serves the cached value immediately, fetches in the background and
//! lets the consumer write new values either locally or optimistically (cache
//! first, remote update afterwards).
//!
//! # Example
//!
//! ```ignore
//! let client = billing_client.clone();
//! let mut query = SyncQuery::mount(
//!     cache.clone(),
//!     &BillingQueryKey::MerchantProfile,
//!     move |key| {
//!         let client = client.clone();
//!         async move { client.get_json::<Merchant>(&key).await }
//!     },
//!     SyncOptions::new().on_error(|e| tracing::error!("{e}")),
//! );
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

mod controller;
mod options;
mod state;

pub use controller::SyncQuery;
pub use options::{ConflictPolicy, SyncOptions, UpdateOrdering};
pub use state::{FetchState, SyncError};
