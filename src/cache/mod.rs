//! Keyed remote-data cache.
//!
//! This module holds the last successfully fetched value for each data source:
//! - Entries are keyed by request URL or a caller-chosen logical name
//! - Values are type-erased and read back through a typed accessor
//! - Nothing expires or is evicted; the last writer wins
//! - Each write bumps a version number so consumers can notice changes

mod key;
mod store;

pub use key::{BillingQueryKey, Method, QueryKey};
pub use store::{EntryInfo, KeyedCache};
