//! REST transport for the billing backend.
//!
//! The sync core never talks HTTP itself; this module supplies the fetcher and
//! remote-update functions it calls.

mod api_types;
mod client;
mod synced;

pub use api_types::{AppSettings, SettingChange};
pub use client::BillingClient;
pub use synced::{normalizing_invoice_fetcher, SyncedBilling};
