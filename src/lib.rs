//! Remote-data synchronization and amount normalization for a
//! subscription-billing merchant console.

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod money;
pub mod sync;
