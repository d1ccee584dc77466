//! Serde types matching the billing backend's response envelopes.
//!
//! These are separate from the money types so envelope shapes can change
//! without touching the normalizer.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::money::{Invoice, Plan};

/// Every response is wrapped as `{ code, message, data }`; `code != 0` is a failure.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  pub code: i64,
  #[serde(default)]
  pub message: String,
  pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
  /// Unwrap the payload or turn the backend's failure into an error.
  pub fn into_data(self, path: &str) -> Result<T> {
    if self.code != 0 {
      return Err(eyre!(
        "{} failed with code {}: {}",
        path,
        self.code,
        self.message
      ));
    }
    self
      .data
      .ok_or_else(|| eyre!("{} returned no data", path))
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiInvoiceDetail {
  pub invoice: Invoice,
}

#[derive(Debug, Deserialize)]
pub struct ApiPlanEntry {
  pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct ApiPlanList {
  #[serde(default)]
  pub plans: Vec<ApiPlanEntry>,
  #[serde(default)]
  pub total: u64,
}

/// Merchant application settings, keyed by setting name.
pub type AppSettings = BTreeMap<String, Value>;

#[derive(Debug, Deserialize)]
pub struct ApiAppSettings {
  #[serde(default)]
  pub configs: AppSettings,
}

/// One edited setting, sent with an optimistic settings update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingChange {
  pub key: String,
  pub value: Value,
}
