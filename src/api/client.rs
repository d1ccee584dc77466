use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cache::{BillingQueryKey, Method};
use crate::config::Config;
use crate::money::{CurrencyTable, NormalizedInvoice, NormalizedPlan};

use super::api_types::{
  ApiAppSettings, ApiEnvelope, ApiInvoiceDetail, ApiPlanList, AppSettings, SettingChange,
};

/// Billing backend API client
#[derive(Clone)]
pub struct BillingClient {
  http: reqwest::Client,
  base_url: String,
}

impl BillingClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    Self::with_api_key(config, &api_key)
  }

  pub fn with_api_key(config: &Config, api_key: &str) -> Result<Self> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
      .map_err(|e| eyre!("Invalid API key: {}", e))?;
    auth.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    // Validate once so request URLs can be built without re-checking the base
    Url::parse(&config.api.url).map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;

    Ok(Self {
      http,
      base_url: config.api.url.trim_end_matches('/').to_string(),
    })
  }

  /// Absolute URL for a request path such as `/merchant/get`.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| eyre!("Invalid request url {}: {}", joined, e))
  }

  /// Fetch and unwrap the payload of a data source.
  pub async fn fetch<T: DeserializeOwned>(&self, key: &BillingQueryKey) -> Result<T> {
    let path = key.path();
    match (key.method(), key.body()) {
      (Method::Post, Some(body)) => self.post(&path, body).await,
      _ => self.get(&path).await,
    }
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = self.url_for(path)?;
    debug!(%url, "GET");
    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))?;
    Self::decode(path, response).await
  }

  pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T> {
    let url = self.url_for(path)?;
    debug!(%url, "POST");
    let response = self
      .http
      .post(url)
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))?;
    Self::decode(path, response).await
  }

  async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let response = response
      .error_for_status()
      .map_err(|e| eyre!("Request to {} failed: {}", path, e))?;
    let envelope: ApiEnvelope<T> = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", path, e))?;
    envelope.into_data(path)
  }

  /// Get an invoice, normalized to display units.
  pub async fn get_invoice(&self, invoice_id: &str, table: &CurrencyTable) -> Result<NormalizedInvoice> {
    let key = BillingQueryKey::InvoiceDetail {
      invoice_id: invoice_id.to_string(),
    };
    let detail: ApiInvoiceDetail = self.fetch(&key).await?;
    Ok(NormalizedInvoice::from_wire(detail.invoice, table)?)
  }

  /// List plans matching `filter` with their display prices.
  pub async fn get_plans(
    &self,
    filter: &serde_json::Value,
    table: &CurrencyTable,
  ) -> Result<Vec<NormalizedPlan>> {
    let key = BillingQueryKey::PlanList {
      filter: filter.clone(),
    };
    let list: ApiPlanList = self.fetch(&key).await?;
    list
      .plans
      .into_iter()
      .map(|entry| -> Result<NormalizedPlan> { Ok(NormalizedPlan::from_wire(entry.plan, table)?) })
      .collect()
  }

  pub async fn get_app_settings(&self) -> Result<AppSettings> {
    let settings: ApiAppSettings = self.fetch(&BillingQueryKey::AppConfig).await?;
    Ok(settings.configs)
  }

  /// Persist one setting and return the settings as stored by the backend.
  pub async fn update_app_setting(&self, change: &SettingChange) -> Result<AppSettings> {
    let settings: ApiAppSettings = self.post("/merchant/config/update", change).await?;
    Ok(settings.configs)
  }
}
