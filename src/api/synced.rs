//! Billing client wired through the keyed cache and sync controller.

use color_eyre::Result;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{BillingQueryKey, KeyedCache, QueryKey};
use crate::money::{CurrencyTable, Invoice, NormalizedInvoice, NormalizedPlan};
use crate::sync::{SyncOptions, SyncQuery};

use super::api_types::{ApiInvoiceDetail, AppSettings, SettingChange};
use super::client::BillingClient;

/// Wrap a fetcher of wire invoices so every fetched invoice is normalized once,
/// before it reaches the cache.
///
/// Consumers only ever see `NormalizedInvoice`, so a value served from the
/// cache is never scaled again.
pub fn normalizing_invoice_fetcher<F, Fut>(
  table: Arc<CurrencyTable>,
  fetch_wire: F,
) -> impl Fn(String) -> BoxFuture<'static, Result<NormalizedInvoice>> + Send + Sync + 'static
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Invoice>> + Send + 'static,
{
  move |key| {
    let table = Arc::clone(&table);
    let wire = fetch_wire(key);
    async move {
      let invoice = wire.await?;
      Ok::<_, color_eyre::Report>(NormalizedInvoice::from_wire(invoice, &table)?)
    }
    .boxed()
  }
}

/// Billing client with cache-backed, self-syncing queries.
///
/// This wraps the underlying BillingClient and hands out `SyncQuery`s that
/// share one `KeyedCache`, so every consumer of a data source sees the same
/// latest value.
#[derive(Clone)]
pub struct SyncedBilling {
  client: BillingClient,
  cache: KeyedCache,
  table: Arc<CurrencyTable>,
}

impl SyncedBilling {
  pub fn new(client: BillingClient, cache: KeyedCache, table: CurrencyTable) -> Self {
    Self {
      client,
      cache,
      table: Arc::new(table),
    }
  }

  pub fn cache(&self) -> &KeyedCache {
    &self.cache
  }

  pub fn currency_table(&self) -> &CurrencyTable {
    &self.table
  }

  /// Invoice detail, normalized to display units.
  pub fn invoice(
    &self,
    invoice_id: &str,
    options: SyncOptions<NormalizedInvoice>,
  ) -> SyncQuery<NormalizedInvoice> {
    let key = BillingQueryKey::InvoiceDetail {
      invoice_id: invoice_id.to_string(),
    };
    let client = self.client.clone();
    let request = key.clone();
    let fetcher = normalizing_invoice_fetcher(Arc::clone(&self.table), move |_key| {
      let client = client.clone();
      let request = request.clone();
      async move {
        let detail: ApiInvoiceDetail = client.fetch(&request).await?;
        Ok(detail.invoice)
      }
    });

    SyncQuery::mount(self.cache.clone(), key, fetcher, options)
  }

  /// Plans matching `filter`, with display prices.
  pub fn plans(
    &self,
    filter: Value,
    options: SyncOptions<Vec<NormalizedPlan>>,
  ) -> SyncQuery<Vec<NormalizedPlan>> {
    let key = BillingQueryKey::PlanList { filter };
    let client = self.client.clone();
    let table = Arc::clone(&self.table);
    let filter = key.body().cloned().unwrap_or(Value::Null);

    SyncQuery::mount(
      self.cache.clone(),
      key,
      move |_key| {
        let client = client.clone();
        let table = Arc::clone(&table);
        let filter = filter.clone();
        async move { client.get_plans(&filter, &table).await }
      },
      options,
    )
  }

  /// Merchant settings with optimistic updates.
  ///
  /// Edits show up immediately; a failed save is reported through `on_error`
  /// and the edit stays on screen.
  pub fn app_settings<E>(&self, on_error: E) -> SyncQuery<AppSettings, SettingChange>
  where
    E: Fn(&crate::sync::SyncError) + Send + Sync + 'static,
  {
    let fetch_client = self.client.clone();
    let update_client = self.client.clone();

    let options = SyncOptions::new()
      .optimistic(true)
      .on_error(on_error)
      .update_remote(move |change: Option<SettingChange>, current: AppSettings| {
        let client = update_client.clone();
        async move {
          match change {
            Some(change) => client.update_app_setting(&change).await,
            None => Ok(current),
          }
        }
      });

    SyncQuery::mount(
      self.cache.clone(),
      BillingQueryKey::AppConfig.cache_key(),
      move |_key| {
        let client = fetch_client.clone();
        async move { client.get_app_settings().await }
      },
      options,
    )
  }

  /// Apply one setting edit through `query`.
  pub fn change_setting(query: &mut SyncQuery<AppSettings, SettingChange>, key: &str, value: Value) {
    let mut settings = query.data().cloned().unwrap_or_default();
    settings.insert(key.to_string(), value.clone());
    query.set_data(
      settings,
      Some(SettingChange {
        key: key.to_string(),
        value,
      }),
    );
  }
}
