//! Cache keys for billing backend data sources.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Anything that identifies a logical remote data source.
///
/// Controllers re-fetch when the `cache_key()` of their key changes, so two
/// keys describing the same request must produce the same string.
pub trait QueryKey {
  /// Key under which the data source is cached (usually the request URL).
  fn cache_key(&self) -> String;

  /// Human readable description for logs.
  fn description(&self) -> String {
    self.cache_key()
  }
}

impl QueryKey for str {
  fn cache_key(&self) -> String {
    self.to_string()
  }
}

impl QueryKey for String {
  fn cache_key(&self) -> String {
    self.clone()
  }
}

impl<K: QueryKey + ?Sized> QueryKey for &K {
  fn cache_key(&self) -> String {
    (**self).cache_key()
  }

  fn description(&self) -> String {
    (**self).description()
  }
}

/// HTTP method used to reach a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
}

/// Data sources exposed by the billing backend's merchant API.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingQueryKey {
  /// Subscription plans matching a search body
  PlanList { filter: Value },
  PlanDetail { plan_id: u64 },
  /// Billable metrics
  MetricList,
  DiscountCodeList { page: u32, count: u32 },
  /// Invoices matching a search body
  InvoiceList { filter: Value },
  InvoiceDetail { invoice_id: String },
  PaymentList { page: u32, count: u32 },
  RefundList { payment_id: String },
  WebhookEndpoints,
  TeamMembers,
  MerchantProfile,
  AppConfig,
}

impl BillingQueryKey {
  /// Request path relative to the API base URL, including the query string.
  pub fn path(&self) -> String {
    match self {
      Self::PlanList { .. } => "/merchant/plan/list".to_string(),
      Self::PlanDetail { plan_id } => format!("/merchant/plan/detail?planId={}", plan_id),
      Self::MetricList => "/merchant/metric/list".to_string(),
      Self::DiscountCodeList { page, count } => {
        format!("/merchant/discount/list?page={}&count={}", page, count)
      }
      Self::InvoiceList { .. } => "/merchant/invoice/list".to_string(),
      Self::InvoiceDetail { invoice_id } => {
        format!("/merchant/invoice/detail?invoiceId={}", invoice_id)
      }
      Self::PaymentList { page, count } => {
        format!("/merchant/payment/list?page={}&count={}", page, count)
      }
      Self::RefundList { payment_id } => {
        format!("/merchant/payment/refund/list?paymentId={}", payment_id)
      }
      Self::WebhookEndpoints => "/merchant/webhook/endpoint_list".to_string(),
      Self::TeamMembers => "/merchant/member/list".to_string(),
      Self::MerchantProfile => "/merchant/get".to_string(),
      Self::AppConfig => "/merchant/config/get".to_string(),
    }
  }

  /// JSON body sent with the request, for searches.
  pub fn body(&self) -> Option<&Value> {
    match self {
      Self::PlanList { filter } | Self::InvoiceList { filter } => Some(filter),
      _ => None,
    }
  }

  pub fn method(&self) -> Method {
    if self.body().is_some() {
      Method::Post
    } else {
      Method::Get
    }
  }
}

impl QueryKey for BillingQueryKey {
  fn cache_key(&self) -> String {
    match self.body() {
      Some(body) => format!("{}#{}", self.path(), body_hash(body)),
      None => self.path(),
    }
  }

  fn description(&self) -> String {
    match self {
      Self::PlanList { .. } => "plans".to_string(),
      Self::PlanDetail { plan_id } => format!("plan {}", plan_id),
      Self::MetricList => "billable metrics".to_string(),
      Self::DiscountCodeList { page, .. } => format!("discount codes (page {})", page),
      Self::InvoiceList { .. } => "invoices".to_string(),
      Self::InvoiceDetail { invoice_id } => format!("invoice {}", invoice_id),
      Self::PaymentList { page, .. } => format!("payments (page {})", page),
      Self::RefundList { payment_id } => format!("refunds for payment {}", payment_id),
      Self::WebhookEndpoints => "webhook endpoints".to_string(),
      Self::TeamMembers => "team members".to_string(),
      Self::MerchantProfile => "merchant profile".to_string(),
      Self::AppConfig => "app configuration".to_string(),
    }
  }
}

/// SHA256 of the body's canonical JSON form.
///
/// `serde_json` objects keep keys sorted, so equal bodies hash equally
/// regardless of the order fields were inserted in.
fn body_hash(body: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body.to_string().as_bytes());
  hex::encode(hasher.finalize())
}
