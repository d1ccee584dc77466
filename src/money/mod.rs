//! Monetary amount normalizer.
//!
//! The backend sends every amount as an integer in the currency's minor unit
//! (cents for USD, whole yen for JPY). Views work in major units. Conversion
//! goes through a single currency table and must happen exactly once in each
//! direction: dividing twice shrinks an amount by the stripe factor again, and
//! forgetting to divide shows cents as dollars.
//!
//! Percentages (discount, tax) use a fixed x100 wire scale that does not
//! depend on the currency: `2500` on the wire is `25%`.

mod amount;
mod analytics;
mod currency;
mod discount;
mod invoice;
mod plan;

pub use amount::{
  format_amount, percentage_to_display, percentage_to_raw, to_display, to_raw, MonetaryAmount,
};
pub use analytics::RevenueRollup;
pub use currency::{CurrencySpec, CurrencyTable, MoneyError};
pub use discount::{DiscountCode, DiscountForm, DiscountType};
pub use invoice::{
  derive_invoice_totals, normalize_invoice_lines, Invoice, InvoiceDraftLine, InvoiceLine,
  InvoiceLineTotals, InvoiceTotals, NormalizedInvoice,
};
pub use plan::{prorate, NormalizedPlan, Plan};
