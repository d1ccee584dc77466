//! Invoices as sent by the backend, and the invoice editor's derived totals.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use super::currency::{CurrencyTable, MoneyError};

/// One invoice line. Amounts are minor units until the invoice is normalized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
  /// Falls back to the invoice currency when absent
  #[serde(default)]
  pub currency: Option<String>,
  #[serde(default)]
  pub amount: Decimal,
  #[serde(default)]
  pub amount_excluding_tax: Decimal,
  #[serde(default)]
  pub tax: Decimal,
  #[serde(default)]
  pub unit_amount_excluding_tax: Decimal,
  #[serde(default)]
  pub quantity: u32,
  /// Wire percentage, `1000` is 10%
  #[serde(default)]
  pub tax_percentage: i64,
  #[serde(default)]
  pub description: String,
}

/// Invoice detail. Amounts are minor units until normalized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
  #[serde(default)]
  pub invoice_id: String,
  #[serde(default)]
  pub invoice_name: String,
  pub currency: String,
  #[serde(default)]
  pub subscription_amount: Decimal,
  #[serde(default)]
  pub tax_amount: Decimal,
  #[serde(default)]
  pub total_amount: Decimal,
  #[serde(default)]
  pub tax_percentage: i64,
  #[serde(default)]
  pub status: i32,
  #[serde(default)]
  pub lines: Vec<InvoiceLine>,
}

/// Convert every monetary field of `invoice` and its lines to major units, in place.
///
/// This is not idempotent: a second call divides by the stripe factor again.
/// Prefer `NormalizedInvoice::from_wire`, which makes a second call impossible.
/// If any currency is unknown the invoice is left untouched.
pub fn normalize_invoice_lines(
  invoice: &mut Invoice,
  table: &CurrencyTable,
) -> Result<(), MoneyError> {
  // Resolve every currency up front so a failure cannot leave a half-converted invoice
  table.lookup(&invoice.currency)?;
  for line in &invoice.lines {
    table.lookup(line.currency.as_deref().unwrap_or(&invoice.currency))?;
  }

  let currency = invoice.currency.clone();
  invoice.subscription_amount = table.scale_down(invoice.subscription_amount, &currency)?;
  invoice.tax_amount = table.scale_down(invoice.tax_amount, &currency)?;
  invoice.total_amount = table.scale_down(invoice.total_amount, &currency)?;

  for line in &mut invoice.lines {
    let currency = line.currency.clone().unwrap_or_else(|| currency.clone());
    line.amount = table.scale_down(line.amount, &currency)?;
    line.amount_excluding_tax = table.scale_down(line.amount_excluding_tax, &currency)?;
    line.tax = table.scale_down(line.tax, &currency)?;
    line.unit_amount_excluding_tax = table.scale_down(line.unit_amount_excluding_tax, &currency)?;
  }
  Ok(())
}

/// An invoice whose amounts are in major units.
///
/// The only way to build one is from a wire invoice, which is consumed, and it
/// gives out no mutable access, so a fetched invoice is normalized exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInvoice(Invoice);

impl NormalizedInvoice {
  pub fn from_wire(mut invoice: Invoice, table: &CurrencyTable) -> Result<Self, MoneyError> {
    normalize_invoice_lines(&mut invoice, table)?;
    Ok(Self(invoice))
  }

  pub fn invoice(&self) -> &Invoice {
    &self.0
  }
}

impl Deref for NormalizedInvoice {
  type Target = Invoice;

  fn deref(&self) -> &Invoice {
    &self.0
  }
}

/// A line typed into the invoice editor, in major units.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraftLine {
  pub description: String,
  pub unit_amount_excluding_tax: Decimal,
  pub quantity: u32,
}

/// Totals derived from draft lines, in minor units ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceTotals {
  pub currency: String,
  /// Wire tax percentage the totals were computed with
  pub tax_percentage: i64,
  pub lines: Vec<InvoiceLineTotals>,
  pub subtotal: i64,
  pub tax: i64,
  pub total: i64,
}

/// Per-line minor-unit amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLineTotals {
  pub description: String,
  pub unit_amount_excluding_tax: i64,
  pub quantity: u32,
  pub amount_excluding_tax: i64,
  pub tax: i64,
  pub amount: i64,
}

impl InvoiceTotals {
  /// Major-unit subtotal, tax and total for display.
  pub fn display(&self, table: &CurrencyTable) -> Result<(Decimal, Decimal, Decimal), MoneyError> {
    Ok((
      table.to_display(self.subtotal, &self.currency)?,
      table.to_display(self.tax, &self.currency)?,
      table.to_display(self.total, &self.currency)?,
    ))
  }
}

/// Derive line amounts, tax and totals for the invoice editor.
///
/// Each unit price is converted to minor units once; everything after that is
/// integer arithmetic. Tax is computed per line at `tax_percentage` (wire
/// scale, `1000` = 10%) and rounded half away from zero.
pub fn derive_invoice_totals(
  lines: &[InvoiceDraftLine],
  tax_percentage: i64,
  currency: &str,
  table: &CurrencyTable,
) -> Result<InvoiceTotals, MoneyError> {
  let mut derived = Vec::with_capacity(lines.len());
  let (mut subtotal, mut tax, mut total) = (0i64, 0i64, 0i64);

  for line in lines {
    let unit = table.to_raw(line.unit_amount_excluding_tax, currency)?;
    let amount_excluding_tax = unit
      .checked_mul(i64::from(line.quantity))
      .ok_or_else(|| overflow(line.unit_amount_excluding_tax, currency))?;
    let line_tax = tax_on(amount_excluding_tax, tax_percentage, currency)?;
    let amount = amount_excluding_tax
      .checked_add(line_tax)
      .ok_or_else(|| overflow(line.unit_amount_excluding_tax, currency))?;

    subtotal = checked_sum(subtotal, amount_excluding_tax, currency)?;
    tax = checked_sum(tax, line_tax, currency)?;
    total = checked_sum(total, amount, currency)?;

    derived.push(InvoiceLineTotals {
      description: line.description.clone(),
      unit_amount_excluding_tax: unit,
      quantity: line.quantity,
      amount_excluding_tax,
      tax: line_tax,
      amount,
    });
  }

  Ok(InvoiceTotals {
    currency: currency.to_string(),
    tax_percentage,
    lines: derived,
    subtotal,
    tax,
    total,
  })
}

fn tax_on(amount: i64, tax_percentage: i64, currency: &str) -> Result<i64, MoneyError> {
  let exact = Decimal::from(amount) * Decimal::from(tax_percentage) / Decimal::from(10_000);
  exact
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
    .ok_or_else(|| overflow(exact, currency))
}

fn checked_sum(acc: i64, value: i64, currency: &str) -> Result<i64, MoneyError> {
  acc
    .checked_add(value)
    .ok_or_else(|| overflow(Decimal::from(acc), currency))
}

fn overflow(amount: Decimal, currency: &str) -> MoneyError {
  MoneyError::Overflow {
    amount,
    unit: currency.to_string(),
  }
}
