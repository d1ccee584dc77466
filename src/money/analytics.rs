//! Per-currency revenue totals for the dashboard.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::amount::MonetaryAmount;
use super::currency::{CurrencyTable, MoneyError};

/// Running totals in minor units, one per currency.
///
/// Amounts are summed as integers and converted for display only at the end,
/// so rounding never accumulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevenueRollup {
  totals: BTreeMap<String, i64>,
  count: usize,
}

impl RevenueRollup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add one payment. Unknown currencies are rejected before anything is summed.
  pub fn add(&mut self, amount: &MonetaryAmount, table: &CurrencyTable) -> Result<(), MoneyError> {
    table.lookup(&amount.currency)?;
    let code = amount.currency.trim().to_uppercase();
    let total = self.totals.entry(code).or_insert(0);
    *total = total
      .checked_add(amount.raw)
      .ok_or_else(|| MoneyError::Overflow {
        amount: Decimal::from(amount.raw),
        unit: amount.currency.clone(),
      })?;
    self.count += 1;
    Ok(())
  }

  /// Number of amounts added.
  pub fn count(&self) -> usize {
    self.count
  }

  /// Raw minor-unit total for one currency.
  pub fn raw_total(&self, currency: &str) -> Option<i64> {
    self.totals.get(&currency.trim().to_uppercase()).copied()
  }

  /// Major-unit totals, keyed by currency code.
  pub fn display_totals(&self, table: &CurrencyTable) -> Result<BTreeMap<String, Decimal>, MoneyError> {
    self
      .totals
      .iter()
      .map(|(code, raw)| Ok((code.clone(), table.to_display(*raw, code)?)))
      .collect()
  }

  /// Totals rendered like `$12.00`, keyed by currency code.
  pub fn formatted_totals(&self, table: &CurrencyTable) -> Result<BTreeMap<String, String>, MoneyError> {
    self
      .totals
      .iter()
      .map(|(code, raw)| Ok((code.clone(), table.format_amount(*raw, code)?)))
      .collect()
  }
}
