use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::currency::{CurrencyTable, MoneyError};

const PERCENT_SCALE: Decimal = Decimal::ONE_HUNDRED;

impl CurrencyTable {
  /// Minor units from the backend to a major-unit display value.
  pub fn to_display(&self, raw: i64, currency: &str) -> Result<Decimal, MoneyError> {
    self.scale_down(Decimal::from(raw), currency)
  }

  /// Divide an already decoded amount by the currency's stripe factor.
  pub(crate) fn scale_down(&self, amount: Decimal, currency: &str) -> Result<Decimal, MoneyError> {
    let spec = self.lookup(currency)?;
    amount
      .checked_div(spec.factor())
      .ok_or_else(|| overflow(amount, currency))
  }

  /// Major-unit display value back to minor units for submission.
  ///
  /// The value is first rounded to the currency's decimal places (half away
  /// from zero), then scaled and rounded to a whole number of minor units.
  pub fn to_raw(&self, display: Decimal, currency: &str) -> Result<i64, MoneyError> {
    let spec = self.lookup(currency)?;
    let clamped = match spec.decimal_places {
      Some(places) => display.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
      None => display,
    };
    clamped
      .checked_mul(spec.factor())
      .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
      .and_then(|scaled| scaled.to_i64())
      .ok_or_else(|| overflow(display, currency))
  }

  /// Render minor units as `-$1.00` style text.
  pub fn format_amount(&self, raw: i64, currency: &str) -> Result<String, MoneyError> {
    let spec = self.lookup(currency)?;
    let value = self.scale_down(Decimal::from(raw.unsigned_abs()), currency)?;
    let sign = if raw < 0 { "-" } else { "" };
    let digits = match spec.decimal_places {
      Some(places) => format!("{:.*}", places as usize, value),
      None => value.normalize().to_string(),
    };
    Ok(format!("{}{}{}", sign, spec.symbol, digits))
  }
}

/// `to_display` against the built-in currency table.
pub fn to_display(raw: i64, currency: &str) -> Result<Decimal, MoneyError> {
  CurrencyTable::global().to_display(raw, currency)
}

/// `to_raw` against the built-in currency table.
pub fn to_raw(display: Decimal, currency: &str) -> Result<i64, MoneyError> {
  CurrencyTable::global().to_raw(display, currency)
}

/// `format_amount` against the built-in currency table.
pub fn format_amount(raw: i64, currency: &str) -> Result<String, MoneyError> {
  CurrencyTable::global().format_amount(raw, currency)
}

/// Wire percentage (`1000`) to display percentage (`10`).
pub fn percentage_to_display(wire: i64) -> Decimal {
  Decimal::from(wire) / PERCENT_SCALE
}

/// Display percentage (`10`) to wire percentage (`1000`).
pub fn percentage_to_raw(display: Decimal) -> Result<i64, MoneyError> {
  display
    .checked_mul(PERCENT_SCALE)
    .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
    .and_then(|scaled| scaled.to_i64())
    .ok_or_else(|| overflow(display, "%"))
}

fn overflow(amount: Decimal, unit: &str) -> MoneyError {
  MoneyError::Overflow {
    amount,
    unit: unit.to_string(),
  }
}

/// A backend amount: minor units paired with the currency they are counted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryAmount {
  pub raw: i64,
  pub currency: String,
}

impl MonetaryAmount {
  pub fn new(raw: i64, currency: &str) -> Self {
    Self {
      raw,
      currency: currency.to_string(),
    }
  }

  /// Build from a major-unit value entered by a user.
  pub fn from_display(
    display: Decimal,
    currency: &str,
    table: &CurrencyTable,
  ) -> Result<Self, MoneyError> {
    Ok(Self::new(table.to_raw(display, currency)?, currency))
  }

  pub fn display(&self, table: &CurrencyTable) -> Result<Decimal, MoneyError> {
    table.to_display(self.raw, &self.currency)
  }

  pub fn format(&self, table: &CurrencyTable) -> Result<String, MoneyError> {
    table.format_amount(self.raw, &self.currency)
  }
}
