//! Discount codes: either a percentage off or a fixed amount off.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amount::{percentage_to_display, percentage_to_raw};
use super::currency::{CurrencyTable, MoneyError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiscountType {
  #[default]
  Percentage,
  FixedAmount,
}

impl TryFrom<u8> for DiscountType {
  type Error = String;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      1 => Ok(Self::Percentage),
      2 => Ok(Self::FixedAmount),
      other => Err(format!("unknown discount type {}", other)),
    }
  }
}

impl From<DiscountType> for u8 {
  fn from(value: DiscountType) -> Self {
    match value {
      DiscountType::Percentage => 1,
      DiscountType::FixedAmount => 2,
    }
  }
}

/// A discount code as sent by the backend.
///
/// `discount_percentage` is on the x100 wire scale, `discount_amount` in the
/// minor units of `currency`. Only the field matching `discount_type` is used.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
  #[serde(default)]
  pub id: u64,
  pub code: String,
  #[serde(default)]
  pub name: String,
  /// 1 = one-time, 2 = recurring
  #[serde(default)]
  pub billing_type: i32,
  pub discount_type: DiscountType,
  #[serde(default)]
  pub discount_amount: i64,
  #[serde(default)]
  pub discount_percentage: i64,
  #[serde(default)]
  pub currency: String,
  #[serde(default)]
  pub cycle_limit: i32,
}

/// The editable part of a discount code, in display units.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscountForm {
  pub discount_type: DiscountType,
  /// Percent off, e.g. `25` for 25%
  pub percentage: Option<Decimal>,
  /// Major-unit amount off
  pub amount: Option<Decimal>,
  pub currency: Option<String>,
}

impl DiscountForm {
  pub fn from_wire(code: &DiscountCode, table: &CurrencyTable) -> Result<Self, MoneyError> {
    let currency = Some(code.currency.clone()).filter(|c| !c.is_empty());
    match code.discount_type {
      DiscountType::Percentage => Ok(Self {
        discount_type: DiscountType::Percentage,
        percentage: Some(percentage_to_display(code.discount_percentage)),
        amount: None,
        currency,
      }),
      DiscountType::FixedAmount => Ok(Self {
        discount_type: DiscountType::FixedAmount,
        percentage: None,
        amount: Some(table.to_display(code.discount_amount, &code.currency)?),
        currency,
      }),
    }
  }

  /// Toggle between percentage and fixed amount, dropping the other value.
  pub fn switch_type(&mut self, discount_type: DiscountType) {
    if self.discount_type == discount_type {
      return;
    }
    self.discount_type = discount_type;
    self.percentage = None;
    self.amount = None;
  }

  /// Write the form back onto `code` in wire units. Empty values count as zero.
  ///
  /// A fixed amount without a currency fails like an unknown currency.
  pub fn apply_to(&self, code: &mut DiscountCode, table: &CurrencyTable) -> Result<(), MoneyError> {
    let currency = self.currency.clone().unwrap_or_default();
    let (amount, percentage) = match self.discount_type {
      DiscountType::Percentage => (0, percentage_to_raw(self.percentage.unwrap_or_default())?),
      DiscountType::FixedAmount => (table.to_raw(self.amount.unwrap_or_default(), &currency)?, 0),
    };
    code.discount_type = self.discount_type;
    code.discount_amount = amount;
    code.discount_percentage = percentage;
    code.currency = currency;
    Ok(())
  }
}
