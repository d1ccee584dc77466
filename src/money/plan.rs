//! Subscription plan prices.

use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::currency::{CurrencyTable, MoneyError};

/// A plan as sent by the backend. `amount` is in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
  pub id: u64,
  #[serde(default)]
  pub plan_name: String,
  pub amount: i64,
  pub currency: String,
  #[serde(default)]
  pub interval_unit: String,
  #[serde(default)]
  pub interval_count: u32,
  #[serde(default)]
  pub status: i32,
  /// 1 = main plan, 2 = add-on
  #[serde(default, rename = "type")]
  pub plan_type: i32,
}

impl Plan {
  /// Set the price from a major-unit value typed into the plan editor.
  pub fn set_display_amount(
    &mut self,
    display: Decimal,
    table: &CurrencyTable,
  ) -> Result<(), MoneyError> {
    self.amount = table.to_raw(display, &self.currency)?;
    Ok(())
  }
}

/// A plan paired with its display price. The wire amount is kept untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPlan {
  pub plan: Plan,
  pub display_amount: Decimal,
  /// e.g. `$9.99`
  pub formatted: String,
}

impl NormalizedPlan {
  pub fn from_wire(plan: Plan, table: &CurrencyTable) -> Result<Self, MoneyError> {
    let display_amount = table.to_display(plan.amount, &plan.currency)?;
    let formatted = table.format_amount(plan.amount, &plan.currency)?;
    Ok(Self {
      plan,
      display_amount,
      formatted,
    })
  }
}

/// Share of `amount` (minor units) owed for the `remaining` part of a billing `period`.
///
/// `remaining` is clamped to `0..=period`. Returns `None` for an empty period.
pub fn prorate(amount: i64, remaining: Duration, period: Duration) -> Option<i64> {
  let period = period.num_seconds();
  if period <= 0 {
    return None;
  }
  let remaining = remaining.num_seconds().clamp(0, period);
  (Decimal::from(amount) * Decimal::from(remaining) / Decimal::from(period))
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
}
