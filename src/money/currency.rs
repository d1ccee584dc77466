//! Currency table: the only source of truth for minor-unit scaling.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::error;

/// Failures of amount conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
  /// The code is not in the currency table. There is no fallback currency.
  #[error("unknown currency '{0}'")]
  UnknownCurrency(String),
  /// The converted amount does not fit an i64 of minor units.
  #[error("amount {amount} {unit} is out of range")]
  Overflow { amount: Decimal, unit: String },
}

/// Scaling rules for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySpec {
  pub symbol: String,
  /// Minor units per major unit (100 cents per dollar)
  pub stripe_factor: u32,
  /// Decimal places allowed in major units; `None` means no enforced rounding
  #[serde(default)]
  pub decimal_places: Option<u32>,
}

impl CurrencySpec {
  pub fn new(symbol: &str, stripe_factor: u32, decimal_places: Option<u32>) -> Self {
    Self {
      symbol: symbol.to_string(),
      stripe_factor,
      decimal_places,
    }
  }

  pub(crate) fn factor(&self) -> Decimal {
    Decimal::from(self.stripe_factor)
  }
}

static BUILTIN: LazyLock<CurrencyTable> = LazyLock::new(CurrencyTable::builtin);

/// Mapping from currency code to scaling rules.
///
/// Codes are matched case-insensitively and stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyTable {
  currencies: BTreeMap<String, CurrencySpec>,
}

impl CurrencyTable {
  /// An empty table. Every lookup fails until currencies are inserted.
  pub fn empty() -> Self {
    Self {
      currencies: BTreeMap::new(),
    }
  }

  /// The currencies the billing backend supports out of the box.
  pub fn builtin() -> Self {
    let mut table = Self::empty();
    table.insert("CNY", CurrencySpec::new("¥", 100, Some(2)));
    table.insert("USD", CurrencySpec::new("$", 100, Some(2)));
    table.insert("EUR", CurrencySpec::new("€", 100, Some(2)));
    table.insert("JPY", CurrencySpec::new("¥", 1, Some(0)));
    table.insert("USDT", CurrencySpec::new("₮", 100, None));
    table
  }

  /// Shared instance of the built-in table.
  pub fn global() -> &'static CurrencyTable {
    &BUILTIN
  }

  /// Add or replace a currency.
  pub fn insert(&mut self, code: &str, spec: CurrencySpec) {
    self.currencies.insert(normalize_code(code), spec);
  }

  /// Merge extra currencies over this table, replacing existing codes.
  pub fn with_overrides<I>(mut self, overrides: I) -> Self
  where
    I: IntoIterator<Item = (String, CurrencySpec)>,
  {
    for (code, spec) in overrides {
      self.insert(&code, spec);
    }
    self
  }

  /// Look up a currency, failing loudly when it is missing.
  pub fn lookup(&self, code: &str) -> Result<&CurrencySpec, MoneyError> {
    self.currencies.get(&normalize_code(code)).ok_or_else(|| {
      error!(currency = code, "unknown currency in amount conversion");
      MoneyError::UnknownCurrency(code.to_string())
    })
  }

  pub fn contains(&self, code: &str) -> bool {
    self.currencies.contains_key(&normalize_code(code))
  }

  /// Known codes, sorted.
  pub fn codes(&self) -> impl Iterator<Item = &str> {
    self.currencies.keys().map(String::as_str)
  }
}

impl Default for CurrencyTable {
  fn default() -> Self {
    Self::builtin()
  }
}

fn normalize_code(code: &str) -> String {
  code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builtin_factors() {
    let table = CurrencyTable::builtin();
    for code in ["CNY", "USD", "EUR"] {
      let spec = table.lookup(code).unwrap();
      assert_eq!(spec.stripe_factor, 100);
      assert_eq!(spec.decimal_places, Some(2));
    }
    assert_eq!(table.lookup("JPY").unwrap().stripe_factor, 1);
    assert_eq!(table.lookup("JPY").unwrap().decimal_places, Some(0));
    assert_eq!(table.lookup("USDT").unwrap().stripe_factor, 100);
    assert_eq!(table.lookup("USDT").unwrap().decimal_places, None);
  }

  #[test]
  fn test_lookup_is_case_insensitive() {
    assert_eq!(CurrencyTable::global().lookup("usd").unwrap().symbol, "$");
  }

  #[test]
  fn test_unknown_currency_fails() {
    assert_eq!(
      CurrencyTable::global().lookup("XXX"),
      Err(MoneyError::UnknownCurrency("XXX".to_string()))
    );
    assert!(CurrencyTable::empty().lookup("USD").is_err());
  }

  #[test]
  fn test_overrides_extend_without_code_change() {
    let table = CurrencyTable::builtin().with_overrides([
      ("gbp".to_string(), CurrencySpec::new("£", 100, Some(2))),
      ("JPY".to_string(), CurrencySpec::new("円", 1, Some(0))),
    ]);
    assert!(table.contains("GBP"));
    assert_eq!(table.lookup("JPY").unwrap().symbol, "円");
    assert_eq!(
      table.codes().collect::<Vec<_>>(),
      vec!["CNY", "EUR", "GBP", "JPY", "USD", "USDT"]
    );
  }

  #[test]
  fn test_currency_spec_from_yaml() {
    let spec: CurrencySpec = serde_yaml::from_str("symbol: \"£\"\nstripe_factor: 100\n").unwrap();
    assert_eq!(spec, CurrencySpec::new("£", 100, None));
  }
}
