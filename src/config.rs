use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::money::{CurrencySpec, CurrencyTable};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Currency used by `convert` when none is given
  pub default_currency: Option<String>,
  /// Extra currencies, or replacements for built-in ones
  #[serde(default)]
  pub currencies: BTreeMap<String, CurrencySpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the billing backend, e.g. `https://api.example.com`
  pub url: String,
  /// Transport timeout for every request
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./merchant-console.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/merchant-console/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/merchant-console/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("merchant-console.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("merchant-console").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse and validate configuration text.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.currency_table()?;
    Ok(config)
  }

  /// Built-in currencies merged with the configured ones.
  pub fn currency_table(&self) -> Result<CurrencyTable> {
    if let Some((code, _)) = self.currencies.iter().find(|(_, spec)| spec.stripe_factor == 0) {
      return Err(eyre!("Currency {} has a stripe_factor of 0", code));
    }

    let table = CurrencyTable::builtin().with_overrides(self.currencies.clone());
    if let Some(code) = &self.default_currency {
      if !table.contains(code) {
        return Err(eyre!("default_currency {} is not a known currency", code));
      }
    }
    Ok(table)
  }

  /// Get the billing API key from environment variables.
  ///
  /// Checks MERCHANT_CONSOLE_API_KEY first, then BILLING_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("MERCHANT_CONSOLE_API_KEY")
      .or_else(|_| std::env::var("BILLING_API_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set MERCHANT_CONSOLE_API_KEY or BILLING_API_KEY environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config() {
    let config = Config::from_yaml("api:\n  url: https://billing.example.com\n").unwrap();
    assert_eq!(config.api.url, "https://billing.example.com");
    assert_eq!(config.api.timeout_secs, 30);
    assert!(config.currencies.is_empty());
    assert!(config.currency_table().unwrap().contains("USD"));
  }

  #[test]
  fn test_extra_currency() {
    let config = Config::from_yaml(
      r#"
api:
  url: https://billing.example.com
  timeout_secs: 5
default_currency: GBP
currencies:
  GBP:
    symbol: "£"
    stripe_factor: 100
    decimal_places: 2
"#,
    )
    .unwrap();
    let table = config.currency_table().unwrap();
    assert_eq!(table.lookup("GBP").unwrap().symbol, "£");
    assert_eq!(config.api.timeout_secs, 5);
  }

  #[test]
  fn test_unknown_default_currency_rejected() {
    let err = Config::from_yaml("api:\n  url: http://x\ndefault_currency: XXX\n").unwrap_err();
    assert!(err.to_string().contains("XXX"));
  }

  #[test]
  fn test_zero_factor_rejected() {
    let result = Config::from_yaml(
      "api:\n  url: http://x\ncurrencies:\n  BAD:\n    symbol: B\n    stripe_factor: 0\n",
    );
    assert!(result.is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/merchant-console.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
