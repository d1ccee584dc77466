use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

use merchant_console::api::{BillingClient, SyncedBilling};
use merchant_console::cache::KeyedCache;
use merchant_console::config::Config;
use merchant_console::logging;
use merchant_console::money::CurrencyTable;
use merchant_console::sync::{SyncOptions, SyncQuery};

#[derive(Parser, Debug)]
#[command(name = "merchant-console")]
#[command(about = "Inspect billing data with normalized amounts")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/merchant-console/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show an invoice and its lines in display units
  Invoice { id: String },
  /// List plans with their prices
  Plans,
  /// Convert between backend minor units and display units
  Convert {
    amount: Decimal,
    currency: Option<String>,
    /// Treat `amount` as a display value and print minor units
    #[arg(long)]
    to_raw: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.log_stderr)?;

  let config = Config::load(args.config.as_deref())?;
  let table = config.currency_table()?;

  match args.command {
    Command::Convert {
      amount,
      currency,
      to_raw,
    } => {
      let currency = currency
        .or_else(|| config.default_currency.clone())
        .ok_or_else(|| eyre!("No currency given and no default_currency configured"))?;
      convert(&table, amount, &currency, to_raw)
    }
    Command::Invoice { id } => {
      let billing = connect(&config, table)?;
      let mut query = billing.invoice(&id, SyncOptions::new());
      wait_for(&mut query).await?;

      let table = billing.currency_table();
      if let Some(invoice) = query.data() {
        println!("{} ({})", invoice.invoice_id, invoice.currency);
        for line in &invoice.lines {
          println!(
            "  {:<40} {:>4} x {:>12} = {:>12}",
            line.description, line.quantity, line.unit_amount_excluding_tax, line.amount
          );
        }
        let symbol = &table.lookup(&invoice.currency)?.symbol;
        println!("  tax   {}{}", symbol, invoice.tax_amount);
        println!("  total {}{}", symbol, invoice.total_amount);
      }
      Ok(())
    }
    Command::Plans => {
      let billing = connect(&config, table)?;
      let mut query = billing.plans(serde_json::json!({}), SyncOptions::new());
      wait_for(&mut query).await?;

      for plan in query.data().into_iter().flatten() {
        println!(
          "{:>8}  {:<32} {:>12} / {} {}",
          plan.plan.id, plan.plan.plan_name, plan.formatted, plan.plan.interval_count, plan.plan.interval_unit
        );
      }
      Ok(())
    }
  }
}

fn connect(config: &Config, table: CurrencyTable) -> Result<SyncedBilling> {
  let client = BillingClient::new(config)?;
  Ok(SyncedBilling::new(client, KeyedCache::new(), table))
}

fn convert(table: &CurrencyTable, amount: Decimal, currency: &str, to_raw: bool) -> Result<()> {
  if to_raw {
    println!("{}", table.to_raw(amount, currency)?);
  } else {
    if !amount.fract().is_zero() {
      return Err(eyre!("{} is not a whole number of minor units", amount));
    }
    let raw = amount
      .to_i64()
      .ok_or_else(|| eyre!("{} does not fit in minor units", amount))?;
    println!("{}", table.format_amount(raw, currency)?);
  }
  Ok(())
}

/// Poll a query on a tick until its fetch has finished.
async fn wait_for<T, P>(query: &mut SyncQuery<T, P>) -> Result<()>
where
  T: Clone + Send + Sync + 'static,
  P: Send + 'static,
{
  let mut tick = tokio::time::interval(Duration::from_millis(50));
  loop {
    tick.tick().await;
    query.poll();
    if !query.is_loading() {
      break;
    }
  }
  match query.error() {
    Some(error) => Err(eyre!("{}", error)),
    None => Ok(()),
  }
}
