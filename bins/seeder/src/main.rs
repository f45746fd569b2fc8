//! Database seeder for Tally development and testing.
//!
//! Inserts the standard chart of accounts. Accounts whose code already exists
//! are left untouched, so the seeder can be run repeatedly.
//!
//! Usage: cargo run --bin seeder

use tally_core::account::STANDARD_CHART;
use tally_core::{Ledger, LedgerSettings};
use tally_db::PgLedgerStore;
use tally_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    println!("Connecting to database...");
    let db = tally_db::connect_with(&config.database).await?;

    let settings = LedgerSettings::from_config(&config.ledger, &config.reconciler);
    let ledger = Ledger::new(PgLedgerStore::new(db), settings);

    println!("Seeding chart of accounts...");
    let inserted = ledger.directory().seed(STANDARD_CHART).await?;
    println!(
        "  {inserted} of {} accounts inserted",
        STANDARD_CHART.len()
    );

    let chart = ledger.directory().chart().await?;
    match chart.by_code(&config.ledger.retained_earnings_code) {
        Some(account) => println!("  Retained earnings: {} {}", account.code, account.name),
        None => println!(
            "  Warning: retained earnings account {} not found",
            config.ledger.retained_earnings_code
        ),
    }

    println!("Seeding complete!");
    Ok(())
}
