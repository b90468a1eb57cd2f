//! Example: New identity (circuit rotation)
//!
//! Requests a new identity from Tor through the control port and shows the
//! exit IP before and after.
//!
//! Requires `ControlPort 9051` and a `HashedControlPassword` in torrc.
//!
//! Run with: TOR_PASSWORD=secret cargo run --example new_identity

use std::time::Duration;
use tor_request::{renew_tor_session, tor_request, Result, TorControlPort};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    TorControlPort::global().set_password(std::env::var("TOR_PASSWORD").unwrap_or_default());

    let client = tor_request();
    let before = client.get("https://api.ipify.org").await?;
    println!("Exit IP before: {}", before);

    println!("\nRequesting new identity (NEWNYM signal)...");
    println!("{}", renew_tor_session().await?);

    // Tor rate-limits NEWNYM and needs a moment to build fresh circuits
    println!("\nWaiting 10 seconds for circuit changes...");
    tokio::time::sleep(Duration::from_secs(10)).await;

    let after = client.get("https://api.ipify.org").await?;
    println!("Exit IP after: {}", after);

    Ok(())
}
