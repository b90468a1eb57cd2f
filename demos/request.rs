//! Example: HTTP through Tor
//!
//! Fetches the exit IP through the local Tor SOCKS proxy and asks
//! check.torproject.org whether the request arrived over Tor.
//!
//! Run with: cargo run --example request
//! Optionally pass the SOCKS port: cargo run --example request -- 9150

use tor_request::{set_tor_address, tor_request, RequestOptions, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    if let Some(port) = std::env::args().nth(1).and_then(|p| p.parse().ok()) {
        set_tor_address("localhost", port);
    }

    let client = tor_request();

    println!("Fetching exit IP through Tor...");
    let ip = client.get("https://api.ipify.org").await?;
    println!("Exit IP: {}", ip);

    let check = client
        .get((
            "https://check.torproject.org/api/ip",
            RequestOptions::default().header("Accept", "application/json"),
        ))
        .await?;
    println!("check.torproject.org says: {}", check);

    Ok(())
}
