//! # tor-request
//!
//! Send HTTP requests through Tor's SOCKS proxy and ask Tor for a new
//! identity through its control port.
//!
//! Every request gets its own SOCKS agent, built from the current proxy
//! defaults and closed as soon as the request settles, whether it
//! succeeded or failed. Session renewal authenticates to the control port,
//! sends `SIGNAL NEWNYM`, and checks that Tor acknowledged every command.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tor_request::{tor_request, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Requests go through the SOCKS proxy at localhost:9050 by default
//!     let client = tor_request();
//!     let ip = client.get("https://api.ipify.org").await?;
//!     println!("Exit IP: {}", ip);
//!     Ok(())
//! }
//! ```
//!
//! ## Requests with options
//!
//! ```rust,no_run
//! use tor_request::{tor_request, RequestOptions};
//!
//! # async fn example() -> tor_request::Result<()> {
//! let client = tor_request();
//! let body = client
//!     .post((
//!         "https://httpbin.org/post",
//!         RequestOptions::default()
//!             .header("Content-Type", "application/json")
//!             .body(r#"{"hello":"tor"}"#),
//!     ))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Changing the proxy
//!
//! ```rust,no_run
//! // Tor Browser listens on 9150 instead of 9050
//! tor_request::set_tor_address("127.0.0.1", 9150);
//! ```
//!
//! ## New identity
//!
//! Enable the control port in `torrc` and set a hashed password
//! (`tor --hash-password <password>`):
//!
//! ```text
//! ControlPort 9051
//! HashedControlPassword 16:...
//! ```
//!
//! ```rust,no_run
//! use tor_request::{renew_tor_session, TorControlPort};
//!
//! # async fn example() -> tor_request::Result<()> {
//! TorControlPort::global().set_password("my password");
//! let message = renew_tor_session().await?;
//! println!("{}", message);
//! # Ok(())
//! # }
//! ```
//!
//! ## Certificates
//!
//! Agents do not reject invalid TLS certificates, since exit nodes and onion
//! services often present ones that do not validate. Verify certificates
//! yourself if you need strict validation.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod agent;
pub mod config;
pub mod control;
pub mod error;
pub mod protocol;
pub mod request;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types for convenience
pub use error::{Result, StatusCode, TorRequestError};

pub use agent::{
    create_agent, is_tls_target, AgentFactory, AgentHandle, EncryptedSocket,
    ReqwestSocksConnector, SocksConnector, REJECT_UNAUTHORIZED,
};
pub use config::{
    build_proxy_config, set_tor_address, ControlPortConfig, ProxyConfig, ProxyDefaults,
    ProxyType,
};
pub use control::{new_tor_session, renew_tor_session, TorControlPort};
pub use protocol::{ControlResponse, ReplyLine, RENEWAL_SUCCESS_MESSAGE};
pub use request::{
    init_params, request, tor_request, HttpExecutor, RequestOptions, RequestParams,
    ReqwestExecutor, TorRequest, Verb,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
