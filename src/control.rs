//! Tor control port client.
//!
//! A session here is fire-then-drain: connect, write every command in one
//! go, then read until Tor closes the connection. Tor closes after it has
//! processed `quit`, so a command batch must end with `quit` or the read
//! only finishes when a configured response timeout expires.

use crate::config::ControlPortConfig;
use crate::error::{Result, TorRequestError};
use crate::protocol::{format_commands, renewal_commands, ControlResponse, RENEWAL_SUCCESS_MESSAGE};

use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Handle on a Tor control endpoint.
///
/// The endpoint settings are read each time a session starts, so changes
/// apply to the next [`send`](Self::send) or [`renew_session`](Self::renew_session).
#[derive(Debug, Default)]
pub struct TorControlPort {
    config: RwLock<Arc<ControlPortConfig>>,
}

impl TorControlPort {
    /// Create a handle for the given endpoint.
    pub fn new(config: ControlPortConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// The process-wide control port, initially localhost:9051 with no password.
    pub fn global() -> Arc<TorControlPort> {
        static GLOBAL: OnceLock<Arc<TorControlPort>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TorControlPort::default())))
    }

    /// Current endpoint settings.
    pub fn config(&self) -> Arc<ControlPortConfig> {
        Arc::clone(&self.config.read())
    }

    /// Replace the endpoint settings.
    pub fn configure(&self, config: ControlPortConfig) {
        *self.config.write() = Arc::new(config);
    }

    /// Set the password sent by [`renew_session`](Self::renew_session).
    pub fn set_password(&self, password: impl Into<String>) {
        let password = password.into();
        self.update(|config| config.password = password);
    }

    /// Set the control port host.
    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into();
        self.update(|config| config.host = host);
    }

    /// Set the control port number.
    pub fn set_port(&self, port: u16) {
        self.update(|config| config.port = port);
    }

    fn update(&self, change: impl FnOnce(&mut ControlPortConfig)) {
        let mut guard = self.config.write();
        let mut next = ControlPortConfig::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }

    /// Send `commands` in one write and return everything Tor replied with.
    ///
    /// Completes when Tor closes the connection. Socket errors are returned as
    /// [`TorRequestError::ControlConnection`]; there is no retry.
    pub async fn send<S: AsRef<str>>(&self, commands: &[S]) -> Result<String> {
        let config = self.config();
        send_with_config(&config, commands).await
    }

    /// Callback form of [`send`](Self::send); `done` runs exactly once.
    pub async fn send_with_callback<S, F>(&self, commands: &[S], done: F)
    where
        S: AsRef<str>,
        F: FnOnce(Result<String>) + Send,
    {
        done(self.send(commands).await);
    }

    /// Ask Tor for a new identity (`SIGNAL NEWNYM`).
    ///
    /// Every non-blank line of the reply must carry status `250`; otherwise
    /// the error embeds the raw reply.
    pub async fn renew_session(&self) -> Result<&'static str> {
        let config = self.config();
        let commands = renewal_commands(&config.password);

        let data = send_with_config(&config, &commands).await?;
        ControlResponse::new(data).into_result()?;

        debug!("Tor session renewed");
        Ok(RENEWAL_SUCCESS_MESSAGE)
    }
}

async fn send_with_config<S: AsRef<str>>(
    config: &ControlPortConfig,
    commands: &[S],
) -> Result<String> {
    let session = exchange(config, commands);
    match config.response_timeout {
        Some(limit) => tokio::time::timeout(limit, session)
            .await
            .map_err(|_| TorRequestError::Timeout)?,
        None => session.await,
    }
}

async fn exchange<S: AsRef<str>>(config: &ControlPortConfig, commands: &[S]) -> Result<String> {
    let host = config.effective_host();
    let port = config.effective_port();

    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(TorRequestError::ControlConnection)?;
    debug!("Connected to ControlPort at {}:{}", host, port);

    // Commands may carry the password; only their count is logged.
    trace!("Sending {} commands", commands.len());
    stream
        .write_all(format_commands(commands).as_bytes())
        .await
        .map_err(TorRequestError::ControlConnection)?;

    let mut received = Vec::new();
    stream
        .read_to_end(&mut received)
        .await
        .map_err(TorRequestError::ControlConnection)?;
    trace!("ControlPort closed after {} bytes", received.len());

    Ok(String::from_utf8_lossy(&received).into_owned())
}

/// Renew the Tor session through the process-wide control port.
pub async fn renew_tor_session() -> Result<&'static str> {
    TorControlPort::global().renew_session().await
}

/// Alias of [`renew_tor_session`].
pub async fn new_tor_session() -> Result<&'static str> {
    renew_tor_session().await
}
