//! # Test Utilities
//!
//! Mock control port servers, response builders and canned fixtures for
//! testing code built on this crate.
//!
//! Enable this module with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! tor-request = { version = "0.1", features = ["test-utils"] }
//! ```
//!
//! ## Mock Server
//!
//! ```rust,ignore
//! use tor_request::test_utils::{fixtures, MockControlServer};
//! use tor_request::{ControlPortConfig, TorControlPort};
//!
//! #[tokio::test]
//! async fn renews() {
//!     let server = MockControlServer::reply(fixtures::renewal_ok_response()).await.unwrap();
//!     let control = TorControlPort::new(server.control_config());
//!     control.renew_session().await.unwrap();
//! }
//! ```

use crate::config::ControlPortConfig;

use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned control port replies.
pub mod fixtures {
    /// Reply to `authenticate`, `signal newnym`, `quit` when all succeed.
    pub fn renewal_ok_response() -> &'static str {
        "250 OK\r\n250 OK\r\n250 closing connection\r\n"
    }

    /// Reply when the password is wrong; Tor hangs up right after.
    pub fn bad_auth_response() -> &'static str {
        "515 Bad authentication\r\n"
    }

    /// Reply when authentication works but the signal is refused.
    pub fn signal_rejected_response() -> &'static str {
        "250 OK\r\n552 Unrecognized signal code \"newnym\"\r\n250 closing connection\r\n"
    }

    /// The payload a renewal with an empty password writes.
    pub fn renewal_request_empty_password() -> &'static str {
        "authenticate \"\"\nsignal newnym\nquit\n"
    }
}

/// Control port reply builder.
#[derive(Debug, Clone, Default)]
pub struct MockTorResponse {
    lines: Vec<String>,
}

impl MockTorResponse {
    /// Create a new empty response builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a single `250 OK`.
    pub fn ok() -> Self {
        Self::new().line(250, "OK")
    }

    /// Start with an error line.
    pub fn error(code: u16, message: &str) -> Self {
        Self::new().line(code, message)
    }

    /// Append a status line.
    pub fn line(mut self, code: u16, text: &str) -> Self {
        self.lines.push(format!("{} {}", code, text));
        self
    }

    /// Append Tor's reply to `quit`.
    pub fn closing(self) -> Self {
        self.line(250, "closing connection")
    }

    /// Build the response as a CRLF-terminated string.
    pub fn build(&self) -> String {
        self.lines.iter().map(|l| format!("{}\r\n", l)).collect()
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Reply(String),
    Reset,
    Silent,
}

/// A one-connection stand-in for Tor's control port on 127.0.0.1.
pub struct MockControlServer {
    addr: SocketAddr,
    received: Arc<Mutex<String>>,
    task: JoinHandle<()>,
}

impl MockControlServer {
    /// Answer with `reply` once `quit` arrives, then close.
    pub async fn reply(reply: impl Into<String>) -> io::Result<Self> {
        Self::start(Behaviour::Reply(reply.into())).await
    }

    /// Reset the connection as soon as the client writes, without replying.
    pub async fn reset() -> io::Result<Self> {
        Self::start(Behaviour::Reset).await
    }

    /// Read everything but never answer or close.
    pub async fn silent() -> io::Result<Self> {
        Self::start(Behaviour::Silent).await
    }

    async fn start(behaviour: Behaviour) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(String::new()));

        let sink = received.clone();
        let task = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = serve(stream, behaviour, sink).await;
            }
        });

        Ok(Self {
            addr,
            received,
            task,
        })
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Control port settings pointing at this server.
    pub fn control_config(&self) -> ControlPortConfig {
        ControlPortConfig::new()
            .host(self.addr.ip().to_string())
            .port(self.addr.port())
    }

    /// Everything the client has written so far.
    pub fn received(&self) -> String {
        self.received.lock().clone()
    }
}

impl Drop for MockControlServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    behaviour: Behaviour,
    received: Arc<Mutex<String>>,
) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n > 0 {
            received.lock().push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        let quit = saw_quit(&received.lock());

        match &behaviour {
            Behaviour::Reset if n > 0 => {
                stream.set_linger(Some(Duration::ZERO))?;
                return Ok(());
            }
            Behaviour::Reply(reply) if n == 0 || quit => {
                stream.write_all(reply.as_bytes()).await?;
                stream.shutdown().await?;
                return Ok(());
            }
            Behaviour::Silent if n == 0 => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }
            _ if n == 0 => return Ok(()),
            _ => {}
        }
    }
}

fn saw_quit(received: &str) -> bool {
    received.lines().any(|line| line.trim().eq_ignore_ascii_case("quit"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_ok() {
        assert_eq!(MockTorResponse::ok().build(), "250 OK\r\n");
    }

    #[test]
    fn test_mock_response_renewal() {
        let response = MockTorResponse::ok().line(250, "OK").closing();
        assert_eq!(response.build(), fixtures::renewal_ok_response());
    }

    #[test]
    fn test_mock_response_error() {
        let response = MockTorResponse::error(515, "Bad authentication");
        assert_eq!(response.build(), fixtures::bad_auth_response());
    }

    #[test]
    fn test_saw_quit() {
        assert!(saw_quit("authenticate \"\"\nsignal newnym\nquit\n"));
        assert!(!saw_quit("authenticate \"quit\"\n"));
    }
}
