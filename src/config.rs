//! Proxy and control port configuration.
//!
//! This module holds the SOCKS proxy settings used to build request agents,
//! the process-wide defaults those settings fall back to, and the settings
//! for reaching Tor's control port.

use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Host used when neither the caller nor the defaults name one.
pub const DEFAULT_PROXY_HOST: &str = "localhost";

/// Tor's default SOCKS port.
pub const DEFAULT_PROXY_PORT: u16 = 9050;

/// Host of the control port when none is configured.
pub const DEFAULT_CONTROL_HOST: &str = "localhost";

/// Tor's default control port.
pub const DEFAULT_CONTROL_PORT: u16 = 9051;

/// SOCKS protocol version spoken by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyType {
    /// SOCKS4 (tag 4).
    Socks4,
    /// SOCKS5 (tag 5), what Tor speaks by default.
    #[default]
    Socks5,
}

impl ProxyType {
    /// Parse the numeric scheme tag (`4` or `5`).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            4 => Some(ProxyType::Socks4),
            5 => Some(ProxyType::Socks5),
            _ => None,
        }
    }

    /// The numeric scheme tag.
    pub fn tag(&self) -> u8 {
        match self {
            ProxyType::Socks4 => 4,
            ProxyType::Socks5 => 5,
        }
    }

    /// URL scheme understood by reqwest's proxy support.
    ///
    /// SOCKS5 uses `socks5h` so hostnames (including `.onion`) are resolved
    /// by Tor rather than locally.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5h",
        }
    }
}

/// Address and protocol of a SOCKS proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or IP address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// SOCKS version.
    pub proxy_type: ProxyType,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PROXY_HOST.to_string(),
            port: DEFAULT_PROXY_PORT,
            proxy_type: ProxyType::Socks5,
        }
    }
}

impl ProxyConfig {
    /// Create a configuration pointing at a local Tor (localhost:9050, SOCKS5).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the proxy host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the proxy port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the SOCKS version.
    pub fn proxy_type(mut self, proxy_type: ProxyType) -> Self {
        self.proxy_type = proxy_type;
        self
    }

    /// Proxy URL in the form reqwest expects, e.g. `socks5h://localhost:9050`.
    pub fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type.url_scheme(), self.host, self.port)
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.proxy_url())
    }
}

/// Replaceable default proxy settings.
///
/// Readers always get a complete snapshot; [`set_address`](Self::set_address)
/// swaps the whole value, never individual fields.
#[derive(Debug)]
pub struct ProxyDefaults {
    current: RwLock<Arc<ProxyConfig>>,
}

impl Default for ProxyDefaults {
    fn default() -> Self {
        Self::new(ProxyConfig::default())
    }
}

impl ProxyDefaults {
    /// Create a store holding `initial`.
    pub fn new(initial: ProxyConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// The process-wide defaults, initialised to localhost:9050 over SOCKS5.
    pub fn global() -> Arc<ProxyDefaults> {
        static GLOBAL: OnceLock<Arc<ProxyDefaults>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProxyDefaults::default())))
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ProxyConfig> {
        Arc::clone(&self.current.read())
    }

    /// Build a configuration, filling each omitted field from the current
    /// defaults and then from the hard-coded fallback.
    ///
    /// An empty host or a port of `0` counts as omitted.
    pub fn build(
        &self,
        host: Option<&str>,
        port: Option<u16>,
        proxy_type: Option<ProxyType>,
    ) -> ProxyConfig {
        let defaults = self.snapshot();

        let host = host
            .filter(|h| !h.is_empty())
            .or_else(|| Some(defaults.host.as_str()).filter(|h| !h.is_empty()))
            .unwrap_or(DEFAULT_PROXY_HOST);
        let port = port
            .filter(|p| *p != 0)
            .or_else(|| Some(defaults.port).filter(|p| *p != 0))
            .unwrap_or(DEFAULT_PROXY_PORT);
        let proxy_type = proxy_type.unwrap_or(defaults.proxy_type);

        ProxyConfig {
            host: host.to_string(),
            port,
            proxy_type,
        }
    }

    /// Replace the defaults with a configuration built from `host` and `port`.
    ///
    /// Agents created before the call keep the address they were built with.
    pub fn set_address(&self, host: Option<&str>, port: Option<u16>) {
        let next = self.build(host, port, None);
        *self.current.write() = Arc::new(next);
    }

    /// Replace the defaults wholesale.
    pub fn replace(&self, config: ProxyConfig) {
        *self.current.write() = Arc::new(config);
    }
}

/// Build a proxy configuration against the process-wide defaults.
pub fn build_proxy_config(
    host: Option<&str>,
    port: Option<u16>,
    proxy_type: Option<ProxyType>,
) -> ProxyConfig {
    ProxyDefaults::global().build(host, port, proxy_type)
}

/// Point every subsequently created agent at a different Tor SOCKS address.
pub fn set_tor_address(host: &str, port: u16) {
    ProxyDefaults::global().set_address(Some(host), Some(port));
}

/// Settings for reaching Tor's control port.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPortConfig {
    /// Control port password; may be empty.
    pub password: String,
    /// Control port host.
    pub host: String,
    /// Control port number.
    pub port: u16,
    /// Give up waiting for the remote to close after this long.
    ///
    /// `None` waits indefinitely for Tor to close the connection after `quit`.
    pub response_timeout: Option<Duration>,
}

impl Default for ControlPortConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            host: DEFAULT_CONTROL_HOST.to_string(),
            port: DEFAULT_CONTROL_PORT,
            response_timeout: None,
        }
    }
}

// The password stays out of logs and debug output.
impl fmt::Debug for ControlPortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPortConfig")
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("host", &self.host)
            .field("port", &self.port)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

impl ControlPortConfig {
    /// Create a configuration for localhost:9051 with an empty password.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the control port password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the control port host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the control port number.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set a response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Host to dial, falling back to localhost when unset.
    pub fn effective_host(&self) -> &str {
        if self.host.is_empty() {
            DEFAULT_CONTROL_HOST
        } else {
            &self.host
        }
    }

    /// Port to dial, falling back to 9051 when unset.
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_CONTROL_PORT
        } else {
            self.port
        }
    }
}
