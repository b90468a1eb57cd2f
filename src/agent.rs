//! SOCKS agents for proxied requests.
//!
//! An [`AgentHandle`] is the transport a single request runs over. It is
//! created by an [`AgentFactory`] from the current proxy defaults and is
//! closed by the request that created it once that request has settled.

use crate::config::{ProxyConfig, ProxyDefaults};
use crate::error::{Result, TorRequestError};

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace};

/// Certificate validation setting handed to every connector.
///
/// Tor exit nodes and onion services frequently present certificates that do
/// not validate; callers that need strict validation must add it themselves.
pub const REJECT_UNAUTHORIZED: bool = false;

/// A TLS socket owned by an agent that must be ended once the request is done.
pub trait EncryptedSocket: Send + Sync {
    /// Shut the socket down.
    fn end(&mut self) -> io::Result<()>;
}

/// Transport bound to one proxy, owned by one in-flight request.
pub struct AgentHandle {
    proxy: ProxyConfig,
    is_tls: bool,
    reject_unauthorized: bool,
    client: Option<reqwest::Client>,
    encrypted_socket: Option<Box<dyn EncryptedSocket>>,
}

impl AgentHandle {
    /// Create an agent with no transport attached yet.
    pub fn new(proxy: ProxyConfig, is_tls: bool, reject_unauthorized: bool) -> Self {
        Self {
            proxy,
            is_tls,
            reject_unauthorized,
            client: None,
            encrypted_socket: None,
        }
    }

    /// Attach the HTTP client that routes through this agent's proxy.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Attach a TLS socket to be ended when the agent closes.
    pub fn with_encrypted_socket(mut self, socket: impl EncryptedSocket + 'static) -> Self {
        self.encrypted_socket = Some(Box::new(socket));
        self
    }

    /// The proxy this agent was built for.
    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// Whether the target is reached over TLS.
    pub fn is_tls(&self) -> bool {
        self.is_tls
    }

    /// Whether invalid certificates are rejected.
    pub fn reject_unauthorized(&self) -> bool {
        self.reject_unauthorized
    }

    /// The HTTP client, if the agent has one and is still open.
    pub fn client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref()
    }

    /// Whether an encrypted socket is still attached.
    pub fn has_encrypted_socket(&self) -> bool {
        self.encrypted_socket.is_some()
    }

    /// Release the agent's resources.
    ///
    /// The encrypted socket is ended at most once; later calls are no-ops.
    /// Dropping the dedicated client closes any pooled proxy connections.
    pub fn close(&mut self) -> io::Result<()> {
        self.client = None;
        match self.encrypted_socket.take() {
            Some(mut socket) => socket.end(),
            None => Ok(()),
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        // Reached when a request future is dropped before cleanup ran.
        if let Some(mut socket) = self.encrypted_socket.take() {
            let _ = socket.end();
        }
    }
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("proxy", &self.proxy)
            .field("is_tls", &self.is_tls)
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("has_client", &self.client.is_some())
            .field("has_encrypted_socket", &self.encrypted_socket.is_some())
            .finish()
    }
}

/// Builds transports bound to a SOCKS proxy.
#[async_trait]
pub trait SocksConnector: Send + Sync {
    /// Produce an agent for `proxy`, negotiating TLS when `is_tls` is set.
    async fn connect(
        &self,
        proxy: &ProxyConfig,
        is_tls: bool,
        reject_unauthorized: bool,
    ) -> Result<AgentHandle>;
}

/// Connector that gives each agent a dedicated reqwest client proxied over SOCKS.
#[derive(Debug, Clone, Default)]
pub struct ReqwestSocksConnector;

impl ReqwestSocksConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocksConnector for ReqwestSocksConnector {
    async fn connect(
        &self,
        proxy: &ProxyConfig,
        is_tls: bool,
        reject_unauthorized: bool,
    ) -> Result<AgentHandle> {
        let proxy_url = proxy.proxy_url();
        let socks = reqwest::Proxy::all(&proxy_url).map_err(|e| {
            TorRequestError::Transport(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;

        let client = reqwest::Client::builder()
            .proxy(socks)
            .danger_accept_invalid_certs(!reject_unauthorized)
            .build()
            .map_err(|e| TorRequestError::Transport(format!("Failed to build agent: {}", e)))?;

        trace!("Built SOCKS client for {}", proxy_url);
        Ok(AgentHandle::new(proxy.clone(), is_tls, reject_unauthorized).with_client(client))
    }
}

/// Check whether a target URI is TLS-secured.
pub fn is_tls_target(uri: &str) -> bool {
    uri.trim_start()
        .get(..5)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("https"))
}

/// Creates agents from the current proxy defaults.
#[derive(Clone)]
pub struct AgentFactory {
    defaults: Arc<ProxyDefaults>,
    connector: Arc<dyn SocksConnector>,
}

impl Default for AgentFactory {
    fn default() -> Self {
        Self::new(ProxyDefaults::global(), Arc::new(ReqwestSocksConnector))
    }
}

impl AgentFactory {
    /// Create a factory reading `defaults` and building through `connector`.
    pub fn new(defaults: Arc<ProxyDefaults>, connector: Arc<dyn SocksConnector>) -> Self {
        Self {
            defaults,
            connector,
        }
    }

    /// The defaults this factory reads.
    pub fn defaults(&self) -> &Arc<ProxyDefaults> {
        &self.defaults
    }

    /// Create an agent for `uri` using the proxy defaults as they are now.
    pub async fn create_agent(&self, uri: &str) -> Result<AgentHandle> {
        let is_tls = is_tls_target(uri);
        let proxy = self.defaults.build(None, None, None);
        debug!("Creating agent via {} (tls: {})", proxy, is_tls);
        self.connector
            .connect(&proxy, is_tls, REJECT_UNAUTHORIZED)
            .await
    }
}

/// Create an agent for `uri` against the process-wide defaults.
pub async fn create_agent(uri: &str) -> Result<AgentHandle> {
    AgentFactory::default().create_agent(uri).await
}
