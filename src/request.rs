//! HTTP requests routed through Tor.
//!
//! [`TorRequest`] attaches a fresh SOCKS agent to every request, hands the
//! request to an [`HttpExecutor`], and closes the agent once the executor has
//! settled, whether it succeeded or failed.

use crate::agent::{AgentFactory, AgentHandle};
use crate::error::{Result, TorRequestError};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// HTTP verbs with a dedicated shorthand on [`TorRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`, exposed as `del`.
    Del,
}

impl Verb {
    /// All verbs, in declaration order.
    pub const ALL: [Verb; 6] = [
        Verb::Get,
        Verb::Head,
        Verb::Post,
        Verb::Put,
        Verb::Patch,
        Verb::Del,
    ];

    /// Parse a verb name such as `get` or `del`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(Verb::Get),
            "head" => Some(Verb::Head),
            "post" => Some(Verb::Post),
            "put" => Some(Verb::Put),
            "patch" => Some(Verb::Patch),
            "del" | "delete" => Some(Verb::Del),
            _ => None,
        }
    }

    /// The shorthand name.
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Head => "head",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Patch => "patch",
            Verb::Del => "del",
        }
    }

    /// The HTTP method token sent on the wire.
    pub fn as_method(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Del => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_method())
    }
}

/// Normalise a method name: upper-case, with `del` meaning `DELETE`.
pub fn normalize_method(method: &str) -> String {
    let method = method.trim();
    if method.eq_ignore_ascii_case("del") {
        "DELETE".to_string()
    } else {
        method.to_ascii_uppercase()
    }
}

/// Caller-supplied request options.
///
/// Converts from a bare URI (`&str`/`String`) and from a `(uri, options)`
/// pair, so every calling convention ends up as one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Target URI; takes precedence over `url`.
    pub uri: Option<String>,
    /// Alternative spelling of the target.
    pub url: Option<String>,
    /// HTTP method; `GET` when unset.
    pub method: Option<String>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options targeting `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Set the `url` field.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<&str> for RequestOptions {
    fn from(uri: &str) -> Self {
        RequestOptions::new(uri)
    }
}

impl From<String> for RequestOptions {
    fn from(uri: String) -> Self {
        RequestOptions::new(uri)
    }
}

impl From<&String> for RequestOptions {
    fn from(uri: &String) -> Self {
        RequestOptions::new(uri.as_str())
    }
}

impl<S: Into<String>> From<(S, RequestOptions)> for RequestOptions {
    fn from((uri, options): (S, RequestOptions)) -> Self {
        RequestOptions {
            uri: Some(uri.into()),
            ..options
        }
    }
}

/// Fully resolved parameters of one request, agent included.
#[derive(Debug)]
pub struct RequestParams {
    /// Target URI.
    pub uri: Option<String>,
    /// Alternative target.
    pub url: Option<String>,
    /// Upper-cased method.
    pub method: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Transport for this request, attached by the dispatcher.
    pub agent: Option<AgentHandle>,
}

impl RequestParams {
    /// The target: `uri` if set, otherwise `url`.
    pub fn target(&self) -> Option<&str> {
        self.uri
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// Collapse any calling convention into canonical request parameters.
pub fn init_params(options: impl Into<RequestOptions>) -> RequestParams {
    let options = options.into();
    let method = options
        .method
        .as_deref()
        .map(normalize_method)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string());

    RequestParams {
        uri: options.uri,
        url: options.url,
        method,
        headers: options.headers,
        query: options.query,
        body: options.body,
        timeout: options.timeout,
        agent: None,
    }
}

/// Performs an HTTP request described by [`RequestParams`].
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Execute the request and return the response body.
    async fn execute(&self, params: &RequestParams) -> Result<String>;
}

/// Executor that sends requests with the agent's reqwest client.
///
/// Non-2xx responses become [`TorRequestError::HttpStatus`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor;

impl ReqwestExecutor {
    /// Create a new executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, params: &RequestParams) -> Result<String> {
        let target = params
            .target()
            .ok_or_else(|| TorRequestError::InvalidArgument("missing uri".to_string()))?;
        let client = params
            .agent
            .as_ref()
            .and_then(AgentHandle::client)
            .ok_or_else(|| TorRequestError::Transport("agent has no HTTP client".to_string()))?;
        let method = reqwest::Method::from_bytes(params.method.as_bytes()).map_err(|_| {
            TorRequestError::InvalidArgument(format!("Invalid method '{}'", params.method))
        })?;

        let mut builder = client.request(method, target);
        for (name, value) in &params.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !params.query.is_empty() {
            builder = builder.query(&params.query);
        }
        if let Some(body) = &params.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = params.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!("{} {} -> {} ({} bytes)", params.method, target, status, body.len());

        if status.is_success() {
            Ok(body)
        } else {
            Err(TorRequestError::HttpStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Client that routes every request through Tor's SOCKS proxy.
#[derive(Clone)]
pub struct TorRequest {
    agents: AgentFactory,
    executor: Arc<dyn HttpExecutor>,
}

impl Default for TorRequest {
    fn default() -> Self {
        Self::new(AgentFactory::default(), Arc::new(ReqwestExecutor))
    }
}

impl TorRequest {
    /// Create a client from an agent factory and an HTTP executor.
    pub fn new(agents: AgentFactory, executor: Arc<dyn HttpExecutor>) -> Self {
        Self { agents, executor }
    }

    /// The agent factory used for every request.
    pub fn agents(&self) -> &AgentFactory {
        &self.agents
    }

    /// Perform a request and return the response body.
    ///
    /// The agent created for the request is closed before this returns,
    /// including when the request fails.
    pub async fn request(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.dispatch(init_params(options)).await
    }

    /// Perform a request, handing the outcome to `callback` before returning it.
    pub async fn request_with_callback<F>(
        &self,
        options: impl Into<RequestOptions>,
        callback: F,
    ) -> Result<String>
    where
        F: FnOnce(&Result<String>) + Send,
    {
        let outcome = self.request(options).await;
        callback(&outcome);
        outcome
    }

    /// Perform a request with the method forced to `verb`.
    pub async fn verb(&self, verb: Verb, options: impl Into<RequestOptions>) -> Result<String> {
        let mut params = init_params(options);
        params.method = verb.as_method().to_string();
        self.dispatch(params).await
    }

    /// `GET` through Tor.
    pub async fn get(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Get, options).await
    }

    /// `HEAD` through Tor.
    pub async fn head(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Head, options).await
    }

    /// `POST` through Tor.
    pub async fn post(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Post, options).await
    }

    /// `PUT` through Tor.
    pub async fn put(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Put, options).await
    }

    /// `PATCH` through Tor.
    pub async fn patch(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Patch, options).await
    }

    /// `DELETE` through Tor.
    pub async fn del(&self, options: impl Into<RequestOptions>) -> Result<String> {
        self.verb(Verb::Del, options).await
    }

    async fn dispatch(&self, mut params: RequestParams) -> Result<String> {
        let target = params
            .target()
            .map(str::to_owned)
            .ok_or_else(|| TorRequestError::InvalidArgument("missing uri".to_string()))?;

        params.agent = Some(self.agents.create_agent(&target).await?);
        debug!("{} {}", params.method, target);

        let outcome = self.executor.execute(&params).await;

        if let Some(agent) = params.agent.as_mut() {
            if let Err(e) = agent.close() {
                debug!("Ignoring agent close failure: {}", e);
            }
        }

        outcome
    }
}

/// A client using the process-wide proxy defaults.
pub fn tor_request() -> TorRequest {
    TorRequest::default()
}

/// Perform a request through Tor using the process-wide proxy defaults.
pub async fn request(options: impl Into<RequestOptions>) -> Result<String> {
    tor_request().request(options).await
}
