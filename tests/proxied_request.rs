//! Request lifecycle with fake SOCKS and HTTP collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tor_request::{
    AgentFactory, AgentHandle, EncryptedSocket, HttpExecutor, ProxyConfig, ProxyDefaults,
    RequestOptions, RequestParams, ReqwestExecutor, Result, SocksConnector, TorRequest,
    TorRequestError,
};

struct CountingSocket {
    ends: Arc<AtomicUsize>,
    fail: bool,
}

impl EncryptedSocket for CountingSocket {
    fn end(&mut self) -> io::Result<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "already closed"))
        } else {
            Ok(())
        }
    }
}

/// Hands out agents with a counting TLS socket and remembers their proxies.
#[derive(Default)]
struct FakeConnector {
    ends: Arc<AtomicUsize>,
    fail_close: bool,
    refuse: bool,
    proxies: Mutex<Vec<ProxyConfig>>,
    direct_client: Option<reqwest::Client>,
}

#[async_trait]
impl SocksConnector for FakeConnector {
    async fn connect(
        &self,
        proxy: &ProxyConfig,
        is_tls: bool,
        reject_unauthorized: bool,
    ) -> Result<AgentHandle> {
        if self.refuse {
            return Err(TorRequestError::Transport("proxy unreachable".to_string()));
        }
        self.proxies.lock().push(proxy.clone());

        let mut agent = AgentHandle::new(proxy.clone(), is_tls, reject_unauthorized)
            .with_encrypted_socket(CountingSocket {
                ends: self.ends.clone(),
                fail: self.fail_close,
            });
        if let Some(client) = &self.direct_client {
            agent = agent.with_client(client.clone());
        }
        Ok(agent)
    }
}

/// Records what it was asked to do and answers with a fixed outcome.
struct FakeExecutor {
    succeed: bool,
    calls: Mutex<Vec<(String, Option<String>, bool)>>,
}

impl FakeExecutor {
    fn resolving() -> Self {
        Self {
            succeed: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rejecting() -> Self {
        Self {
            succeed: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpExecutor for FakeExecutor {
    async fn execute(&self, params: &RequestParams) -> Result<String> {
        let agent = params.agent.as_ref();
        self.calls.lock().push((
            params.method.clone(),
            params.target().map(str::to_owned),
            agent.map_or(false, |a| a.has_encrypted_socket()),
        ));

        if self.succeed {
            Ok("body".to_string())
        } else {
            Err(TorRequestError::HttpStatus {
                status: 503,
                body: "exit node unavailable".to_string(),
            })
        }
    }
}

fn client_with(
    connector: Arc<FakeConnector>,
    executor: Arc<dyn HttpExecutor>,
) -> (TorRequest, Arc<ProxyDefaults>) {
    let defaults = Arc::new(ProxyDefaults::default());
    let agents = AgentFactory::new(defaults.clone(), connector);
    (TorRequest::new(agents, executor), defaults)
}

// ============================================================================
// Cleanup
// ============================================================================

mod cleanup {
    use super::*;

    #[tokio::test]
    async fn test_socket_closed_once_on_success() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, _) = client_with(connector.clone(), executor.clone());

        let body = client.request("https://example.com").await.unwrap();

        assert_eq!(body, "body");
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
        // The socket was still open while the executor ran.
        assert!(executor.calls.lock()[0].2);
    }

    #[tokio::test]
    async fn test_socket_closed_once_on_failure() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::rejecting());
        let (client, _) = client_with(connector.clone(), executor.clone());

        let err = client.request("https://example.com").await.unwrap_err();

        assert!(matches!(err, TorRequestError::HttpStatus { status: 503, .. }));
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_n_requests_close_n_sockets() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::rejecting());
        let (client, _) = client_with(connector.clone(), executor);

        for _ in 0..5 {
            let _ = client.get("https://example.com").await;
        }

        assert_eq!(connector.ends.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_change_outcome() {
        let connector = Arc::new(FakeConnector {
            fail_close: true,
            ..FakeConnector::default()
        });
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, _) = client_with(connector.clone(), executor);

        let body = client.request("https://example.com").await.unwrap();

        assert_eq!(body, "body");
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_agent_failure_skips_executor() {
        let connector = Arc::new(FakeConnector {
            refuse: true,
            ..FakeConnector::default()
        });
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, _) = client_with(connector, executor.clone());

        let err = client.request("http://example.com").await.unwrap_err();

        assert!(matches!(err, TorRequestError::Transport(_)));
        assert!(executor.calls.lock().is_empty());
    }
}

// ============================================================================
// Routing
// ============================================================================

mod routing {
    use super::*;

    #[tokio::test]
    async fn test_verbs_set_method() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, _) = client_with(connector, executor.clone());

        client.get("http://example.com/a").await.unwrap();
        client.head("http://example.com/a").await.unwrap();
        client.post("http://example.com/a").await.unwrap();
        client.put("http://example.com/a").await.unwrap();
        client.patch("http://example.com/a").await.unwrap();
        client.del("http://example.com/a").await.unwrap();

        let methods: Vec<String> = executor.calls.lock().iter().map(|c| c.0.clone()).collect();
        assert_eq!(methods, vec!["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE"]);
    }

    #[tokio::test]
    async fn test_url_field_is_used_as_target() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, _) = client_with(connector, executor.clone());

        client
            .request(RequestOptions::default().url("http://fallback.example/"))
            .await
            .unwrap();

        assert_eq!(
            executor.calls.lock()[0].1.as_deref(),
            Some("http://fallback.example/")
        );
    }

    #[tokio::test]
    async fn test_reconfigured_address_applies_to_next_request() {
        let connector = Arc::new(FakeConnector::default());
        let executor = Arc::new(FakeExecutor::resolving());
        let (client, defaults) = client_with(connector.clone(), executor);

        client.get("http://example.com").await.unwrap();
        defaults.set_address(Some("10.9.8.7"), Some(9150));
        client.get("http://example.com").await.unwrap();

        let proxies = connector.proxies.lock();
        assert_eq!((proxies[0].host.as_str(), proxies[0].port), ("localhost", 9050));
        assert_eq!((proxies[1].host.as_str(), proxies[1].port), ("10.9.8.7", 9150));
    }
}

// ============================================================================
// Reqwest executor
// ============================================================================

mod reqwest_executor {
    use super::*;

    /// Serve one raw HTTP response and return the request line that was received.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        (base, task)
    }

    fn direct_client() -> (TorRequest, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector {
            direct_client: Some(reqwest::Client::builder().no_proxy().build().unwrap()),
            ..FakeConnector::default()
        });
        let (client, _) = client_with(connector.clone(), Arc::new(ReqwestExecutor::new()));
        (client, connector)
    }

    #[tokio::test]
    async fn test_returns_body_on_success() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let (client, connector) = direct_client();

        let body = client
            .del((
                format!("{}/items/7", base),
                RequestOptions::default().query("force", "1"),
            ))
            .await
            .unwrap();

        assert_eq!(body, "hello");
        assert_eq!(server.await.unwrap(), "DELETE /items/7?force=1 HTTP/1.1");
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_surfaced() {
        let (base, _server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
        )
        .await;
        let (client, connector) = direct_client();

        let err = client.get(format!("{}/nope", base)).await.unwrap_err();

        match err {
            TorRequestError::HttpStatus { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("expected HTTP status error, got {:?}", other),
        }
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_agent_without_client_is_transport_error() {
        let connector = Arc::new(FakeConnector::default());
        let (client, _) = client_with(connector.clone(), Arc::new(ReqwestExecutor::new()));

        let err = client.get("http://127.0.0.1:1/").await.unwrap_err();

        assert!(matches!(err, TorRequestError::Transport(_)));
        assert_eq!(connector.ends.load(Ordering::SeqCst), 1);
    }
}
