//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use failover_gateway::config::GatewayConfig;
use failover_gateway::lifecycle::{Gateway, Shutdown};
use failover_gateway::transport::memory::{MemoryRegistry, NamespaceSettings};
use failover_gateway::HttpServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const ADMIN_KEY: &str = "test-admin-key";

/// A registry whose namespaces the test and the gateway share.
pub fn registry() -> Arc<MemoryRegistry> {
    Arc::new(MemoryRegistry::new(NamespaceSettings {
        lock_duration: Duration::from_secs(5),
        max_delivery_count: 10,
    }))
}

/// Defaults tuned for fast tests.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.messaging.receive_wait_ms = 50;
    config.messaging.reconnect_delay_ms = 50;
    config.messaging.backoff_unit_ms = 100;
    config.timeouts.operation_secs = 2;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

/// A running gateway behind a real listener.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub registry: Arc<MemoryRegistry>,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.gateway.shutdown().await;
    }
}

/// Start a gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig, registry: Arc<MemoryRegistry>) -> TestGateway {
    let gateway = Arc::new(Gateway::start_with_registry(config, registry.clone()).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(gateway.clone());
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestGateway {
        addr,
        gateway,
        registry,
        shutdown,
    }
}

/// Client without connection pooling so every test request is independent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Start a programmable HTTP backend; each request gets `f()`'s status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 8192];
                let _ = socket.read(&mut request).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
