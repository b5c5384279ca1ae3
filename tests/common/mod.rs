//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ops_gateway::config::GatewaySettings;
use ops_gateway::http::HttpServer;
use ops_gateway::lifecycle::Shutdown;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// A gateway serving a fresh temporary base directory on a loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    base: TempDir,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Canonical base directory the gateway confines paths to.
    pub fn base(&self) -> PathBuf {
        self.base.path().canonicalize().unwrap()
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.base().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway; `configure` may adjust the settings before startup.
pub async fn spawn_gateway<F>(configure: F) -> TestGateway
where
    F: FnOnce(&mut GatewaySettings, &Path),
{
    let base = tempfile::tempdir().unwrap();
    let mut settings = GatewaySettings::default();
    settings.gateway.safe_base_dir = base.path().to_path_buf();
    configure(&mut settings, base.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(settings).unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestGateway {
        addr,
        client: reqwest::Client::new(),
        base,
        shutdown,
    }
}
