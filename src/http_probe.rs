use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::Readiness;
use crate::prelude::*;

const PROBE_HOST: &str = "127.0.0.1";
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[async_trait::async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, port: u16) -> bool;
}

pub fn from_settings(readiness: &Readiness) -> Box<dyn ReadinessProbe> {
    match readiness {
        Readiness::Tcp => Box::new(TcpProbe),
        Readiness::Http { path } => Box::new(HttpProbe::new(path)),
    }
}

/// Ready once the port accepts a TCP connection.
pub struct TcpProbe;

#[async_trait::async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self, port: u16) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((PROBE_HOST, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Ready once `path` answers with any HTTP response.
pub struct HttpProbe {
    client: reqwest::Client,
    path: String,
}

impl HttpProbe {
    pub fn new(path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        HttpProbe {
            client: reqwest::Client::new(),
            path,
        }
    }
}

#[async_trait::async_trait]
impl ReadinessProbe for HttpProbe {
    async fn is_ready(&self, port: u16) -> bool {
        let url = format!("http://{}:{}{}", PROBE_HOST, port, self.path);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => {
                debug!("Readiness probe {} -> {}", url, resp.status());
                true
            }
            Err(_) => false,
        }
    }
}
