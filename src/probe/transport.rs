//! HTTP transport used by the dispatcher

use crate::proxy::models::Proxy;
use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// A fully built validation request
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl ValidationRequest {
    /// Value of a query parameter, if present
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of an upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure to obtain any response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be set up at all (e.g. the proxy URL is unusable)
    #[error("{0}")]
    Setup(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Sends one validation request, optionally through a proxy
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &ValidationRequest,
        proxy: Option<&Proxy>,
    ) -> std::result::Result<TransportResponse, TransportError>;

    /// Drop any per-proxy state held for an evicted proxy
    fn forget(&self, _proxy: &Proxy) {}

    /// Drop per-proxy state for every proxy whose URL is not in `addresses`
    fn retain_only(&self, _addresses: &HashSet<String>) {}
}

/// reqwest-backed transport with one cached client per proxy
pub struct HttpTransport {
    direct_client: Client,
    proxy_clients: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Direct means direct: ignore any system proxy settings.
            direct_client: Client::builder().no_proxy().build()?,
            proxy_clients: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&Proxy>) -> Result<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct_client.clone());
        };

        let url = proxy.url();
        let mut clients = self.proxy_clients.lock();
        if let Some(client) = clients.get(&url) {
            return Ok(client.clone());
        }

        let client = Client::builder().proxy(proxy.to_reqwest()?).build()?;
        clients.insert(url, client.clone());
        Ok(client)
    }

    /// Number of per-proxy clients currently cached
    pub fn cached_clients(&self) -> usize {
        self.proxy_clients.lock().len()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &ValidationRequest,
        proxy: Option<&Proxy>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let client = self
            .client_for(proxy)
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let mut builder = client.get(&request.endpoint).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(TransportResponse { status, body })
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn forget(&self, proxy: &Proxy) {
        self.proxy_clients.lock().remove(&proxy.url());
    }

    fn retain_only(&self, addresses: &HashSet<String>) {
        let mut clients = self.proxy_clients.lock();
        let before = clients.len();
        clients.retain(|url, _| addresses.contains(url));
        tracing::debug!(
            dropped = before - clients.len(),
            cached = clients.len(),
            "Pruned proxy clients"
        );
    }
}
