//! Proxy data models

use crate::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Proxy type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(ScoutError::InvalidProxy(format!(
                "unknown proxy type '{}', use http, https, socks4 or socks5",
                s
            ))),
        }
    }
}

/// Proxy authentication credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyAuth {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

/// A single outbound proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl Proxy {
    /// Create a new proxy without authentication
    pub fn new(host: String, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: None,
        }
    }

    /// Create a new proxy with authentication
    pub fn with_auth(
        host: String,
        port: u16,
        proxy_type: ProxyType,
        username: String,
        password: String,
    ) -> Self {
        Self {
            host,
            port,
            proxy_type,
            auth: Some(ProxyAuth::new(username, password)),
        }
    }

    /// Full proxy URL, also used as the proxy's identity in the registry
    pub fn url(&self) -> String {
        let auth_part = self.auth.as_ref().map_or(String::new(), |auth| {
            format!("{}:{}@", auth.username, auth.password)
        });

        format!("{}://{}{}:{}", self.proxy_type, auth_part, self.host, self.port)
    }

    /// Get the proxy string in HOST:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the reqwest proxy routing every scheme through this endpoint
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        Ok(reqwest::Proxy::all(self.url())?)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_simple_string())
    }
}

/// Registry-side health record of one proxy
#[derive(Debug, Clone)]
pub struct ProxyEntry {
    pub proxy: Proxy,
    /// Transient failures since the last successful use
    pub consecutive_failures: u32,
    /// Excluded from selection until this instant
    pub cooldown_until: Option<Instant>,
}

impl ProxyEntry {
    pub fn new(proxy: Proxy) -> Self {
        Self {
            proxy,
            consecutive_failures: 0,
            cooldown_until: None,
        }
    }

    pub fn address(&self) -> String {
        self.proxy.url()
    }

    /// An entry is available when it has no cooldown or the cooldown has elapsed
    pub fn is_available_at(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| until <= now)
    }
}
