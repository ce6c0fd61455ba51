//! Probe dispatcher: one validation request per candidate
//!
//! Every failure is folded into a [`ProbeResult`]; nothing is raised to the
//! caller. Counting rules per outcome:
//!
//! | outcome                  | checks | errors | hits        |
//! |--------------------------|--------|--------|-------------|
//! | proxies cooling down     | -      | -      | -           |
//! | transport failure        | -      | +1     | -           |
//! | HTTP 200                 | +1     | -      | +1 if code 0|
//! | HTTP 429                 | +1     | +1     | -           |
//! | other status             | +1     | +1     | -           |

use crate::probe::models::ProbeResult;
use crate::probe::stats::{RunStats, StatsSnapshot};
use crate::probe::transport::{
    HttpTransport, Transport, TransportError, TransportResponse, ValidationRequest,
};
use crate::proxy::models::Proxy;
use crate::proxy::registry::{FailureOutcome, ProxyRegistry, ProxySelection};
use crate::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Fixed upstream validation endpoint
pub const DEFAULT_VALIDATION_URL: &str = "https://auth.roblox.com/v1/usernames/validate";

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Wait when every proxy is cooling down
const DEFAULT_COOLDOWN_WAIT: Duration = Duration::from_secs(2);

/// Wait after the local address itself got rate limited
const DEFAULT_LOCAL_RATE_LIMIT_WAIT: Duration = Duration::from_millis(1500);

const BIRTHDAY: &str = "2000-01-01T00:00:00.000Z";
const CONTEXT: &str = "Signup";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
];

const STATIC_HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Referer", "https://www.roblox.com/"),
    ("Origin", "https://www.roblox.com"),
    (
        "Sec-Ch-Ua",
        "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\", \"Chromium\";v=\"121\"",
    ),
    ("Sec-Ch-Ua-Mobile", "?0"),
    ("Sec-Ch-Ua-Platform", "\"Windows\""),
    ("Sec-Fetch-Dest", "empty"),
    ("Sec-Fetch-Mode", "cors"),
    ("Sec-Fetch-Site", "same-site"),
];

pub const MSG_COOLING_DOWN: &str = "Proxies cooling down";
pub const MSG_MALFORMED: &str = "Malformed response";
pub const MSG_RATE_LIMITED_LOCAL: &str = "Rate limited (local IP)";
pub const MSG_RATE_LIMITED_ROTATED: &str = "Rate limited (proxy rotated)";

/// Configuration for the probe dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Validation endpoint URL
    pub endpoint: String,
    /// Bound on a single request, connect to body
    pub timeout: Duration,
    pub cooldown_wait: Duration,
    pub local_rate_limit_wait: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_VALIDATION_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cooldown_wait: DEFAULT_COOLDOWN_WAIT,
            local_rate_limit_wait: DEFAULT_LOCAL_RATE_LIMIT_WAIT,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cooldown_wait(mut self, wait: Duration) -> Self {
        self.cooldown_wait = wait;
        self
    }

    pub fn with_local_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.local_rate_limit_wait = wait;
        self
    }
}

/// Body of a 200 response from the validation endpoint
#[derive(Debug, Deserialize)]
struct ValidationBody {
    code: Option<i64>,
    message: Option<String>,
}

/// Checks candidates against the validation endpoint
pub struct ProbeDispatcher {
    config: DispatcherConfig,
    registry: Arc<ProxyRegistry>,
    stats: Arc<RunStats>,
    transport: Arc<dyn Transport>,
}

impl ProbeDispatcher {
    /// Create a dispatcher backed by the real HTTP transport
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<ProxyRegistry>,
        stats: Arc<RunStats>,
    ) -> Result<Self> {
        Ok(Self::with_transport(
            config,
            registry,
            stats,
            Arc::new(HttpTransport::new()?),
        ))
    }

    pub fn with_transport(
        config: DispatcherConfig,
        registry: Arc<ProxyRegistry>,
        stats: Arc<RunStats>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            registry,
            stats,
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<ProxyRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.registry.count())
    }

    /// Replace the proxy set and drop transport state for proxies that left it
    pub fn load_proxies(&self, proxies: Vec<Proxy>) {
        self.registry.load(proxies);
        let current: HashSet<String> = self
            .registry
            .snapshot()
            .iter()
            .map(|entry| entry.address())
            .collect();
        self.transport.retain_only(&current);
    }

    /// Check a single candidate
    pub async fn check(&self, candidate: &str, use_proxy: bool) -> ProbeResult {
        let selection = if use_proxy {
            self.registry.select_available()
        } else {
            ProxySelection::Direct
        };

        let proxy = match selection {
            ProxySelection::AllCoolingDown => {
                tokio::time::sleep(self.config.cooldown_wait).await;
                return ProbeResult::unavailable(MSG_COOLING_DOWN);
            }
            ProxySelection::Proxy(proxy) => Some(proxy),
            ProxySelection::Direct => None,
        };

        let request = self.build_request(candidate);
        match self.transport.fetch(&request, proxy.as_ref()).await {
            Ok(response) => self.on_response(candidate, proxy.as_ref(), response).await,
            Err(TransportError::Setup(message)) => {
                tracing::error!(candidate, %message, "Check setup error");
                ProbeResult::unavailable(format!("Check setup error: {}", message))
            }
            Err(e) => self.on_transport_failure(proxy.as_ref(), e),
        }
    }

    /// Build the request for a candidate with randomized browser identity
    pub fn build_request(&self, candidate: &str) -> ValidationRequest {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        let guest_id = Uuid::new_v4().simple().to_string();
        let rbx_id: u32 = rng.gen_range(0..999_999_999);

        let mut headers: Vec<(String, String)> = STATIC_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        headers.push(("User-Agent".to_string(), user_agent.to_string()));
        headers.push((
            "Cookie".to_string(),
            format!("guestId={}; rbxid={}", guest_id, rbx_id),
        ));

        ValidationRequest {
            endpoint: self.config.endpoint.clone(),
            query: vec![
                ("Username".to_string(), candidate.to_string()),
                ("Birthday".to_string(), BIRTHDAY.to_string()),
                ("Context".to_string(), CONTEXT.to_string()),
            ],
            headers,
            timeout: self.config.timeout,
        }
    }

    async fn on_response(
        &self,
        candidate: &str,
        proxy: Option<&Proxy>,
        response: TransportResponse,
    ) -> ProbeResult {
        // Any HTTP response proves the proxy itself is alive.
        if let Some(proxy) = proxy {
            self.registry.report_success(&proxy.url());
        }
        self.stats.record_check();

        match response.status {
            200 => match serde_json::from_str::<ValidationBody>(&response.body) {
                Ok(body) if body.code.unwrap_or(-1) == 0 => {
                    self.stats.record_hit();
                    tracing::info!(candidate, "Candidate available");
                    ProbeResult::available()
                }
                Ok(body) => ProbeResult::unavailable(body.message.unwrap_or_default()),
                Err(e) => {
                    self.stats.record_error();
                    tracing::debug!(candidate, error = %e, "Unparseable validation body");
                    ProbeResult::unavailable(MSG_MALFORMED)
                }
            },
            429 => {
                self.stats.record_error();
                self.on_rate_limited(proxy).await
            }
            status => {
                self.stats.record_error();
                tracing::debug!(candidate, status, "Unexpected upstream status");
                ProbeResult::unavailable(format!("HTTP {}", status))
            }
        }
    }

    async fn on_rate_limited(&self, proxy: Option<&Proxy>) -> ProbeResult {
        if let Some(proxy) = proxy {
            self.registry.report_rate_limited(&proxy.url());
            return ProbeResult::unavailable(format!(
                "Rate limited ({} cooldown)",
                cooldown_label(self.registry.config().cooldown)
            ));
        }

        if self.registry.is_empty() {
            tokio::time::sleep(self.config.local_rate_limit_wait).await;
            ProbeResult::unavailable(MSG_RATE_LIMITED_LOCAL)
        } else {
            ProbeResult::unavailable(MSG_RATE_LIMITED_ROTATED)
        }
    }

    fn on_transport_failure(&self, proxy: Option<&Proxy>, error: TransportError) -> ProbeResult {
        self.stats.record_error();

        let Some(proxy) = proxy else {
            return ProbeResult::unavailable(error.to_string());
        };

        match self.registry.report_transient_failure(&proxy.url()) {
            FailureOutcome::Evicted => {
                self.transport.forget(proxy);
                ProbeResult::unavailable(format!("Proxy removed ({})", error))
            }
            FailureOutcome::Retained { .. } | FailureOutcome::Unknown => {
                ProbeResult::unavailable(format!("Proxy error ({})", error))
            }
        }
    }
}

/// Whole minutes as `5m`, anything else as seconds
fn cooldown_label(cooldown: Duration) -> String {
    let secs = cooldown.as_secs();
    if secs == 0 {
        format!("{}ms", cooldown.as_millis())
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
