//! Proxy registry tracking per-proxy health
//!
//! Two failure modes are kept apart:
//! - rate limiting puts an entry on a timed cooldown, after which it is
//!   selectable again
//! - repeated transport failures evict an entry for the rest of the process

use crate::proxy::models::{Proxy, ProxyEntry};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive transport failures after which a proxy is evicted
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long a rate-limited proxy is excluded from selection
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Outcome of asking the registry for a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxySelection {
    /// The registry is empty: connect directly
    Direct,
    /// Use this proxy
    Proxy(Proxy),
    /// Proxies exist but every one of them is cooling down
    AllCoolingDown,
}

/// Outcome of reporting a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retained { failures: u32 },
    Evicted,
    /// The address is no longer registered (already evicted or reloaded away)
    Unknown,
}

/// Owner of the proxy set and its health state
pub struct ProxyRegistry {
    config: RegistryConfig,
    entries: Mutex<Vec<ProxyEntry>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn from_proxies(proxies: Vec<Proxy>) -> Self {
        let registry = Self::new();
        registry.load(proxies);
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Replace the proxy set.
    ///
    /// Failure counters restart at zero. Cooldowns survive only for addresses
    /// present in the new list. Duplicate addresses are collapsed.
    pub fn load(&self, proxies: Vec<Proxy>) {
        let mut entries = self.entries.lock();

        let mut cooldowns: HashMap<String, Instant> = entries
            .iter()
            .filter_map(|e| e.cooldown_until.map(|until| (e.address(), until)))
            .collect();

        let mut fresh: Vec<ProxyEntry> = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            let mut entry = ProxyEntry::new(proxy);
            let address = entry.address();
            if fresh.iter().any(|e| e.address() == address) {
                continue;
            }
            entry.cooldown_until = cooldowns.remove(&address);
            fresh.push(entry);
        }

        *entries = fresh;
        tracing::info!(count = entries.len(), "Loaded proxies");
    }

    /// Pick a uniformly random proxy whose cooldown has elapsed
    pub fn select_available(&self) -> ProxySelection {
        self.select_available_at(Instant::now())
    }

    pub fn select_available_at(&self, now: Instant) -> ProxySelection {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return ProxySelection::Direct;
        }

        let available: Vec<&ProxyEntry> =
            entries.iter().filter(|e| e.is_available_at(now)).collect();

        match available.choose(&mut rand::thread_rng()) {
            Some(entry) => ProxySelection::Proxy(entry.proxy.clone()),
            None => ProxySelection::AllCoolingDown,
        }
    }

    pub fn report_success(&self, address: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.address() == address) {
            entry.consecutive_failures = 0;
        }
    }

    /// Count a transport failure, evicting the proxy once it hits the threshold
    pub fn report_transient_failure(&self, address: &str) -> FailureOutcome {
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|e| e.address() == address) else {
            return FailureOutcome::Unknown;
        };

        entries[index].consecutive_failures += 1;
        let failures = entries[index].consecutive_failures;

        if failures >= self.config.failure_threshold {
            let evicted = entries.remove(index);
            tracing::warn!(
                proxy = %evicted.proxy,
                failures,
                remaining = entries.len(),
                "Evicting proxy after repeated failures"
            );
            FailureOutcome::Evicted
        } else {
            tracing::debug!(proxy = %entries[index].proxy, failures, "Proxy transport failure");
            FailureOutcome::Retained { failures }
        }
    }

    /// Put the proxy on cooldown; the failure counter is left alone
    pub fn report_rate_limited(&self, address: &str) -> bool {
        self.report_rate_limited_at(address, Instant::now())
    }

    pub fn report_rate_limited_at(&self, address: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.address() == address) {
            Some(entry) => {
                entry.cooldown_until = Some(now + self.config.cooldown);
                tracing::debug!(
                    proxy = %entry.proxy,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Proxy rate limited, cooling down"
                );
                true
            }
            None => false,
        }
    }

    /// Number of registered proxies, cooling down or not
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|e| e.is_available_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the current entries, for reporting
    pub fn snapshot(&self) -> Vec<ProxyEntry> {
        self.entries.lock().clone()
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;

    fn proxy(host: &str) -> Proxy {
        Proxy::new(host.to_string(), 8080, ProxyType::Http)
    }

    #[test]
    fn test_empty_registry_is_direct() {
        let registry = ProxyRegistry::new();
        assert_eq!(registry.select_available(), ProxySelection::Direct);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_select_returns_registered_proxy() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1"), proxy("10.0.0.2")]);
        for _ in 0..20 {
            match registry.select_available() {
                ProxySelection::Proxy(p) => assert!(p.host == "10.0.0.1" || p.host == "10.0.0.2"),
                other => panic!("unexpected selection: {:?}", other),
            }
        }
    }

    #[test]
    fn test_load_collapses_duplicates() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1"), proxy("10.0.0.1")]);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_three_failures_evict() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1"), proxy("10.0.0.2")]);
        let address = proxy("10.0.0.1").url();

        assert_eq!(
            registry.report_transient_failure(&address),
            FailureOutcome::Retained { failures: 1 }
        );
        assert_eq!(
            registry.report_transient_failure(&address),
            FailureOutcome::Retained { failures: 2 }
        );
        assert_eq!(registry.report_transient_failure(&address), FailureOutcome::Evicted);
        assert_eq!(registry.report_transient_failure(&address), FailureOutcome::Unknown);
        assert_eq!(registry.count(), 1);

        for _ in 0..50 {
            assert_eq!(
                registry.select_available(),
                ProxySelection::Proxy(proxy("10.0.0.2"))
            );
        }
    }

    #[test]
    fn test_success_resets_failures() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1")]);
        let address = proxy("10.0.0.1").url();

        registry.report_transient_failure(&address);
        registry.report_transient_failure(&address);
        registry.report_success(&address);

        assert_eq!(
            registry.report_transient_failure(&address),
            FailureOutcome::Retained { failures: 1 }
        );
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_window() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1")]);
        let address = proxy("10.0.0.1").url();
        let now = Instant::now();

        assert!(registry.report_rate_limited_at(&address, now));
        assert_eq!(registry.select_available_at(now), ProxySelection::AllCoolingDown);
        assert_eq!(
            registry.select_available_at(now + DEFAULT_COOLDOWN - Duration::from_millis(1)),
            ProxySelection::AllCoolingDown
        );
        assert_eq!(
            registry.select_available_at(now + DEFAULT_COOLDOWN),
            ProxySelection::Proxy(proxy("10.0.0.1"))
        );
        // Cooling down is not a failure.
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_keeps_cooldown_for_retained_only() {
        let registry = ProxyRegistry::from_proxies(vec![proxy("10.0.0.1"), proxy("10.0.0.2")]);
        registry.report_rate_limited(&proxy("10.0.0.1").url());
        registry.report_rate_limited(&proxy("10.0.0.2").url());
        registry.report_transient_failure(&proxy("10.0.0.1").url());

        registry.load(vec![proxy("10.0.0.1"), proxy("10.0.0.3")]);

        let entries = registry.snapshot();
        assert_eq!(entries.len(), 2);
        let first = entries.iter().find(|e| e.proxy.host == "10.0.0.1").unwrap();
        assert!(first.cooldown_until.is_some());
        assert_eq!(first.consecutive_failures, 0);
        let third = entries.iter().find(|e| e.proxy.host == "10.0.0.3").unwrap();
        assert!(third.cooldown_until.is_none());
        assert_eq!(
            registry.select_available(),
            ProxySelection::Proxy(proxy("10.0.0.3"))
        );
    }

    #[test]
    fn test_custom_threshold() {
        let registry =
            ProxyRegistry::with_config(RegistryConfig::new().with_failure_threshold(1));
        registry.load(vec![proxy("10.0.0.1")]);
        assert_eq!(
            registry.report_transient_failure(&proxy("10.0.0.1").url()),
            FailureOutcome::Evicted
        );
        assert_eq!(registry.select_available(), ProxySelection::Direct);
    }
}
