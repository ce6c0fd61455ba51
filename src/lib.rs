//! Handle Scout - concurrent username availability prober
//!
//! Probes a username validation endpoint with a pool of concurrent workers,
//! rotating requests through outbound proxies and tracking per-proxy health.

pub mod candidates;
pub mod error;
pub mod notify;
pub mod probe;
pub mod proxy;
pub mod tui;

pub use error::{Result, ScoutError};
pub use probe::*;
pub use proxy::*;

use std::path::PathBuf;

/// Default location of the newline-delimited proxy list
pub const DEFAULT_PROXY_FILE: &str = "proxies.txt";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy list file path; a missing file means direct connections
    pub proxy_file: PathBuf,
    /// Webhook URL for hit notifications; empty disables notifications
    pub webhook_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_file: PathBuf::from(DEFAULT_PROXY_FILE),
            webhook_url: String::new(),
        }
    }
}
