//! Proxy module for loading proxies and tracking their health
//!
//! This module provides functionality for:
//! - Parsing newline-delimited proxy lists (HOST:PORT, HOST:PORT:USER:PASS, URLs)
//! - A shared registry with random selection, cooldowns and eviction

pub mod models;
pub mod parser;
pub mod registry;

pub use models::{Proxy, ProxyAuth, ProxyEntry, ProxyType};
pub use parser::ProxyParser;
pub use registry::{FailureOutcome, ProxyRegistry, ProxySelection, RegistryConfig};
