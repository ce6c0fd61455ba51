//! Probing engine
//!
//! This module provides functionality for:
//! - Dispatching one validation request per candidate with proxy rotation
//! - Fanning checks out over a pool of concurrent workers
//! - Aggregating throughput statistics
//! - Starting, cancelling and observing runs

pub mod dedup;
pub mod dispatcher;
pub mod engine;
pub mod models;
pub mod scheduler;
pub mod stats;
pub mod transport;

pub use dedup::CandidateRegistry;
pub use dispatcher::{DispatcherConfig, ProbeDispatcher, DEFAULT_VALIDATION_URL};
pub use engine::{ProbeEngine, RunState};
pub use models::{ProbeEvent, ProbeResult, RunOutcome};
pub use scheduler::{ProbeScheduler, SchedulerConfig, MAX_CONCURRENCY};
pub use stats::{throughput_for, RunStats, StatsSnapshot};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse, ValidationRequest};
