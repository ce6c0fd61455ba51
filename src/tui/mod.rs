//! Terminal user interface
mod probe_monitor;

pub use probe_monitor::ProbeMonitorApp;
