//! Injectable diagnostics sink.
//!
//! Library code never touches global logging state directly. Every notable step
//! is reported as a [`BootstrapEvent`] to a [`BootstrapObserver`]; the default
//! [`TracingObserver`] forwards them to `tracing`, and [`SilentObserver`] drops
//! them for quiet test runs.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent<'a> {
    Launching { image: &'a str, port: u16 },
    LogSignalSeen { image: &'a str },
    PortMapped { container_port: u16, host: &'a str, host_port: u16 },
    PortListening { host: &'a str, host_port: u16, attempts: u32 },
    /// `url` has its password redacted.
    Connected { url: &'a str },
    MigrationsDiscovered { dir: &'a Path, count: usize },
    /// Two files whose numeric prefixes disagree with their lexicographic order.
    OrderingHazard { earlier: &'a str, later: &'a str },
    MigrationStarted { name: &'a str },
    MigrationApplied { name: &'a str, rows_affected: u64 },
    MigrationsComplete { applied: usize },
}

pub trait BootstrapObserver: Send + Sync {
    fn on_event(&self, event: &BootstrapEvent<'_>);
}

impl<O: BootstrapObserver + ?Sized> BootstrapObserver for Arc<O> {
    fn on_event(&self, event: &BootstrapEvent<'_>) {
        (**self).on_event(event)
    }
}

impl<O: BootstrapObserver + ?Sized> BootstrapObserver for &O {
    fn on_event(&self, event: &BootstrapEvent<'_>) {
        (**self).on_event(event)
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BootstrapObserver for TracingObserver {
    fn on_event(&self, event: &BootstrapEvent<'_>) {
        match *event {
            BootstrapEvent::Launching { image, port } => {
                info!(image, port, "Starting database container...");
            }
            BootstrapEvent::LogSignalSeen { image } => {
                debug!(image, "Ready marker observed in container log");
            }
            BootstrapEvent::PortMapped {
                container_port,
                host,
                host_port,
            } => {
                debug!(container_port, host, host_port, "Resolved mapped port");
            }
            BootstrapEvent::PortListening {
                host,
                host_port,
                attempts,
            } => {
                debug!(host, host_port, attempts, "Port accepting connections");
            }
            BootstrapEvent::Connected { url } => {
                info!(url, "Database container started");
            }
            BootstrapEvent::MigrationsDiscovered { dir, count } => {
                info!(dir = %dir.display(), count, "Discovered migrations");
            }
            BootstrapEvent::OrderingHazard { earlier, later } => {
                warn!(
                    earlier,
                    later, "Numeric prefixes disagree with filename order; zero-pad them"
                );
            }
            BootstrapEvent::MigrationStarted { name } => {
                info!(file = name, "Running migration");
            }
            BootstrapEvent::MigrationApplied {
                name,
                rows_affected,
            } => {
                debug!(file = name, rows_affected, "Migration applied");
            }
            BootstrapEvent::MigrationsComplete { applied } => {
                info!(applied, "Migrations complete");
            }
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl BootstrapObserver for SilentObserver {
    fn on_event(&self, _event: &BootstrapEvent<'_>) {}
}
