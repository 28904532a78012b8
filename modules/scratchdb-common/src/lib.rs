//! Shared types for provisioning a disposable Postgres and bootstrapping its schema.

pub mod config;
pub mod error;
pub mod observer;

pub use config::{Credentials, ImageRef, LogStream, ProvisionRequest, ReadinessPlan};
pub use error::{BootstrapError, Result, Stage};
pub use observer::{BootstrapEvent, BootstrapObserver, SilentObserver, TracingObserver};
