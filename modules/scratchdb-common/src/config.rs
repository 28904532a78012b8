use std::fmt;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::error::{BootstrapError, Result};

pub const DEFAULT_IMAGE: &str = "postgis/postgis";
pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_PORT: u16 = 5432;
pub const READY_MARKER: &str = "database system is ready to accept connections";

/// Admin credentials handed to the container and reused for the connection URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The stock `postgres/postgres` pair of the official images.
    pub fn postgres_default() -> Self {
        Self::new("postgres", "postgres")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }
}

impl Default for ImageRef {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE, DEFAULT_TAG)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// Which container output stream carries the ready marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStream {
    Stdout,
    /// Postgres logs to stderr inside the official images.
    #[default]
    Stderr,
}

/// Composite readiness condition: a log marker AND a listening port.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct ReadinessPlan {
    #[builder(default = READY_MARKER.to_string(), setter(into))]
    pub log_marker: String,
    #[builder(default)]
    pub log_stream: LogStream,
    /// How many times the marker must appear before the log signal counts.
    #[builder(default = 1)]
    pub log_occurrences: usize,
    #[builder(default = Duration::from_millis(250))]
    pub poll_interval: Duration,
}

impl Default for ReadinessPlan {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything needed to launch one disposable database.
///
/// ```ignore
/// let request = ProvisionRequest::builder()
///     .credentials(Credentials::new("app", "secret"))
///     .database("app_test")
///     .build();
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ProvisionRequest {
    /// Container-side port to expose.
    #[builder(default = DEFAULT_PORT)]
    pub exposed_port: u16,
    pub credentials: Credentials,
    #[builder(default, setter(strip_option, into))]
    pub database: Option<String>,
    #[builder(default)]
    pub image: ImageRef,
    #[builder(default)]
    pub readiness: ReadinessPlan,
    /// Total bound on startup, shared by the log wait and the port probe: the
    /// probe only gets what launch left over. Unset means the runtime's own wait
    /// bound applies to the log signal and the port probe waits indefinitely.
    #[builder(default, setter(strip_option))]
    pub startup_timeout: Option<Duration>,
}

impl ProvisionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.exposed_port == 0 {
            return Err(BootstrapError::Config("exposed port must be non-zero".into()));
        }
        if self.credentials.username.trim().is_empty() {
            return Err(BootstrapError::Config("username must not be empty".into()));
        }
        if self.credentials.password.is_empty() {
            return Err(BootstrapError::Config("password must not be empty".into()));
        }
        if self.image.name.is_empty() || self.image.tag.is_empty() {
            return Err(BootstrapError::Config(format!(
                "image reference is incomplete: {}",
                self.image
            )));
        }
        if let Some(db) = &self.database {
            if db.trim().is_empty() {
                return Err(BootstrapError::Config("database name must not be blank".into()));
            }
        }
        let readiness = &self.readiness;
        if readiness.log_marker.is_empty() {
            return Err(BootstrapError::Config("ready marker must not be empty".into()));
        }
        if readiness.log_occurrences == 0 {
            return Err(BootstrapError::Config(
                "ready marker must be awaited at least once".into(),
            ));
        }
        if readiness.poll_interval.is_zero() {
            return Err(BootstrapError::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}
