use std::fmt;
use std::path::PathBuf;

use testcontainers::TestcontainersError;

/// Result type alias for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Invalid provision request: {0}")]
    Config(String),

    #[error("Failed to launch container from {image}: {source}")]
    LaunchFailure {
        image: String,
        #[source]
        source: TestcontainersError,
    },

    #[error("Database did not become ready: {reason}")]
    ReadinessTimeout { reason: String },

    #[error("Failed to resolve host port for container port {port}: {source}")]
    PortResolutionFailure {
        port: u16,
        #[source]
        source: TestcontainersError,
    },

    #[error("Failed to connect to {url}: {source}")]
    ConnectionFailure {
        /// Connection URL with the password redacted.
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to read migration directory {}: {source}", path.display())]
    DirectoryAccessFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read migration file {}: {source}", path.display())]
    FileReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration {file} failed: {source}")]
    StatementExecutionFailure {
        file: String,
        #[source]
        source: sqlx::Error,
    },
}

impl BootstrapError {
    /// The bootstrap stage this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) => Stage::Configure,
            Self::LaunchFailure { .. } => Stage::Launch,
            Self::ReadinessTimeout { .. } => Stage::Readiness,
            Self::PortResolutionFailure { .. } => Stage::PortResolution,
            Self::ConnectionFailure { .. } => Stage::Connect,
            Self::DirectoryAccessFailure { .. } => Stage::DiscoverMigrations,
            Self::FileReadFailure { .. } | Self::StatementExecutionFailure { .. } => {
                Stage::ApplyMigrations
            }
        }
    }
}

/// Ordered steps of a bootstrap run. A failure reports the step it stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Configure,
    Launch,
    Readiness,
    PortResolution,
    Connect,
    DiscoverMigrations,
    ApplyMigrations,
}

impl Stage {
    pub fn step(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Launch => "launch",
            Self::Readiness => "readiness",
            Self::PortResolution => "port resolution",
            Self::Connect => "connect",
            Self::DiscoverMigrations => "discover migrations",
            Self::ApplyMigrations => "apply migrations",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.step(), self.as_str())
    }
}
