//! Disposable Postgres for tests.
//!
//! [`provision`] starts a container and returns once it logs readiness, its
//! port listens both inside the container and on the mapped host port, and a
//! pool is connected. [`bootstrap`] then applies the `up.sql` migrations from a
//! directory.
//!
//! ```ignore
//! let request = ProvisionRequest::builder()
//!     .credentials(Credentials::postgres_default())
//!     .build();
//! let db = scratchdb_provision::bootstrap(&request, "migrations").await?;
//! sqlx::query("SELECT 1").execute(db.pool()).await?;
//! ```

pub mod bootstrap;
pub mod endpoint;
pub mod provisioner;
pub mod readiness;

pub use bootstrap::{bootstrap, Bootstrapper};
pub use endpoint::Endpoint;
pub use provisioner::{container_request, provision, ProvisionedDatabase, Provisioner};
pub use readiness::{wait_until_listening, PortProbe};

pub use scratchdb_common::{
    BootstrapError, BootstrapEvent, BootstrapObserver, Credentials, ImageRef, LogStream,
    ProvisionRequest, ReadinessPlan, Result, SilentObserver, Stage, TracingObserver,
};
pub use scratchdb_migrate::{apply_migrations, MigrationReport};
