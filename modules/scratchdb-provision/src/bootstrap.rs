use std::path::Path;
use std::sync::Arc;

use scratchdb_common::{BootstrapObserver, ProvisionRequest, Result};
use scratchdb_migrate::{apply_migrations, MigrationReport};

use crate::provisioner::{ProvisionedDatabase, Provisioner};

/// Provision a database, then bring its schema up from a migrations directory.
///
/// Strictly sequential: migrations start only after the database is fully
/// ready. The first failure aborts and its [`Stage`](scratchdb_common::Stage)
/// tells the caller how far the run got.
#[derive(Clone, Default)]
pub struct Bootstrapper {
    provisioner: Provisioner,
}

impl Bootstrapper {
    pub fn new(observer: Arc<dyn BootstrapObserver>) -> Self {
        Self {
            provisioner: Provisioner::new(observer),
        }
    }

    pub async fn run(
        &self,
        request: &ProvisionRequest,
        migrations_dir: &Path,
    ) -> Result<(ProvisionedDatabase, MigrationReport)> {
        let db = self.provisioner.provision(request).await?;
        let report =
            apply_migrations(db.pool(), migrations_dir, self.provisioner.observer()).await?;
        Ok((db, report))
    }
}

/// [`Bootstrapper::run`] with the default `tracing`-backed observer.
pub async fn bootstrap(
    request: &ProvisionRequest,
    migrations_dir: impl AsRef<Path>,
) -> Result<ProvisionedDatabase> {
    let (db, _) = Bootstrapper::default()
        .run(request, migrations_dir.as_ref())
        .await?;
    Ok(db)
}
