use std::path::Path;

use scratchdb_common::{BootstrapError, BootstrapEvent, BootstrapObserver, Result};

use crate::discover::{discover, ordering_hazards};
use crate::executor::ScriptExecutor;

/// What a successful run executed, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
}

impl MigrationReport {
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Apply every upward migration in `dir` against `executor`, one at a time.
///
/// The directory is listed once. Files run in filename order; the first read or
/// execution failure stops the run and nothing records what already applied.
/// There is no history table, so re-running against a migrated database fails
/// on the first non-idempotent statement.
pub async fn apply_migrations<E>(
    executor: &E,
    dir: &Path,
    observer: &dyn BootstrapObserver,
) -> Result<MigrationReport>
where
    E: ScriptExecutor + ?Sized,
{
    let sources = discover(dir).await?;
    observer.on_event(&BootstrapEvent::MigrationsDiscovered {
        dir,
        count: sources.len(),
    });

    for (earlier, later) in ordering_hazards(&sources) {
        observer.on_event(&BootstrapEvent::OrderingHazard { earlier, later });
    }

    let mut report = MigrationReport::default();

    for source in &sources {
        observer.on_event(&BootstrapEvent::MigrationStarted { name: &source.name });

        let migration = source.load().await?;
        let rows_affected = executor
            .execute_script(&migration.content)
            .await
            .map_err(|e| BootstrapError::StatementExecutionFailure {
                file: migration.name.clone(),
                source: e,
            })?;

        observer.on_event(&BootstrapEvent::MigrationApplied {
            name: &migration.name,
            rows_affected,
        });
        report.applied.push(migration.name);
    }

    observer.on_event(&BootstrapEvent::MigrationsComplete {
        applied: report.len(),
    });
    Ok(report)
}
