//! Single-shot schema bootstrap for disposable databases.
//!
//! Finds the `up.sql` scripts in a flat directory, orders them by filename and
//! executes each verbatim. No versioning, no rollback, no history table.

pub mod discover;
pub mod executor;
pub mod runner;

pub use discover::{discover, MigrationFile, MigrationSource, UP_MARKER};
pub use executor::ScriptExecutor;
pub use runner::{apply_migrations, MigrationReport};
