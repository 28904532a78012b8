use std::io;
use std::path::{Path, PathBuf};

use scratchdb_common::{BootstrapError, Result};

/// Filename substring marking a forward migration.
pub const UP_MARKER: &str = "up.sql";

/// An upward migration found on disk, content not yet loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    pub name: String,
    pub ordinal_hint: Option<u64>,
    pub path: PathBuf,
}

/// A migration with its script text loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub content: String,
}

impl MigrationSource {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            ordinal_hint: ordinal_hint(&name),
            name,
            path,
        }
    }

    /// Read the script text. Dangling symlinks, directories and unreadable or
    /// non-UTF-8 files all fail with [`BootstrapError::FileReadFailure`].
    pub async fn load(&self) -> Result<MigrationFile> {
        let read_err = |source| BootstrapError::FileReadFailure {
            path: self.path.clone(),
            source,
        };

        // Follows symlinks.
        let meta = tokio::fs::metadata(&self.path).await.map_err(read_err)?;
        if !meta.is_file() {
            return Err(read_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(read_err)?;

        Ok(MigrationFile {
            name: self.name.clone(),
            content,
        })
    }
}

/// Leading decimal digits of a filename: `"002_add_index.up.sql"` -> `Some(2)`.
pub fn ordinal_hint(name: &str) -> Option<u64> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    name[..end].parse().ok()
}

pub fn is_up_migration(name: &str) -> bool {
    name.contains(UP_MARKER)
}

/// List `dir` once (non-recursive) and return its upward migrations sorted by name.
///
/// Only the name decides selection: anything carrying the `up.sql` marker is
/// kept, and a matching entry that is not a readable file fails later, when
/// its turn comes in [`MigrationSource::load`]. Non-UTF-8 names are matched
/// lossily.
pub async fn discover(dir: &Path) -> Result<Vec<MigrationSource>> {
    let dir_err = |source| BootstrapError::DirectoryAccessFailure {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_err)?;
    let mut found = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(dir_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_up_migration(&name) {
            found.push(MigrationSource::new(name, entry.path()));
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

/// Adjacent pairs whose numeric prefixes run backwards under name ordering.
pub fn ordering_hazards(sources: &[MigrationSource]) -> Vec<(&str, &str)> {
    sources
        .windows(2)
        .filter_map(|pair| match (pair[0].ordinal_hint, pair[1].ordinal_hint) {
            (Some(a), Some(b)) if a > b => Some((pair[0].name.as_str(), pair[1].name.as_str())),
            _ => None,
        })
        .collect()
}
