//! CF-008: Freshness predicates.
//!
//! A closed set of up-to-date checks built from structured data. Each check
//! compares against values saved after the last successful build and names
//! the values to save after the next one.

use super::hasher;
use super::types::TaskDescriptor;
use super::values::SavedValues;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// Key used by version checks unless told otherwise.
pub const SAVED_VERSION_KEY: &str = "saved-version";

/// An expanded freshness predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FreshnessCheck {
    /// Fresh while `previous[key] == version`
    VersionMatches { key: String, version: String },
    /// Fresh while the file's BLAKE3 hash equals the saved one
    FileUnchanged { path: String },
}

impl FreshnessCheck {
    /// Version check under the default key.
    pub fn version(version: String) -> Self {
        Self::VersionMatches {
            key: SAVED_VERSION_KEY.to_string(),
            version,
        }
    }

    /// Evaluate against the previous run's values. Errors count as stale.
    pub fn evaluate(&self, task: &TaskDescriptor, previous: &SavedValues) -> bool {
        match self.try_evaluate(previous) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(task = %task.name, check = ?self, error = %e, "freshness check failed; forcing rebuild");
                false
            }
        }
    }

    fn try_evaluate(&self, previous: &SavedValues) -> Result<bool, String> {
        match self {
            Self::VersionMatches { key, version } => {
                Ok(previous.get(key).map(String::as_str).unwrap_or("") == version)
            }
            Self::FileUnchanged { path } => {
                let current = hasher::file_digest(Path::new(path))?;
                Ok(previous.get(&file_key(path)) == Some(&current))
            }
        }
    }

    /// The values to persist once the task has built successfully.
    pub fn saved_values(&self) -> Result<Vec<(String, String)>, String> {
        match self {
            Self::VersionMatches { key, version } => Ok(vec![(key.clone(), version.clone())]),
            Self::FileUnchanged { path } => {
                let hash = hasher::file_digest(Path::new(path))?;
                Ok(vec![(file_key(path), hash)])
            }
        }
    }
}

fn file_key(path: &str) -> String {
    format!("file-hash:{}", path)
}

/// A task is up to date when it has at least one predicate, every predicate
/// holds, and every target exists.
pub fn is_up_to_date(task: &TaskDescriptor, previous: &SavedValues) -> bool {
    if task.uptodate.is_empty() {
        return false;
    }
    task.uptodate.iter().all(|c| c.evaluate(task, previous))
        && task.targets.iter().all(|t| Path::new(t).exists())
}

/// Collect the values all of a task's predicates want saved.
pub fn collect_saved_values(task: &TaskDescriptor) -> SavedValues {
    let mut values = SavedValues::new();
    for check in &task.uptodate {
        match check.saved_values() {
            Ok(pairs) => values.extend(pairs),
            Err(e) => warn!(task = %task.name, error = %e, "cannot record freshness value"),
        }
    }
    values
}
