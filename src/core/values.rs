//! CF-010: Saved-value store, holding what freshness checks compare against.
//!
//! One YAML file per task under the state directory, written atomically.

use indexmap::IndexMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Values saved for one task, keyed by predicate-chosen names.
pub type SavedValues = IndexMap<String, String>;

/// Derive the values file path for a task within the state directory.
pub fn values_path(state_dir: &Path, task: &str) -> PathBuf {
    state_dir.join(task).join("values.yaml")
}

/// Load a task's saved values. Returns an empty set if never saved.
pub fn load_values(state_dir: &Path, task: &str) -> Result<SavedValues, String> {
    let path = values_path(state_dir, task);
    if !path.exists() {
        return Ok(SavedValues::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid values file {}: {}", path.display(), e))
}

/// Save a task's values atomically: a uniquely named temp file in the
/// task's directory is written, then renamed over `values.yaml`.
pub fn save_values(state_dir: &Path, task: &str, values: &SavedValues) -> Result<(), String> {
    let path = values_path(state_dir, task);
    let dir = path.parent().unwrap_or(state_dir);
    std::fs::create_dir_all(dir).map_err(|e| format!("cannot create dir {}: {}", dir.display(), e))?;

    let yaml = serde_yaml_ng::to_string(values).map_err(|e| format!("serialize error: {}", e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".values-")
        .suffix(".yaml.tmp")
        .tempfile_in(dir)
        .map_err(|e| format!("cannot create temp file in {}: {}", dir.display(), e))?;
    tmp.write_all(yaml.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| format!("cannot write {}: {}", tmp.path().display(), e))?;
    tmp.persist(&path)
        .map_err(|e| format!("cannot replace {}: {}", path.display(), e.error))?;

    Ok(())
}
