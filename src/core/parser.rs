//! CF-002: Engine configuration (TOML) and task descriptions (YAML).
//!
//! Config files are layered: the user file, then the project file, each
//! deep-merged onto the previous with the same merge used for snipets.
//! Description files are found under `desc_paths` and merged the same way.

use super::merge::merge_values;
use super::types::{local_platform, BuildSettings, SnipetDef};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG: &str = "cfbuild.toml";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub build: BuildConfig,
    pub manager: ManagerConfig,
    /// Description files or directories
    pub desc_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub dir: String,
    /// `os-arch` tags; empty means this machine only
    pub platforms: Vec<String>,
    /// Local builds must run inside this directory
    pub base_dir: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dir: "build".to_string(),
            platforms: Vec::new(),
            base_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub host: String,
    /// No port, no remote dispatch
    pub port: Option<u16>,
    pub timeout_secs: u64,
    pub verbose: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            timeout_secs: 300,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Settings handed to the composer.
    pub fn build_settings(&self) -> BuildSettings {
        let platforms = if self.build.platforms.is_empty() {
            vec![local_platform()]
        } else {
            self.build.platforms.clone()
        };
        BuildSettings {
            build_dir: self.build.dir.clone(),
            platforms,
        }
    }
}

/// Root task definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptions {
    pub packages: IndexMap<String, SnipetDef>,
    pub projects: IndexMap<String, SnipetDef>,
}

/// User config then project config.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(
            PathBuf::from(home)
                .join(".config")
                .join("cfbuild")
                .join("config.toml"),
        );
    }
    paths.push(PathBuf::from(PROJECT_CONFIG));
    paths
}

/// Parse one TOML config into a mergeable value.
pub fn parse_config_value(toml_text: &str) -> Result<Value, String> {
    let parsed: toml::Value =
        toml::from_str(toml_text).map_err(|e| format!("TOML parse error: {}", e))?;
    serde_yaml_ng::to_value(parsed).map_err(|e| format!("config conversion error: {}", e))
}

/// Load and layer the config files that exist; missing files are skipped.
pub fn load_engine_config(paths: &[PathBuf]) -> Result<EngineConfig, String> {
    let mut merged = Value::Mapping(Default::default());
    for path in paths {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found; skipping");
            continue;
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        let value =
            parse_config_value(&content).map_err(|e| format!("{}: {}", path.display(), e))?;
        merge_values(&mut merged, value);
    }
    serde_yaml_ng::from_value(merged).map_err(|e| format!("invalid config: {}", e))
}

/// Parse a descriptions document from a string.
pub fn parse_descriptions(yaml: &str) -> Result<Descriptions, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Expand `desc_paths` into description files: files as given, directories
/// searched recursively for `*.yaml` in sorted order.
pub fn find_description_files(desc_paths: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in desc_paths {
        let path = Path::new(entry);
        if path.is_dir() {
            let pattern = format!("{}/**/*.yaml", entry.trim_end_matches('/'));
            match glob::glob(&pattern) {
                Ok(found) => {
                    let mut found: Vec<PathBuf> = found.filter_map(Result::ok).collect();
                    found.sort();
                    files.extend(found);
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "bad description pattern"),
            }
        } else if path.is_file() {
            files.push(path.to_path_buf());
        } else {
            warn!(path = %entry, "description path not found");
        }
    }
    files
}

/// Load and merge every description file. Unparseable files are logged and
/// skipped so one broken file does not hide the rest.
pub fn load_descriptions(desc_paths: &[String]) -> Result<Descriptions, String> {
    let mut merged = Value::Mapping(Default::default());
    for file in find_description_files(desc_paths) {
        let content = std::fs::read_to_string(&file)
            .map_err(|e| format!("failed to read {}: {}", file.display(), e))?;
        match serde_yaml_ng::from_str::<Value>(&content) {
            Ok(Value::Null) => {}
            Ok(value) => merge_values(&mut merged, value),
            Err(e) => warn!(path = %file.display(), error = %e, "cannot parse description file; skipping"),
        }
    }
    serde_yaml_ng::from_value(merged).map_err(|e| format!("invalid descriptions: {}", e))
}
