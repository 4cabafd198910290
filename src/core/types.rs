//! CF-001: Snipet definitions, environments, and task descriptors.
//!
//! Snipet definitions are the templates; task descriptors are what the
//! composer hands to the external task executor. All declarative types derive
//! Serialize/Deserialize so task descriptions can be written in YAML.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::freshness::FreshnessCheck;

/// The shared variable accumulator. Insertion order is preserved so dumps
/// and generated scripts are deterministic.
pub type Env = IndexMap<String, String>;

/// One scope layer of a snipet's `environment` list.
pub type EnvFragment = IndexMap<String, String>;

/// Identity of the synthetic worker that stands for "this machine".
pub const LOCAL_WORKER: &str = "local";

/// Platform tag every worker table satisfies.
pub const ANY_PLATFORM: &str = "any";

/// Env key holding the resolved descriptor name.
pub const TASK_NAME_KEY: &str = "doitTaskName";

/// Env key holding the active platform tag.
pub const PLATFORM_KEY: &str = "platform";

// ============================================================================
// Snipet definitions
// ============================================================================

/// A snipet transform, run once the dependency environment is visible.
pub type TransformFn = fn(&mut SnipetDef, &mut Env, &mut TransformCtx);

/// A named, composable build-step template.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnipetDef {
    /// Scope layers, expanded strictly in order
    #[serde(default, deserialize_with = "one_or_many")]
    pub environment: Vec<EnvFragment>,

    /// Shell action lines
    #[serde(default)]
    pub actions: Vec<ActionLine>,

    /// Snipets composed before this one
    #[serde(default)]
    pub snipet_deps: Vec<String>,

    /// Tools a worker must provide
    #[serde(default)]
    pub tools: Vec<String>,

    /// Required platform tag (`any` when absent)
    #[serde(default)]
    pub platform: Option<String>,

    /// Fan out once per configured platform
    #[serde(default)]
    pub platform_specific: Option<bool>,

    /// Registered snipet merged into this (root) definition
    #[serde(default)]
    pub task_snipet: Option<String>,

    /// Freshness predicates (templated)
    #[serde(default)]
    pub uptodates: Vec<UptodateSpec>,

    /// Target paths (templated)
    #[serde(default)]
    pub targets: Vec<String>,

    /// File dependencies (templated)
    #[serde(default)]
    pub file_dependencies: Vec<String>,

    /// Task dependencies (templated)
    #[serde(default)]
    pub task_dependencies: Vec<String>,

    /// Relative load weight for the task manager's admission control
    #[serde(default)]
    pub estimated_load: Option<f64>,

    /// Route the emitted task through the dispatch bridge
    #[serde(default)]
    pub use_worker_task: Option<bool>,

    /// Snipet-specific structured data read by transforms
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_yaml_ng::Value>,

    /// Programmatic hook; never serialized
    #[serde(skip)]
    pub transform: Option<TransformFn>,
}

impl fmt::Debug for SnipetDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnipetDef")
            .field("environment", &self.environment)
            .field("actions", &self.actions)
            .field("snipet_deps", &self.snipet_deps)
            .field("tools", &self.tools)
            .field("platform", &self.platform)
            .field("platform_specific", &self.platform_specific)
            .field("task_snipet", &self.task_snipet)
            .field("uptodates", &self.uptodates)
            .field("targets", &self.targets)
            .field("file_dependencies", &self.file_dependencies)
            .field("task_dependencies", &self.task_dependencies)
            .field("estimated_load", &self.estimated_load)
            .field("use_worker_task", &self.use_worker_task)
            .field("extra", &self.extra)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl SnipetDef {
    /// Required platform, defaulting to `any`.
    pub fn required_platform(&self) -> &str {
        self.platform.as_deref().unwrap_or(ANY_PLATFORM)
    }

    pub fn is_platform_specific(&self) -> bool {
        self.platform_specific.unwrap_or(false)
    }

    pub fn uses_worker_task(&self) -> bool {
        self.use_worker_task.unwrap_or(false)
    }

    /// Load weight, defaulting to 0.5.
    pub fn load(&self) -> f64 {
        self.estimated_load.unwrap_or(0.5)
    }

    /// Look up a key in the environment fragments, first match wins.
    pub fn find_env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find_map(|frag| frag.get(key).map(String::as_str))
    }
}

/// Accept either a single mapping or a list of mappings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<EnvFragment>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(EnvFragment),
        Many(Vec<EnvFragment>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(frag) => vec![frag],
        OneOrMany::Many(frags) => frags,
    })
}

/// A shell action line: a literal command or parts joined with spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionLine {
    Literal(String),
    Composite(Vec<String>),
}

impl ActionLine {
    /// Render as a single shell line.
    pub fn to_line(&self) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Composite(parts) => parts.join(" "),
        }
    }
}

impl From<&str> for ActionLine {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

/// Declarative freshness predicate, before variable expansion.
///
/// Written in YAML as a one-key mapping, e.g. `- check_version: $repoVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UptodateEntry", into = "UptodateEntry")]
pub enum UptodateSpec {
    /// Fresh while the saved version equals this (templated) version
    CheckVersion(String),
    /// Fresh while the (templated) file hashes the same as last build
    FileUnchanged(String),
}

/// YAML shape of one `uptodates` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct UptodateEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_unchanged: Option<String>,
}

impl TryFrom<UptodateEntry> for UptodateSpec {
    type Error = String;

    fn try_from(entry: UptodateEntry) -> Result<Self, String> {
        match (entry.check_version, entry.file_unchanged) {
            (Some(version), None) => Ok(Self::CheckVersion(version)),
            (None, Some(path)) => Ok(Self::FileUnchanged(path)),
            (None, None) => Err("uptodate entry needs check_version or file_unchanged".to_string()),
            (Some(_), Some(_)) => {
                Err("uptodate entry takes one of check_version or file_unchanged, not both".to_string())
            }
        }
    }
}

impl From<UptodateSpec> for UptodateEntry {
    fn from(spec: UptodateSpec) -> Self {
        match spec {
            UptodateSpec::CheckVersion(version) => Self {
                check_version: Some(version),
                ..Default::default()
            },
            UptodateSpec::FileUnchanged(path) => Self {
                file_unchanged: Some(path),
                ..Default::default()
            },
        }
    }
}

// ============================================================================
// Transform context
// ============================================================================

/// Build-wide settings visible to snipet transforms.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Root build directory
    pub build_dir: String,
    /// Configured platforms for fan-out
    pub platforms: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            build_dir: "build".to_string(),
            platforms: Vec::new(),
        }
    }
}

/// Handed to a transform: read-only settings plus a queue of extra root
/// compositions the transform asks for.
#[derive(Debug)]
pub struct TransformCtx<'a> {
    pub settings: &'a BuildSettings,
    pub spawned: Vec<(String, SnipetDef)>,
}

impl<'a> TransformCtx<'a> {
    pub fn new(settings: &'a BuildSettings) -> Self {
        Self {
            settings,
            spawned: Vec::new(),
        }
    }

    /// Request that `name` be composed as a root task on the active platform.
    pub fn spawn_root(&mut self, name: &str, def: SnipetDef) {
        self.spawned.push((name.to_string(), def));
    }
}

// ============================================================================
// Task descriptors
// ============================================================================

/// The fully resolved unit handed to the external task executor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub name: String,
    pub actions: Vec<ActionLine>,
    pub targets: Vec<String>,
    pub file_dependencies: Vec<String>,
    pub task_dependencies: Vec<String>,
    pub uptodate: Vec<FreshnessCheck>,
    /// Present when the task runs through the dispatch bridge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerTask>,
}

impl TaskDescriptor {
    /// An aggregate task: no actions, only task dependencies.
    pub fn group(name: &str, task_dependencies: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            actions: Vec::new(),
            targets: Vec::new(),
            file_dependencies: Vec::new(),
            task_dependencies,
            uptodate: Vec::new(),
            worker: None,
        }
    }

    /// Action lines rendered for a shell.
    pub fn action_lines(&self) -> Vec<String> {
        self.actions.iter().map(ActionLine::to_line).collect()
    }
}

/// Everything the dispatch bridge needs to run a descriptor elsewhere.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    /// Snapshot of the accumulated environment
    pub env: Env,
    pub tools: Vec<String>,
    /// Workers the matcher found capable
    pub workers: Vec<String>,
    /// Working-directory hint for the remote side
    pub base_dir: PathBuf,
    pub required_platform: String,
    pub estimated_load: f64,
}

impl WorkerTask {
    /// True when only the synthetic local worker is capable.
    pub fn is_local_only(&self) -> bool {
        self.workers.is_empty() || self.workers.iter().all(|w| w == LOCAL_WORKER)
    }
}

/// This machine's platform tag, e.g. `linux-x86_64`.
pub fn local_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH).to_lowercase()
}

/// Split `os-arch` into its parts. A tag without `-` has an empty arch.
pub fn split_platform(platform: &str) -> (&str, &str) {
    platform.split_once('-').unwrap_or((platform, ""))
}

// ============================================================================
// Tests
// ============================================================================
