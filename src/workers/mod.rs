//! CF-006: Worker capability matcher.
//!
//! The platform table maps a tag to either the local machine or the set of
//! remote workers reporting that platform. `any` is always present and
//! always satisfied locally. The table is built once per process, on first
//! use, from a capability source (normally the task manager). If the source
//! fails the table degrades to local-only.

use crate::core::types::{local_platform, ANY_PLATFORM, LOCAL_WORKER};
use crate::transport::protocol::WorkerReport;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// How a platform tag can be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformEntry {
    /// This machine, no remote pool needed
    Local,
    /// Remote workers reporting this platform
    Remote(BTreeSet<String>),
}

/// Platform → workers, worker → tools, and base-directory hints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerTable {
    platforms: IndexMap<String, PlatformEntry>,
    tools: IndexMap<String, BTreeSet<String>>,
    base_dirs: IndexMap<String, String>,
}

impl WorkerTable {
    /// Only `any` and this machine's platform are satisfiable.
    pub fn local_only() -> Self {
        let mut table = Self::default();
        table.platforms.insert(ANY_PLATFORM.to_string(), PlatformEntry::Local);
        table.platforms.insert(local_platform(), PlatformEntry::Local);
        table
    }

    /// Build from a manager report.
    ///
    /// Every `os-arch` pair in `hostTypes` becomes a remote tag. The local
    /// platform is kept local unless remote workers report it.
    pub fn from_report(report: &WorkerReport) -> Self {
        let mut table = Self::default();
        table.platforms.insert(ANY_PLATFORM.to_string(), PlatformEntry::Local);

        for (os, archs) in &report.host_types {
            for arch in archs {
                table
                    .platforms
                    .entry(format!("{}-{}", os, arch).to_lowercase())
                    .or_insert_with(|| PlatformEntry::Remote(BTreeSet::new()));
            }
        }
        for (id, info) in &report.workers {
            if info.platform.is_empty() {
                debug!(worker = %id, "worker reported no platform");
                continue;
            }
            table.add_worker(&info.platform.to_lowercase(), id, &[]);
        }
        for (tool, ids) in &report.tools {
            for id in ids {
                table.tools.entry(id.clone()).or_default().insert(tool.clone());
            }
        }

        let local = local_platform();
        let has_remote = matches!(
            table.platforms.get(&local),
            Some(PlatformEntry::Remote(set)) if !set.is_empty()
        );
        if !has_remote {
            table.platforms.insert(local, PlatformEntry::Local);
        }

        table.base_dirs = report.files.clone();
        table
    }

    /// Let this machine satisfy `platform` as well.
    #[cfg(test)]
    pub(crate) fn add_local_platform(&mut self, platform: &str) {
        self.platforms
            .insert(platform.to_string(), PlatformEntry::Local);
    }

    /// Register a remote worker on `platform` providing `tools`.
    pub fn add_worker(&mut self, platform: &str, id: &str, tools: &[&str]) {
        let entry = self
            .platforms
            .entry(platform.to_string())
            .or_insert_with(|| PlatformEntry::Remote(BTreeSet::new()));
        // A remote worker on the local platform takes it over.
        if *entry == PlatformEntry::Local {
            *entry = PlatformEntry::Remote(BTreeSet::new());
        }
        if let PlatformEntry::Remote(set) = entry {
            set.insert(id.to_string());
        }
        self.tools
            .entry(id.to_string())
            .or_default()
            .extend(tools.iter().map(|t| t.to_string()));
    }

    /// Map local directory `orig` to a working-directory hint.
    pub fn add_base_dir(&mut self, orig: &str, hint: &str) {
        self.base_dirs.insert(orig.to_string(), hint.to_string());
    }

    /// Workers able to run a step needing `platform` and every one of `tools`.
    pub fn workers_for(&self, platform: &str, tools: &[String]) -> Vec<String> {
        match self.platforms.get(platform) {
            None => Vec::new(),
            Some(PlatformEntry::Local) => vec![LOCAL_WORKER.to_string()],
            Some(PlatformEntry::Remote(ids)) => ids
                .iter()
                .filter(|id| {
                    let provided = self.tools.get(*id);
                    tools
                        .iter()
                        .all(|t| provided.is_some_and(|p| p.contains(t)))
                })
                .cloned()
                .collect(),
        }
    }

    /// Whether any worker at all can build for `platform`.
    pub fn can_build_on(&self, platform: &str) -> bool {
        !self.workers_for(platform, &[]).is_empty()
    }

    /// The working-directory hint for `dir`, or `None` when `dir` lies
    /// outside every known base directory. With no base directories known,
    /// `dir` is its own hint.
    pub fn base_path_for(&self, dir: &Path) -> Option<PathBuf> {
        if self.base_dirs.is_empty() {
            return Some(dir.to_path_buf());
        }
        self.base_dirs.iter().find_map(|(orig, hint)| {
            dir.strip_prefix(orig).ok().map(|rest| {
                if rest.as_os_str().is_empty() {
                    PathBuf::from(hint)
                } else {
                    Path::new(hint).join(rest)
                }
            })
        })
    }

    /// YAML rendering for diagnostics.
    pub fn describe(&self) -> String {
        serde_yaml_ng::to_string(self).unwrap_or_else(|e| format!("<unprintable: {}>", e))
    }
}

/// Where the worker table comes from.
pub trait CapabilitySource: Send + Sync {
    fn query(&self) -> Result<WorkerReport, String>;
}

/// Fixed report, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub WorkerReport);

impl CapabilitySource for StaticSource {
    fn query(&self) -> Result<WorkerReport, String> {
        Ok(self.0.clone())
    }
}

/// Process-wide, lazily filled worker table.
///
/// The first caller queries the source; concurrent callers block until that
/// query finishes, then everyone reads the same table.
pub struct WorkerDirectory {
    source: Option<Box<dyn CapabilitySource>>,
    base_dir: Option<PathBuf>,
    table: OnceLock<WorkerTable>,
}

impl WorkerDirectory {
    pub fn new(source: Box<dyn CapabilitySource>) -> Self {
        Self {
            source: Some(source),
            base_dir: None,
            table: OnceLock::new(),
        }
    }

    /// Never queries anything; always local-only.
    pub fn local_only() -> Self {
        Self {
            source: None,
            base_dir: None,
            table: OnceLock::new(),
        }
    }

    /// Local-only, with extra platforms this machine stands in for.
    #[cfg(test)]
    pub(crate) fn local_for(platforms: &[&str]) -> Self {
        let mut table = WorkerTable::local_only();
        for platform in platforms {
            table.add_local_platform(platform);
        }
        Self::from_table(table)
    }

    /// Use an already built table.
    pub fn from_table(table: WorkerTable) -> Self {
        let dir = Self::local_only();
        let _ = dir.table.set(table);
        dir
    }

    /// Restrict local builds to `dir` when the manager reports no base dirs.
    pub fn with_base_dir(mut self, dir: PathBuf) -> Self {
        self.base_dir = Some(dir);
        self
    }

    pub fn table(&self) -> &WorkerTable {
        self.table.get_or_init(|| self.load())
    }

    fn load(&self) -> WorkerTable {
        let mut table = match &self.source {
            None => WorkerTable::local_only(),
            Some(source) => match source.query() {
                Ok(report) => {
                    info!(workers = report.workers.len(), "loaded worker table from task manager");
                    WorkerTable::from_report(&report)
                }
                Err(e) => {
                    info!(error = %e, "task manager unavailable; building locally only");
                    WorkerTable::local_only()
                }
            },
        };
        if table.base_dirs.is_empty() {
            if let Some(dir) = &self.base_dir {
                let dir = dir.to_string_lossy();
                table.add_base_dir(&dir, &dir);
            }
        }
        table
    }

    pub fn workers_for(&self, platform: &str, tools: &[String]) -> Vec<String> {
        self.table().workers_for(platform, tools)
    }

    pub fn can_build_on(&self, platform: &str) -> bool {
        self.table().can_build_on(platform)
    }
}
