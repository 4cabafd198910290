//! CF-011: Root-task generation.
//!
//! Composes every package and project description on every buildable
//! platform, then adds aggregate tasks: `all`, plus one group per name
//! prefix (the text before the first `-`).

use super::composer::Composer;
use super::parser::Descriptions;
use super::types::{local_platform, TaskDescriptor};
use indexmap::IndexMap;
use tracing::{info, warn};

/// Name of the aggregate task depending on every root.
pub const ALL_TASK: &str = "all";

/// Compose all descriptions into task descriptors.
pub fn generate_tasks(
    composer: &Composer,
    descriptions: &Descriptions,
) -> Result<Vec<TaskDescriptor>, String> {
    let mut platforms = composer.settings().platforms.clone();
    if platforms.is_empty() {
        platforms.push(local_platform());
    }

    let mut tasks = Vec::new();
    let mut roots = Vec::new();
    for platform in &platforms {
        if !composer.workers().can_build_on(platform) {
            info!(platform = %platform, "no workers for platform; skipping");
            continue;
        }
        for (name, def) in descriptions.packages.iter().chain(&descriptions.projects) {
            if let Some(emitted) = composer.compose_root(platform, name, def, &mut tasks)? {
                roots.push(emitted);
            }
        }
    }

    if roots.is_empty() {
        return Ok(tasks);
    }

    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for root in &roots {
        let prefix = root.split('-').next().unwrap_or(root);
        groups.entry(prefix.to_string()).or_default().push(root.clone());
    }

    let mut aggregates = vec![TaskDescriptor::group(ALL_TASK, roots)];
    aggregates.extend(
        groups
            .into_iter()
            .map(|(prefix, names)| TaskDescriptor::group(&prefix, names)),
    );
    for group in aggregates {
        if tasks.iter().any(|t| t.name == group.name) {
            warn!(task = %group.name, "aggregate task name clashes with a composed task; skipping it");
            continue;
        }
        tasks.push(group);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::SnipetRegistry;
    use crate::core::types::BuildSettings;
    use crate::workers::{WorkerDirectory, WorkerTable};
    use std::path::Path;

    const DESC: &str = r#"
packages:
  zlib:
    environment:
      doitTaskName: compile-$taskName
    actions: [make]
  cjson:
    environment:
      doitTaskName: compile-$taskName
    actions: [make]
projects:
  guide:
    environment:
      doitTaskName: latex-$taskName
    actions: [lualatex guide.tex]
  notes:
    environment: {}
"#;

    fn descriptions() -> Descriptions {
        serde_yaml_ng::from_str(DESC).unwrap()
    }

    #[test]
    fn test_cf011_generate_with_groups() {
        let reg = SnipetRegistry::new();
        let mut table = WorkerTable::local_only();
        table.add_worker("linux-arm", "pi", &[]);
        let workers = WorkerDirectory::from_table(table);
        let settings = BuildSettings {
            build_dir: "build".into(),
            platforms: vec!["linux-arm".into()],
        };
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));

        let tasks = generate_tasks(&composer, &descriptions()).unwrap();
        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "compile-zlib.linux-arm",
                "compile-cjson.linux-arm",
                "latex-guide.linux-arm",
                "all",
                "compile",
                "latex",
            ]
        );
        let all = &tasks[3];
        assert!(all.actions.is_empty());
        assert_eq!(all.task_dependencies.len(), 3);
        assert_eq!(
            tasks[4].task_dependencies,
            vec!["compile-zlib.linux-arm", "compile-cjson.linux-arm"]
        );
    }

    #[test]
    fn test_cf011_roots_gate_on_platform_tools() {
        let reg = SnipetRegistry::new();
        let mut table = WorkerTable::local_only();
        table.add_worker("linux-aarch64", "pi-1", &["make"]);
        table.add_worker("linux-riscv64", "rv-1", &["gcc"]);
        let workers = WorkerDirectory::from_table(table);
        let settings = BuildSettings {
            build_dir: "build".into(),
            platforms: vec!["linux-aarch64".into(), "linux-riscv64".into()],
        };
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));
        let desc: Descriptions = serde_yaml_ng::from_str(
            r#"
packages:
  zlib:
    environment:
      doitTaskName: compile-$taskName
    actions: [make]
    tools: [gcc]
    useWorkerTask: true
"#,
        )
        .unwrap();

        let tasks = generate_tasks(&composer, &desc).unwrap();
        assert!(tasks.iter().all(|t| !t.name.ends_with("linux-aarch64")));
        let riscv = tasks
            .iter()
            .find(|t| t.name == "compile-zlib.linux-riscv64")
            .unwrap();
        let worker = riscv.worker.as_ref().unwrap();
        assert_eq!(worker.workers, vec!["rv-1"]);
        assert_eq!(worker.required_platform, "linux-riscv64");
        assert_eq!(
            tasks.iter().find(|t| t.name == ALL_TASK).unwrap().task_dependencies,
            vec!["compile-zlib.linux-riscv64"]
        );
    }

    #[test]
    fn test_cf011_skips_unbuildable_platforms() {
        let reg = SnipetRegistry::new();
        let workers = WorkerDirectory::from_table(WorkerTable::local_only());
        let settings = BuildSettings {
            build_dir: "build".into(),
            platforms: vec!["plan9-mips".into()],
        };
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));
        assert!(generate_tasks(&composer, &descriptions()).unwrap().is_empty());
    }

    #[test]
    fn test_cf011_defaults_to_local_platform() {
        let reg = SnipetRegistry::new();
        let workers = WorkerDirectory::local_only();
        let settings = BuildSettings::default();
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));
        let tasks = generate_tasks(&composer, &descriptions()).unwrap();
        let expected = format!("compile-zlib.{}", local_platform());
        assert_eq!(tasks[0].name, expected);
    }

    #[test]
    fn test_cf011_cycle_fails_generation() {
        let mut reg = SnipetRegistry::new();
        let looped: crate::core::types::SnipetDef =
            serde_yaml_ng::from_str("snipetDeps: [loop]").unwrap();
        reg.register("linux", "loop", looped);
        let desc: Descriptions =
            serde_yaml_ng::from_str("projects:\n  x:\n    taskSnipet: loop\n").unwrap();
        let mut table = WorkerTable::local_only();
        table.add_worker("linux-x86_64", "w", &[]);
        let workers = WorkerDirectory::from_table(table);
        let settings = BuildSettings {
            build_dir: "build".into(),
            platforms: vec!["linux-x86_64".into()],
        };
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));
        let err = generate_tasks(&composer, &desc).unwrap_err();
        assert!(err.contains("loop -> loop"));
    }

    #[test]
    fn test_cf011_nothing_emitted_no_aggregates() {
        let reg = SnipetRegistry::new();
        let workers = WorkerDirectory::local_only();
        let settings = BuildSettings::default();
        let composer = Composer::new(&reg, &workers, &settings, Path::new("/src"));
        let desc: Descriptions = serde_yaml_ng::from_str("projects:\n  quiet: {}\n").unwrap();
        assert!(generate_tasks(&composer, &desc).unwrap().is_empty());
    }
}
