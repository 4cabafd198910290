//! CF-007: Recursive composition builder.
//!
//! Walks a snipet's dependency tree depth-first, dependencies before
//! dependents, threading one environment accumulator through the walk:
//! enter → descend → transform → gate → base path → expand → emit.
//! Every frame works on its own copy of the definition.

use super::expander::{expand_actions, expand_environment, expand_list, expand_uptodates};
use super::registry::SnipetRegistry;
use super::types::*;
use crate::workers::WorkerDirectory;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Composes root definitions into task descriptors.
pub struct Composer<'a> {
    registry: &'a SnipetRegistry,
    workers: &'a WorkerDirectory,
    settings: &'a BuildSettings,
    work_dir: PathBuf,
}

/// Mutable state of one composition request.
struct Session<'t> {
    stack: Vec<String>,
    tasks: &'t mut Vec<TaskDescriptor>,
}

impl<'a> Composer<'a> {
    pub fn new(
        registry: &'a SnipetRegistry,
        workers: &'a WorkerDirectory,
        settings: &'a BuildSettings,
        work_dir: &Path,
    ) -> Self {
        Self {
            registry,
            workers,
            settings,
            work_dir: work_dir.to_path_buf(),
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        self.settings
    }

    pub fn workers(&self) -> &WorkerDirectory {
        self.workers
    }

    /// Compose root task `name` on `platform`, appending descriptors to
    /// `tasks`. Returns the name the root emitted under, if it emitted.
    ///
    /// The root environment starts with `taskName`, `platform`, `osType`,
    /// `cpuType` and the root's own raw environment entries. A `taskSnipet`
    /// reference is merged in and composed under the snipet's name.
    pub fn compose_root(
        &self,
        platform: &str,
        name: &str,
        def: &SnipetDef,
        tasks: &mut Vec<TaskDescriptor>,
    ) -> Result<Option<String>, String> {
        let mut session = Session {
            stack: Vec::new(),
            tasks,
        };
        self.root(&mut session, platform, name, def.clone())
    }

    /// Compose `name` against a caller-supplied environment, looking up
    /// dependencies registered for `os_type`.
    pub fn compose(
        &self,
        os_type: &str,
        name: &str,
        def: &SnipetDef,
        env: &mut Env,
        tasks: &mut Vec<TaskDescriptor>,
    ) -> Result<Option<String>, String> {
        let mut session = Session {
            stack: Vec::new(),
            tasks,
        };
        self.build(&mut session, os_type, name, def.clone(), env)
    }

    fn root(
        &self,
        session: &mut Session,
        platform: &str,
        name: &str,
        mut def: SnipetDef,
    ) -> Result<Option<String>, String> {
        let (os, _) = split_platform(platform);
        let mut env = Env::new();
        env.insert("taskName".to_string(), name.to_string());
        seed_platform(&mut env, platform);
        for fragment in &def.environment {
            env.extend(fragment.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        // Roots run on their platform unless the task snipet names another.
        def.platform = Some(platform.to_string());
        let root_key = format!("root:{}", name);
        let (key, snipet, def) = match def.task_snipet.clone() {
            None => (root_key, name.to_string(), def),
            Some(snipet) => match self.registry.lookup(os, &snipet) {
                Some(registered) => {
                    let mut merged = def;
                    merged.merge(registered);
                    (snipet.clone(), snipet, merged)
                }
                None => {
                    warn!(task = %name, snipet = %snipet, platform = %os, "unknown task snipet; composing root as is");
                    (root_key, name.to_string(), def)
                }
            },
        };

        debug!(task = %name, snipet = %snipet, platform = %platform, "composing root");
        self.build_as(session, os, &key, &snipet, def, &mut env)
    }

    fn build(
        &self,
        session: &mut Session,
        os: &str,
        name: &str,
        def: SnipetDef,
        env: &mut Env,
    ) -> Result<Option<String>, String> {
        self.build_as(session, os, name, name, def, env)
    }

    /// `key` marks the frame on the cycle stack. Roots get their own
    /// namespace so a root may share a name with one of its dependencies.
    fn build_as(
        &self,
        session: &mut Session,
        os: &str,
        key: &str,
        name: &str,
        def: SnipetDef,
        env: &mut Env,
    ) -> Result<Option<String>, String> {
        if def.is_platform_specific()
            && !self.settings.platforms.is_empty()
            && !env.contains_key(PLATFORM_KEY)
        {
            for platform in &self.settings.platforms {
                let mut env = env.clone();
                seed_platform(&mut env, platform);
                let mut def = def.clone();
                def.platform_specific = Some(false);
                let (os, _) = split_platform(platform);
                self.build_as(session, os, key, name, def, &mut env)?;
            }
            return Ok(None);
        }

        if let Some(pos) = session.stack.iter().position(|k| k == key) {
            let mut cycle = session.stack[pos..].to_vec();
            cycle.push(key.to_string());
            return Err(format!("snipet dependency cycle: {}", cycle.join(" -> ")));
        }

        session.stack.push(key.to_string());
        let result = self.frame(session, os, name, def, env);
        session.stack.pop();
        result
    }

    fn frame(
        &self,
        session: &mut Session,
        os: &str,
        name: &str,
        mut def: SnipetDef,
        env: &mut Env,
    ) -> Result<Option<String>, String> {
        // Descend
        for dep in def.snipet_deps.clone() {
            match self.registry.lookup(os, &dep) {
                Some(child) => {
                    self.build(session, os, &dep, child.clone(), env)?;
                }
                None => {
                    warn!(snipet = %name, dependency = %dep, platform = %os, "unknown snipet dependency; skipping it");
                }
            }
        }

        // Transform
        if let Some(transform) = def.transform {
            let mut ctx = TransformCtx::new(self.settings);
            transform(&mut def, env, &mut ctx);
            for (root, root_def) in ctx.spawned {
                match env.get(PLATFORM_KEY).cloned() {
                    Some(platform) => {
                        self.root(session, &platform, &root, root_def)?;
                    }
                    None => {
                        warn!(snipet = %name, task = %root, "no active platform; cannot compose requested root");
                    }
                }
            }
        }

        // Gate
        let platform = def.required_platform().to_string();
        let workers = self.workers.workers_for(&platform, &def.tools);
        if workers.is_empty() {
            warn!(
                snipet = %name,
                platform = %platform,
                tools = ?def.tools,
                "no available workers; skipping descriptor\n{}",
                self.workers.table().describe()
            );
            return Ok(None);
        }

        let Some(base_dir) = self.workers.table().base_path_for(&self.work_dir) else {
            warn!(
                snipet = %name,
                dir = %self.work_dir.display(),
                "working directory is outside every known base directory; skipping descriptor"
            );
            return Ok(None);
        };

        // Expand
        expand_environment(name, &def, env);
        let actions: Vec<ActionLine> = expand_actions(name, &def.actions, env)
            .into_iter()
            .filter(|a| !a.to_line().trim().is_empty())
            .collect();
        let uptodate = expand_uptodates(name, &def.uptodates, env);
        let targets = expand_list(name, &def.targets, env);
        let task_dependencies = expand_list(name, &def.task_dependencies, env);
        let file_dependencies = expand_list(name, &def.file_dependencies, env);

        // Emit
        let Some(base_name) = env.get(TASK_NAME_KEY).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        if actions.is_empty() {
            debug!(snipet = %name, "no actions; contributes environment only");
            return Ok(None);
        }
        let task_name = match env.get(PLATFORM_KEY) {
            Some(p) => format!("{}.{}", base_name, p),
            None => base_name.clone(),
        };
        if session.tasks.iter().any(|t| t.name == task_name) {
            warn!(task = %task_name, snipet = %name, "duplicate task name; keeping the first");
            return Ok(None);
        }

        let worker = def.uses_worker_task().then(|| WorkerTask {
            env: env.clone(),
            tools: def.tools.clone(),
            workers,
            base_dir,
            required_platform: platform,
            estimated_load: def.load(),
        });

        debug!(task = %task_name, snipet = %name, actions = actions.len(), "emitting task");
        session.tasks.push(TaskDescriptor {
            name: task_name.clone(),
            actions,
            targets,
            file_dependencies,
            task_dependencies,
            uptodate,
            worker,
        });
        Ok(Some(task_name))
    }
}

fn seed_platform(env: &mut Env, platform: &str) {
    let (os, cpu) = split_platform(platform);
    env.insert(PLATFORM_KEY.to_string(), platform.to_string());
    env.insert("osType".to_string(), os.to_string());
    env.insert("cpuType".to_string(), cpu.to_string());
}
