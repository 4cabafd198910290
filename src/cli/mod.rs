//! CF-017: CLI subcommands: snipets, workers, tasks, run.

use crate::core::composer::Composer;
use crate::core::generator::generate_tasks;
use crate::core::parser::{self, EngineConfig};
use crate::core::registry::SnipetRegistry;
use crate::core::types::{BuildSettings, TaskDescriptor};
use crate::snipets::register_builtin;
use crate::transport::remote::ManagerClient;
use crate::transport::{Dispatcher, RunStatus};
use crate::workers::WorkerDirectory;
use clap::Subcommand;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered snipets
    Snipets {
        /// Engine config file (default: user config, then ./cfbuild.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print each definition as YAML
        #[arg(long)]
        show: bool,
    },

    /// Show the worker table reported by the task manager
    Workers {
        /// Engine config file (default: user config, then ./cfbuild.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compose every description and print the resulting tasks
    Tasks {
        /// Engine config file (default: user config, then ./cfbuild.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a task and the tasks it depends on
    Run {
        /// Task name, e.g. `all` or `compile-install.cJSON.linux-x86_64`
        task: String,

        /// Engine config file (default: user config, then ./cfbuild.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Run even when up to date
        #[arg(long)]
        force: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Snipets { config, show } => cmd_snipets(config.as_deref(), show),
        Commands::Workers { config } => cmd_workers(config.as_deref()),
        Commands::Tasks { config, json } => cmd_tasks(config.as_deref(), json),
        Commands::Run {
            task,
            config,
            state_dir,
            force,
        } => cmd_run(config.as_deref(), &task, &state_dir, force),
    }
}

/// Everything a command needs: config, snipets, workers.
struct Context {
    config: EngineConfig,
    registry: SnipetRegistry,
    settings: BuildSettings,
    workers: WorkerDirectory,
    dispatcher: Dispatcher,
}

fn load_context(config_path: Option<&Path>) -> Result<Context, String> {
    let paths = match config_path {
        Some(path) => vec![path.to_path_buf()],
        None => parser::default_config_paths(),
    };
    let config = parser::load_engine_config(&paths)?;

    let mut registry = SnipetRegistry::new();
    register_builtin(&mut registry);
    if registry.is_empty() {
        return Err("no snipets registered".to_string());
    }

    let manager = config.manager.port.map(|port| {
        ManagerClient::new(
            &config.manager.host,
            port,
            Duration::from_secs(config.manager.timeout_secs),
            config.manager.verbose,
        )
    });
    let (workers, dispatcher) = match manager {
        Some(client) => (
            WorkerDirectory::new(Box::new(client.clone())),
            Dispatcher::with_manager(client),
        ),
        None => (WorkerDirectory::local_only(), Dispatcher::local_only()),
    };
    let workers = match &config.build.base_dir {
        Some(dir) => workers.with_base_dir(PathBuf::from(dir)),
        None => workers,
    };

    Ok(Context {
        settings: config.build_settings(),
        config,
        registry,
        workers,
        dispatcher,
    })
}

fn compose_all(ctx: &Context) -> Result<Vec<TaskDescriptor>, String> {
    let work_dir =
        std::env::current_dir().map_err(|e| format!("cannot read working directory: {}", e))?;
    let descriptions = parser::load_descriptions(&ctx.config.desc_paths)?;
    let composer = Composer::new(&ctx.registry, &ctx.workers, &ctx.settings, &work_dir);
    generate_tasks(&composer, &descriptions)
}

fn cmd_snipets(config: Option<&Path>, show: bool) -> Result<(), String> {
    let ctx = load_context(config)?;
    println!("{} snipets:", ctx.registry.len());
    for (platform, name, def) in ctx.registry.iter() {
        println!("  {}/{}", platform, name);
        if show {
            let yaml = serde_yaml_ng::to_string(def)
                .map_err(|e| format!("cannot render {}: {}", name, e))?;
            for line in yaml.lines() {
                println!("      {}", line);
            }
        }
    }
    Ok(())
}

fn cmd_workers(config: Option<&Path>) -> Result<(), String> {
    let ctx = load_context(config)?;
    print!("{}", ctx.workers.table().describe());
    Ok(())
}

fn cmd_tasks(config: Option<&Path>, json: bool) -> Result<(), String> {
    let ctx = load_context(config)?;
    let tasks = compose_all(&ctx)?;

    if json {
        let out = serde_json::to_string_pretty(&tasks)
            .map_err(|e| format!("JSON serialization error: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    for task in &tasks {
        println!("{}:", task.name);
        if !task.task_dependencies.is_empty() {
            println!("  after: {}", task.task_dependencies.join(", "));
        }
        if let Some(worker) = &task.worker {
            println!("  workers: {}", worker.workers.join(", "));
        }
        for line in task.action_lines() {
            println!("  $ {}", line);
        }
    }
    println!();
    println!("{} tasks", tasks.len());
    Ok(())
}

/// `name` and its transitive task dependencies, dependencies first.
fn run_order<'t>(tasks: &'t [TaskDescriptor], name: &str) -> Result<Vec<&'t TaskDescriptor>, String> {
    fn visit<'t>(
        tasks: &'t [TaskDescriptor],
        name: &str,
        path: &mut Vec<String>,
        seen: &mut HashSet<String>,
        order: &mut Vec<&'t TaskDescriptor>,
    ) -> Result<(), String> {
        if seen.contains(name) {
            return Ok(());
        }
        if path.iter().any(|p| p == name) {
            path.push(name.to_string());
            return Err(format!("task dependency cycle: {}", path.join(" -> ")));
        }
        let task = tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| match path.last() {
                Some(parent) => format!("unknown task '{}' (needed by '{}')", name, parent),
                None => format!("unknown task '{}'", name),
            })?;

        path.push(name.to_string());
        for dep in &task.task_dependencies {
            visit(tasks, dep, path, seen, order)?;
        }
        path.pop();

        seen.insert(name.to_string());
        order.push(task);
        Ok(())
    }

    let mut order = Vec::new();
    visit(tasks, name, &mut Vec::new(), &mut HashSet::new(), &mut order)?;
    Ok(order)
}

fn cmd_run(config: Option<&Path>, name: &str, state_dir: &Path, force: bool) -> Result<(), String> {
    let ctx = load_context(config)?;
    let tasks = compose_all(&ctx)?;
    let order = run_order(&tasks, name)?;

    let mut ran = 0;
    let mut fresh = 0;
    for task in order {
        if task.actions.is_empty() {
            continue;
        }
        match ctx.dispatcher.run(task, state_dir, force)? {
            RunStatus::UpToDate => {
                println!("-- {} (up to date)", task.name);
                fresh += 1;
            }
            RunStatus::Ran(out) => {
                println!(".  {}", task.name);
                print!("{}", out.stdout);
                eprint!("{}", out.stderr);
                if !out.success() {
                    return Err(format!(
                        "task {} failed with exit code {}",
                        task.name, out.exit_code
                    ));
                }
                ran += 1;
            }
        }
    }

    info!(ran, up_to_date = fresh, "run complete");
    Ok(())
}
