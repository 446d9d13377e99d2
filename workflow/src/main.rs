//! Development workflow runner.
//!
//! Registers the project's tasks (`generate`, `build`, `run`, `br`) and the
//! CMake re-generate trigger, then either launches the interactive watch loop
//! or dispatches a single task.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use buildkit::exit_codes;
use buildkit::io::config::{BuildkitConfig, config_path, load_config, write_config};
use buildkit::io::fs::resolve_root;
use buildkit::io::shell::{CommandFailedError, SystemShell};
use clap::{Parser, Subcommand};
use tracing::debug;
use workflow::engine::{Engine, LocalEngine};
use workflow::project;

#[derive(Parser)]
#[command(
    name = "workflow",
    version,
    about = "Task-based dev workflow: generate, build, run, with CMake change triggers"
)]
struct Cli {
    /// Project root (contains CMakeLists.txt).
    #[arg(long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Config file (defaults to `<project-dir>/buildkit.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Watch trigger files and dispatch tasks from stdin (default).
    Launch,
    /// Run one task and exit.
    Run {
        /// Task name, e.g. `generate`, `build`, `run`, `br`.
        task: String,
    },
    /// List registered tasks and triggers.
    Tasks,
    /// Write the default `buildkit.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    buildkit::logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("> error! {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let root = resolve_root(&cli.project_dir)?;
    let cfg_path = config_path(&root, cli.config.as_deref());

    match cli.command.unwrap_or(Command::Launch) {
        Command::Init { force } => cmd_init(&cfg_path, force),
        Command::Launch => {
            let (mut engine, cfg) = load_engine(&root, &cfg_path)?;
            project::launch(&mut engine, &cfg.workflow, &root)
        }
        Command::Run { task } => {
            let (mut engine, cfg) = load_engine(&root, &cfg_path)?;
            project::register(&mut engine, &cfg.workflow, &root)?;
            engine.do_task(&task)
        }
        Command::Tasks => {
            let (mut engine, cfg) = load_engine(&root, &cfg_path)?;
            project::register(&mut engine, &cfg.workflow, &root)?;
            print!("{}", engine.describe());
            Ok(())
        }
    }
}

fn load_engine(
    root: &Path,
    cfg_path: &Path,
) -> Result<(LocalEngine<SystemShell>, BuildkitConfig)> {
    let cfg = load_config(cfg_path)?;
    debug!(root = %root.display(), config = %cfg_path.display(), "loaded config");
    let engine = LocalEngine::new(root, SystemShell)
        .with_poll_interval(cfg.workflow.poll_interval())
        .with_command_timeout(cfg.workflow.command_timeout());
    Ok((engine, cfg))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "workflow init: {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    write_config(path, &BuildkitConfig::default())?;
    println!("> wrote {}", path.display());
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<CommandFailedError>().is_some() {
        exit_codes::COMMAND_FAILED
    } else {
        exit_codes::INVALID
    }
}
