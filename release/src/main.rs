//! Clean release build of the PBR Viewer.
//!
//! Wipes `build/` and `binary/`, runs CMake (configure + compile), then
//! collects the executable and `assets/` into `binary/`.

mod builder;

use std::path::PathBuf;

use anyhow::Result;
use buildkit::exit_codes;
use buildkit::io::config::{config_path, load_config};
use buildkit::io::fs::resolve_root;
use buildkit::io::shell::{CommandFailedError, SystemShell};
use clap::Parser;
use tracing::{debug, info};

use crate::builder::{MissingExecutableError, build_release};

#[derive(Parser)]
#[command(
    name = "release",
    version,
    about = "Clean release build: CMake configure + compile, then collect the binary and assets"
)]
struct Cli {
    /// Project root (contains CMakeLists.txt and assets/).
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Config file (defaults to `<project-dir>/buildkit.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    buildkit::logging::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("> error! {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let root = resolve_root(&cli.project_dir)?;
    let cfg_path = config_path(&root, cli.config.as_deref());
    let cfg = load_config(&cfg_path)?;
    debug!(root = %root.display(), config = %cfg_path.display(), "loaded config");
    let outcome = build_release(&root, &cfg.release, &SystemShell)?;
    info!(
        executable = %outcome.executable.display(),
        installed = %outcome.installed.display(),
        output_dir = %outcome.output_dir.display(),
        "release build complete"
    );
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<MissingExecutableError>().is_some() {
        exit_codes::MISSING_EXECUTABLE
    } else if err.downcast_ref::<CommandFailedError>().is_some() {
        exit_codes::COMMAND_FAILED
    } else {
        exit_codes::INVALID
    }
}
