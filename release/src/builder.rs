//! Clean release build: wipe, configure, compile, collect.
//!
//! The output directory ends up holding the executable under its fixed
//! output name plus a full copy of the asset tree:
//!
//! ```text
//! binary/
//! ├── assets/...
//! └── PBRV(.exe)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use buildkit::io::config::{ExecutableCandidate, ReleaseConfig};
use buildkit::io::fs::{copy_file, copy_tree, recreate_dir};
use buildkit::io::shell::{Shell, ShellRequest, run_checked};
use tracing::{debug, info, instrument};

/// Directory name of the asset copy inside the output directory.
const ASSETS_OUTPUT: &str = "assets";

/// Summary of a successful release build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Candidate path the executable was found at.
    pub executable: PathBuf,
    /// Where the executable was copied to.
    pub installed: PathBuf,
    pub output_dir: PathBuf,
}

/// The build finished but none of the expected executables exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingExecutableError {
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for MissingExecutableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let searched: Vec<String> = self
            .searched
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        write!(
            f,
            "failed to find executable in build directory; it seems that project building failed (searched: {})",
            searched.join(", ")
        )
    }
}

impl std::error::Error for MissingExecutableError {}

/// Run a full release build of the project at `root`.
///
/// Any CMake invocation that does not exit successfully aborts the build.
/// The executable is located before anything is copied, so a failed build
/// leaves the output directory empty.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn build_release<S: Shell>(
    root: &Path,
    cfg: &ReleaseConfig,
    shell: &S,
) -> Result<ReleaseOutcome> {
    let build_dir = root.join(&cfg.build_dir);
    let output_dir = root.join(&cfg.output_dir);
    let timeout = cfg.command_timeout();

    println!("> creating directories...");
    recreate_dir(&build_dir).context("clean build directory")?;
    recreate_dir(&output_dir).context("clean output directory")?;

    println!("> generating cmake project...");
    let generate = ShellRequest::new(generate_command(cfg), &build_dir).with_timeout(timeout);
    run_checked(shell, &generate).context("generate cmake project")?;

    println!("> building project...");
    let compile = ShellRequest::new(compile_command(cfg), &build_dir).with_timeout(timeout);
    run_checked(shell, &compile).context("build project")?;

    let candidate = locate_executable(root, &cfg.executables).ok_or_else(|| {
        MissingExecutableError {
            searched: cfg.executables.iter().map(|c| root.join(&c.path)).collect(),
        }
    })?;
    let executable = root.join(&candidate.path);
    info!(executable = %executable.display(), "found executable");

    copy_tree(&root.join(&cfg.assets_dir), &output_dir.join(ASSETS_OUTPUT))
        .context("copy assets")?;
    let installed = output_dir.join(&candidate.output_name);
    copy_file(&executable, &installed).context("copy executable")?;

    println!(
        "\n> successfully build project! output is in {} directory.",
        output_dir.display()
    );
    Ok(ReleaseOutcome {
        executable,
        installed,
        output_dir,
    })
}

/// First candidate (in configured order) that exists as a file under `root`.
pub fn locate_executable<'a>(
    root: &Path,
    candidates: &'a [ExecutableCandidate],
) -> Option<&'a ExecutableCandidate> {
    candidates.iter().find(|candidate| {
        let path = root.join(&candidate.path);
        let found = path.is_file();
        debug!(path = %path.display(), found, "probing executable candidate");
        found
    })
}

fn generate_command(cfg: &ReleaseConfig) -> String {
    join_command(&[&cfg.cmake, "..", &cfg.generate_flags])
}

fn compile_command(cfg: &ReleaseConfig) -> String {
    join_command(&[&cfg.cmake, "--build", ".", &cfg.build_flags])
}

fn join_command(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
