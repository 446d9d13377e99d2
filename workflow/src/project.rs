//! Registers the configured project workflow against an [`Engine`].
//!
//! With the stock configuration this is the PBR Viewer workflow: `generate`,
//! `build`, `run`, `br` (build then run) and a trigger that re-generates when
//! either CMake descriptor changes.

use std::path::Path;

use anyhow::{Context, Result};
use buildkit::io::config::{StepConfig, WorkflowConfig};
use buildkit::io::fs::{ensure_dir, refresh_copy};
use tracing::debug;

use crate::engine::{Engine, Step};

/// Declare the project, then its tasks, then its triggers.
pub fn register<E: Engine>(engine: &mut E, cfg: &WorkflowConfig, root: &Path) -> Result<()> {
    engine.new_project(&cfg.project);
    for task in &cfg.tasks {
        let steps = task.steps.iter().map(|step| build_step(step, root)).collect();
        engine
            .add_task(&task.name, steps)
            .with_context(|| format!("register task `{}`", task.name))?;
    }
    for trigger in &cfg.triggers {
        engine
            .add_trigger(&trigger.name, trigger.watch.clone(), trigger.tasks.clone())
            .with_context(|| format!("register trigger `{}`", trigger.name))?;
    }
    debug!(
        project = %cfg.project,
        tasks = cfg.tasks.len(),
        triggers = cfg.triggers.len(),
        "workflow registered"
    );
    Ok(())
}

/// Register the workflow, then block in the engine's loop.
pub fn launch<E: Engine>(engine: &mut E, cfg: &WorkflowConfig, root: &Path) -> Result<()> {
    register(engine, cfg, root)?;
    engine.launch()
}

fn build_step(step: &StepConfig, root: &Path) -> Step {
    match step {
        StepConfig::Shell(command) => Step::Shell(command.clone()),
        StepConfig::EnsureDir(dir) => {
            let path = root.join(dir);
            Step::callback(format!("ensure_dir {}", dir.display()), move || {
                ensure_dir(&path)
            })
        }
        StepConfig::RefreshCopy { from, to } => {
            let label = format!("refresh_copy {} -> {}", from.display(), to.display());
            let from = root.join(from);
            let to = root.join(to);
            Step::callback(label, move || refresh_copy(&from, &to))
        }
        StepConfig::Task(name) => Step::Task(name.clone()),
    }
}
