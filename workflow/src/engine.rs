//! Task/trigger engine.
//!
//! [`Engine`] is the surface a workflow definition registers against:
//! declare a project, add tasks and triggers, dispatch tasks, and finally
//! hand control to the blocking loop. [`LocalEngine`] runs everything
//! in-process on top of a [`Shell`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use buildkit::io::shell::{Shell, ShellRequest, run_checked};
use tracing::{debug, info, instrument};

use crate::trigger::{Trigger, watch_dirs};
use crate::watch::{WatchSet, serve, spawn_stdin_reader};

/// Zero-argument local action run as a task step.
pub type Callback = Box<dyn Fn() -> Result<()>>;

/// One step of a task.
pub enum Step {
    /// Shell command run from the project root.
    Shell(String),
    /// Local action; `label` is what listings and logs show.
    Callback { label: String, run: Callback },
    /// Dispatch another registered task.
    Task(String),
}

impl Step {
    pub fn callback(label: impl Into<String>, run: impl Fn() -> Result<()> + 'static) -> Self {
        Step::Callback {
            label: label.into(),
            run: Box::new(run),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Shell(command) => write!(f, "{command}"),
            Step::Callback { label, .. } => write!(f, "{label}"),
            Step::Task(name) => write!(f, "task {name}"),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Shell(command) => f.debug_tuple("Shell").field(command).finish(),
            Step::Callback { label, .. } => f.debug_tuple("Callback").field(label).finish(),
            Step::Task(name) => f.debug_tuple("Task").field(name).finish(),
        }
    }
}

/// A named, ordered list of steps.
#[derive(Debug)]
pub struct Task {
    pub name: String,
    pub steps: Vec<Step>,
}

/// A task name that was never registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTaskError {
    pub name: String,
}

impl fmt::Display for UnknownTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task `{}`", self.name)
    }
}

impl std::error::Error for UnknownTaskError {}

/// A task ended up dispatching itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCycleError {
    /// Dispatch chain, starting and ending with the repeated task.
    pub chain: Vec<String>,
}

impl fmt::Display for TaskCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task cycle detected: {}", self.chain.join(" -> "))
    }
}

impl std::error::Error for TaskCycleError {}

/// Registration and dispatch surface of a workflow controller.
pub trait Engine {
    /// Declare the project the following registrations belong to.
    fn new_project(&mut self, name: &str);

    /// Register a task. Names are unique and a task needs at least one step.
    fn add_task(&mut self, name: &str, steps: Vec<Step>) -> Result<()>;

    /// Register a trigger that runs `tasks` when any of `watched` changes.
    fn add_trigger(&mut self, name: &str, watched: Vec<PathBuf>, tasks: Vec<String>) -> Result<()>;

    /// Run a task's steps in order, stopping at the first failure.
    fn do_task(&self, name: &str) -> Result<()>;

    /// Block in the watch / dispatch loop.
    fn launch(&mut self) -> Result<()>;
}

/// In-process engine running shell steps through `S`.
pub struct LocalEngine<S: Shell> {
    root: PathBuf,
    shell: S,
    project: Option<String>,
    tasks: Vec<Task>,
    triggers: Vec<Trigger>,
    poll_interval: Duration,
    command_timeout: Option<Duration>,
}

impl<S: Shell> LocalEngine<S> {
    pub fn new(root: impl Into<PathBuf>, shell: S) -> Self {
        Self {
            root: root.into(),
            shell,
            project: None,
            tasks: Vec::new(),
            triggers: Vec::new(),
            poll_interval: Duration::from_millis(100),
            command_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// Human-readable listing of tasks and triggers.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(project) = &self.project {
            out.push_str(&format!("project: {project}\n"));
        }
        out.push_str("tasks:\n");
        for task in &self.tasks {
            out.push_str(&format!("  {}\n", task.name));
            for step in &task.steps {
                out.push_str(&format!("    - {step}\n"));
            }
        }
        if !self.triggers.is_empty() {
            out.push_str("triggers:\n");
            for trigger in &self.triggers {
                let watched: Vec<String> = trigger
                    .watch
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                out.push_str(&format!(
                    "  {}: {} -> {}\n",
                    trigger.name,
                    watched.join(", "),
                    trigger.tasks.join(", ")
                ));
            }
        }
        out
    }

    fn run_task(&self, name: &str, stack: &mut Vec<String>) -> Result<()> {
        if stack.iter().any(|active| active == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(TaskCycleError { chain }.into());
        }
        let task = self.task(name).ok_or_else(|| UnknownTaskError {
            name: name.to_string(),
        })?;

        println!("> task `{name}`");
        stack.push(name.to_string());
        for (index, step) in task.steps.iter().enumerate() {
            debug!(task = name, index, step = %step, "running step");
            match step {
                Step::Shell(command) => {
                    println!("> {command}");
                    let request = ShellRequest::new(command.as_str(), &self.root)
                        .with_timeout(self.command_timeout);
                    run_checked(&self.shell, &request)
                        .with_context(|| format!("task `{name}` step {}", index + 1))?;
                }
                Step::Callback { label, run } => {
                    run().with_context(|| format!("task `{name}` step {} ({label})", index + 1))?;
                }
                Step::Task(target) => self.run_task(target, stack)?,
            }
        }
        stack.pop();
        Ok(())
    }
}

impl<S: Shell> Engine for LocalEngine<S> {
    fn new_project(&mut self, name: &str) {
        info!(project = name, "new project");
        self.project = Some(name.to_string());
    }

    fn add_task(&mut self, name: &str, steps: Vec<Step>) -> Result<()> {
        if name.trim().is_empty() {
            bail!("task name must be non-empty");
        }
        if self.task(name).is_some() {
            bail!("task `{name}` is already registered");
        }
        if steps.is_empty() {
            bail!("task `{name}` has no steps");
        }
        debug!(task = name, steps = steps.len(), "registered task");
        self.tasks.push(Task {
            name: name.to_string(),
            steps,
        });
        Ok(())
    }

    fn add_trigger(&mut self, name: &str, watched: Vec<PathBuf>, tasks: Vec<String>) -> Result<()> {
        if name.trim().is_empty() {
            bail!("trigger name must be non-empty");
        }
        if watched.is_empty() {
            bail!("trigger `{name}` watches no files");
        }
        for task in &tasks {
            if self.task(task).is_none() {
                return Err(UnknownTaskError { name: task.clone() })
                    .with_context(|| format!("register trigger `{name}`"));
            }
        }
        debug!(trigger = name, watched = watched.len(), "registered trigger");
        self.triggers.push(Trigger {
            name: name.to_string(),
            watch: watched,
            tasks,
        });
        Ok(())
    }

    #[instrument(skip(self))]
    fn do_task(&self, name: &str) -> Result<()> {
        self.run_task(name, &mut Vec::new())
    }

    fn launch(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let dirs = watch_dirs(&self.triggers, &self.root);
        // Dropping the watch set stops polling; keep it alive for the loop.
        let mut watch = WatchSet::start(&dirs, self.poll_interval, tx.clone())?;
        spawn_stdin_reader(tx);
        serve(self, &rx, Some(&mut watch))
    }
}
