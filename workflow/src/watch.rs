//! Blocking watch / dispatch loop behind `Engine::launch`.
//!
//! Two helper threads feed one channel: the debounced polling watcher and a
//! stdin line reader. Tasks always run on the loop's own thread, one at a time.

use std::io::BufRead;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use buildkit::io::shell::Shell;
use notify_debouncer_mini::notify::{self, PollWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer_opt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::console::{ConsoleCommand, HELP, parse_command};
use crate::engine::{Engine, LocalEngine};
use crate::trigger::plan_dispatch;

/// Quiet time before a change is reported, in poll intervals.
const DEBOUNCE_POLLS: u32 = 2;

/// Input to the loop.
#[derive(Debug)]
pub enum LoopEvent {
    /// One debounced batch of changed paths.
    Changes(Vec<PathBuf>),
    Input(String),
    InputClosed,
    WatchError(String),
}

/// Polled, debounced watch over the trigger directories.
///
/// Directories missing at start are retried by [`WatchSet::adopt_appeared`].
/// Polling stops when the set is dropped.
pub struct WatchSet {
    debouncer: Debouncer<PollWatcher>,
    missing: Vec<PathBuf>,
}

impl WatchSet {
    /// Start polling `dirs` (non-recursively), forwarding change batches to `tx`.
    pub fn start(dirs: &[PathBuf], interval: Duration, tx: Sender<LoopEvent>) -> Result<Self> {
        let config = notify_debouncer_mini::Config::default()
            .with_timeout(interval * DEBOUNCE_POLLS)
            .with_notify_config(notify::Config::default().with_poll_interval(interval));
        let debouncer = new_debouncer_opt::<_, PollWatcher>(
            config,
            move |result: DebounceEventResult| {
                let event = match result {
                    Ok(events) => {
                        LoopEvent::Changes(events.into_iter().map(|event| event.path).collect())
                    }
                    Err(err) => LoopEvent::WatchError(err.to_string()),
                };
                let _ = tx.send(event);
            },
        )
        .context("create file watcher")?;

        let mut set = Self {
            debouncer,
            missing: Vec::new(),
        };
        for dir in dirs {
            if !set.watch_dir(dir)? {
                warn!(path = %dir.display(), "watched directory does not exist yet");
                set.missing.push(dir.clone());
            }
        }
        Ok(set)
    }

    /// Directories still waiting to be created.
    pub fn missing(&self) -> &[PathBuf] {
        &self.missing
    }

    /// Start watching directories that appeared since the last call.
    ///
    /// Files already inside them are returned as changed: the watcher's
    /// first scan of a directory reports nothing.
    pub fn adopt_appeared(&mut self) -> Vec<PathBuf> {
        let mut appeared = Vec::new();
        for dir in mem::take(&mut self.missing) {
            match self.watch_dir(&dir) {
                Ok(true) => appeared.extend(files_in(&dir)),
                Ok(false) => self.missing.push(dir),
                Err(err) => {
                    warn!(
                        path = %dir.display(),
                        error = %format!("{err:#}"),
                        "failed to watch directory"
                    );
                    self.missing.push(dir);
                }
            }
        }
        appeared
    }

    fn watch_dir(&mut self, dir: &Path) -> Result<bool> {
        if !dir.is_dir() {
            return Ok(false);
        }
        self.debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", dir.display()))?;
        info!(path = %dir.display(), "watching directory");
        Ok(true)
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Forward stdin lines to `tx` from a background thread.
pub fn spawn_stdin_reader(tx: Sender<LoopEvent>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(LoopEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "failed to read stdin");
                    break;
                }
            }
        }
        let _ = tx.send(LoopEvent::InputClosed);
    });
}

/// Run the loop until `quit` is entered or every event source is gone.
///
/// Each debounced batch is matched as a whole, so a trigger fires once per
/// batch. Events are handled in arrival order: a console command never
/// overtakes a change batch that arrived before it.
pub fn serve<S: Shell>(
    engine: &LocalEngine<S>,
    events: &Receiver<LoopEvent>,
    mut watch: Option<&mut WatchSet>,
) -> Result<()> {
    print_banner(engine);
    let interval = engine.poll_interval();

    loop {
        match events.recv_timeout(interval) {
            Ok(LoopEvent::Changes(paths)) => dispatch_changes(engine, &paths),
            Ok(LoopEvent::Input(line)) => {
                if !handle_command(engine, &line) {
                    info!("quit requested");
                    return Ok(());
                }
            }
            Ok(LoopEvent::InputClosed) => {
                info!("stdin closed, watching for changes only");
            }
            Ok(LoopEvent::WatchError(message)) => {
                warn!(error = %message, "file watcher error");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("all event sources closed");
                return Ok(());
            }
        }

        if let Some(watch) = watch.as_deref_mut() {
            let appeared = watch.adopt_appeared();
            if !appeared.is_empty() {
                dispatch_changes(engine, &appeared);
            }
        }
    }
}

/// Run the tasks of every trigger matched by `changed`.
///
/// Paths that no longer exist are dropped, so deleting a watched file does
/// not fire its trigger.
fn dispatch_changes<S: Shell>(engine: &LocalEngine<S>, changed: &[PathBuf]) {
    let present: Vec<PathBuf> = changed.iter().filter(|path| path.exists()).cloned().collect();
    let dispatch = plan_dispatch(engine.triggers(), engine.root(), &present);
    if dispatch.is_empty() {
        return;
    }
    for trigger in &dispatch.fired {
        println!("> trigger `{trigger}` fired");
    }
    for task in &dispatch.tasks {
        report(task, engine.do_task(task));
    }
}

/// Returns `false` when the loop should stop.
fn handle_command<S: Shell>(engine: &LocalEngine<S>, line: &str) -> bool {
    match parse_command(line) {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => print!("{HELP}"),
        ConsoleCommand::List => print!("{}", engine.describe()),
        ConsoleCommand::Run(task) => report(&task, engine.do_task(&task)),
        ConsoleCommand::Empty => {}
    }
    true
}

fn report(task: &str, result: Result<()>) {
    match result {
        Ok(()) => println!("> task `{task}` finished"),
        Err(err) => {
            warn!(task, error = %format!("{err:#}"), "task failed");
            eprintln!("> error! task `{task}` failed: {err:#}");
        }
    }
}

fn print_banner<S: Shell>(engine: &LocalEngine<S>) {
    let names: Vec<&str> = engine.tasks().iter().map(|t| t.name.as_str()).collect();
    println!(
        "> {} ready: tasks [{}], {} trigger(s). Type `help` for commands.",
        engine.project().unwrap_or("workflow"),
        names.join(", "),
        engine.triggers().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::register;
    use crate::trigger::watch_dirs;
    use buildkit::io::config::WorkflowConfig;
    use buildkit::test_support::{RecordingShell, TestProject};
    use std::fs;
    use std::sync::mpsc;

    const GENERATE: &str = "cd build && cmake .. -G Ninja -D CMAKE_C_COMPILER=clang -D CMAKE_CXX_COMPILER=clang++ -D CMAKE_EXPORT_COMPILE_COMMANDS=ON";

    fn engine_for(root: &Path, shell: RecordingShell) -> LocalEngine<RecordingShell> {
        let mut engine = LocalEngine::new(root, shell).with_poll_interval(Duration::from_millis(20));
        register(&mut engine, &WorkflowConfig::default(), root).expect("register");
        engine
    }

    #[test]
    fn batch_touching_both_descriptors_runs_generate_once() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let engine = engine_for(root, RecordingShell::new());
        let (tx, rx) = mpsc::channel();

        tx.send(LoopEvent::Changes(vec![
            root.join("CMakeLists.txt"),
            root.join("thirdparty/CMakeLists.txt"),
            root.join("assets/shaders/pbr.frag"),
        ]))
        .expect("send");
        drop(tx);

        serve(&engine, &rx, None).expect("serve");

        assert_eq!(engine.shell().commands(), vec![GENERATE]);
        assert!(root.join("build").is_dir());
    }

    #[test]
    fn each_batch_dispatches_separately() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let engine = engine_for(root, RecordingShell::new());
        let (tx, rx) = mpsc::channel();

        tx.send(LoopEvent::Changes(vec![root.join("thirdparty/CMakeLists.txt")]))
            .expect("send");
        tx.send(LoopEvent::Changes(vec![root.join("CMakeLists.txt")]))
            .expect("send");
        drop(tx);

        serve(&engine, &rx, None).expect("serve");

        assert_eq!(engine.shell().commands(), vec![GENERATE, GENERATE]);
    }

    #[test]
    fn deleted_descriptor_does_not_fire() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let engine = engine_for(root, RecordingShell::new());
        fs::remove_file(root.join("CMakeLists.txt")).expect("remove");
        let (tx, rx) = mpsc::channel();

        tx.send(LoopEvent::Changes(vec![root.join("CMakeLists.txt")]))
            .expect("send");
        drop(tx);

        serve(&engine, &rx, None).expect("serve");

        assert!(engine.shell().commands().is_empty());
    }

    #[test]
    fn events_are_handled_in_arrival_order() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let engine = engine_for(root, RecordingShell::new());
        let (tx, rx) = mpsc::channel();

        tx.send(LoopEvent::Changes(vec![root.join("CMakeLists.txt")]))
            .expect("send");
        tx.send(LoopEvent::Input("run".to_string())).expect("send");
        tx.send(LoopEvent::Input("quit".to_string())).expect("send");
        tx.send(LoopEvent::Changes(vec![root.join("CMakeLists.txt")]))
            .expect("send");

        serve(&engine, &rx, None).expect("serve");

        // `run` alone prints help; the batch after `quit` is never handled.
        assert_eq!(engine.shell().commands(), vec![GENERATE]);
    }

    #[test]
    fn failed_task_keeps_the_loop_running() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let engine = engine_for(root, RecordingShell::new().with_exit_codes([1]));
        let (tx, rx) = mpsc::channel();

        tx.send(LoopEvent::Changes(vec![root.join("CMakeLists.txt")]))
            .expect("send");
        tx.send(LoopEvent::Input("generate".to_string()))
            .expect("send");
        tx.send(LoopEvent::InputClosed).expect("send");
        drop(tx);

        serve(&engine, &rx, None).expect("serve");

        assert_eq!(engine.shell().commands(), vec![GENERATE, GENERATE]);
    }

    #[test]
    fn watch_set_adopts_directory_created_later() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        let extra = root.join("extra");
        let (tx, _rx) = mpsc::channel();

        let mut watch =
            WatchSet::start(&[root.to_path_buf(), extra.clone()], Duration::from_millis(20), tx)
                .expect("start");
        assert_eq!(watch.missing(), [extra.clone()]);
        assert!(watch.adopt_appeared().is_empty());

        project.write("extra/CMakeLists.txt", "project(extra)");
        fs::create_dir_all(extra.join("nested")).expect("mkdir");

        assert_eq!(watch.adopt_appeared(), vec![extra.join("CMakeLists.txt")]);
        assert!(watch.missing().is_empty());
        assert!(watch.adopt_appeared().is_empty());
    }

    #[test]
    fn descriptor_in_late_directory_fires_trigger() {
        let project = TestProject::new().expect("project");
        let root = project.path();
        fs::remove_dir_all(root.join("thirdparty")).expect("remove thirdparty");
        let engine = engine_for(root, RecordingShell::new());
        let (tx, rx) = mpsc::channel();
        let dirs = watch_dirs(engine.triggers(), root);
        let mut watch =
            WatchSet::start(&dirs, engine.poll_interval(), tx.clone()).expect("start watch");
        assert_eq!(watch.missing(), [root.join("thirdparty")]);

        project.write("thirdparty/CMakeLists.txt", "add_subdirectory(glfw)");
        tx.send(LoopEvent::Input("tasks".to_string())).expect("send");
        tx.send(LoopEvent::Input("quit".to_string())).expect("send");

        serve(&engine, &rx, Some(&mut watch)).expect("serve");

        assert_eq!(engine.shell().commands(), vec![GENERATE]);
    }
}
