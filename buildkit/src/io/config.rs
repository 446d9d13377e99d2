//! Build tool configuration stored in `buildkit.toml` at the project root.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default file name, resolved against the project root.
pub const CONFIG_FILE_NAME: &str = "buildkit.toml";

/// Top-level configuration (TOML).
///
/// Every field has a default, so an absent file reproduces the stock
/// release and workflow behavior for the PBR Viewer project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildkitConfig {
    pub release: ReleaseConfig,
    pub workflow: WorkflowConfig,
}

/// Settings for the `release` tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// CMake build tree, wiped before every release build.
    pub build_dir: PathBuf,
    /// Final output directory, wiped before every release build.
    pub output_dir: PathBuf,
    /// Static asset tree copied next to the executable.
    pub assets_dir: PathBuf,
    /// Program used for both the generation and compilation steps.
    pub cmake: String,
    /// Appended verbatim to `cmake ..`.
    pub generate_flags: String,
    /// Appended verbatim to `cmake --build .`.
    pub build_flags: String,
    /// Executable locations to probe after building, in priority order.
    pub executables: Vec<ExecutableCandidate>,
    /// Kill a CMake invocation after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutableCandidate {
    /// Path relative to the project root.
    pub path: PathBuf,
    /// File name used inside the output directory.
    pub output_name: String,
}

impl ExecutableCandidate {
    pub fn new(path: impl Into<PathBuf>, output_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            output_name: output_name.into(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            output_dir: PathBuf::from("binary"),
            assets_dir: PathBuf::from("assets"),
            cmake: "cmake".to_string(),
            generate_flags: "-DCMAKE_BUILD_TYPE=Release".to_string(),
            build_flags: "-j8".to_string(),
            executables: vec![
                // clang on Windows
                ExecutableCandidate::new("build/PBRV.exe", "PBRV.exe"),
                // MSVC on Windows
                ExecutableCandidate::new("build/Debug/PBRV.exe", "PBRV.exe"),
                // Linux and Unix
                ExecutableCandidate::new("build/PBRV", "PBRV"),
            ],
            command_timeout_secs: None,
        }
    }
}

impl ReleaseConfig {
    pub fn validate(&self) -> Result<()> {
        require_relative_dir("release.build_dir", &self.build_dir)?;
        require_relative_dir("release.output_dir", &self.output_dir)?;
        require_relative_dir("release.assets_dir", &self.assets_dir)?;
        if self.build_dir == self.output_dir {
            return Err(anyhow!(
                "release.build_dir and release.output_dir must differ"
            ));
        }
        if self.cmake.trim().is_empty() {
            return Err(anyhow!("release.cmake must be non-empty"));
        }
        if self.executables.is_empty() {
            return Err(anyhow!("release.executables must list at least one candidate"));
        }
        for candidate in &self.executables {
            if candidate.path.as_os_str().is_empty() {
                return Err(anyhow!("release.executables entries need a path"));
            }
            let name = candidate.output_name.as_str();
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(anyhow!(
                    "release.executables output_name {:?} must be a plain file name",
                    name
                ));
            }
        }
        validate_timeout("release.command_timeout_secs", self.command_timeout_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings for the `workflow` tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Project name shown by the workflow console.
    pub project: String,
    /// How often watched files are polled; also the trigger batching window.
    pub poll_interval_ms: u64,
    /// Kill a shell step after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    pub tasks: Vec<TaskConfig>,
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskConfig {
    pub name: String,
    pub steps: Vec<StepConfig>,
}

/// One step of a configured task.
///
/// In TOML: `{ shell = "..." }`, `{ ensure_dir = "build" }`,
/// `{ refresh_copy = { from = "assets", to = "build/assets" } }` or
/// `{ task = "build" }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    /// Shell command run from the project root.
    Shell(String),
    /// Create a directory (relative to the project root) if missing.
    EnsureDir(PathBuf),
    /// Replace `to` with a fresh copy of `from`.
    RefreshCopy { from: PathBuf, to: PathBuf },
    /// Dispatch another task by name.
    Task(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerConfig {
    pub name: String,
    /// Files, relative to the project root, whose modification fires the trigger.
    pub watch: Vec<PathBuf>,
    /// Tasks to run, in order, when the trigger fires.
    pub tasks: Vec<String>,
}

const GENERATE_COMMAND: &str = "cd build && cmake .. -G Ninja -D CMAKE_C_COMPILER=clang -D CMAKE_CXX_COMPILER=clang++ -D CMAKE_EXPORT_COMPILE_COMMANDS=ON";
const BUILD_COMMAND: &str = "cd build && cmake --build .";
#[cfg(windows)]
const RUN_COMMAND: &str = "cd build && .\\PBR-Viewer.exe";
#[cfg(not(windows))]
const RUN_COMMAND: &str = "cd build && ./PBR-Viewer";

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            project: "PBR Viewer".to_string(),
            poll_interval_ms: 100,
            command_timeout_secs: None,
            tasks: vec![
                TaskConfig {
                    name: "generate".to_string(),
                    steps: vec![
                        StepConfig::EnsureDir(PathBuf::from("build")),
                        StepConfig::Shell(GENERATE_COMMAND.to_string()),
                    ],
                },
                TaskConfig {
                    name: "build".to_string(),
                    steps: vec![
                        StepConfig::Shell(BUILD_COMMAND.to_string()),
                        StepConfig::RefreshCopy {
                            from: PathBuf::from("assets"),
                            to: PathBuf::from("build/assets"),
                        },
                    ],
                },
                TaskConfig {
                    name: "run".to_string(),
                    steps: vec![StepConfig::Shell(RUN_COMMAND.to_string())],
                },
                TaskConfig {
                    name: "br".to_string(),
                    steps: vec![
                        StepConfig::Task("build".to_string()),
                        StepConfig::Task("run".to_string()),
                    ],
                },
            ],
            triggers: vec![TriggerConfig {
                name: "cmake-generate-support".to_string(),
                watch: vec![
                    PathBuf::from("CMakeLists.txt"),
                    PathBuf::from("thirdparty/CMakeLists.txt"),
                ],
                tasks: vec!["generate".to_string()],
            }],
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(anyhow!("workflow.project must be non-empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("workflow.poll_interval_ms must be > 0"));
        }
        validate_timeout("workflow.command_timeout_secs", self.command_timeout_secs)?;

        let mut names = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(anyhow!("workflow task names must be non-empty"));
            }
            if !names.insert(task.name.as_str()) {
                return Err(anyhow!("duplicate workflow task {:?}", task.name));
            }
            if task.steps.is_empty() {
                return Err(anyhow!("workflow task {:?} has no steps", task.name));
            }
        }
        for task in &self.tasks {
            for step in &task.steps {
                if let StepConfig::Task(target) = step
                    && !names.contains(target.as_str())
                {
                    return Err(anyhow!(
                        "workflow task {:?} refers to unknown task {:?}",
                        task.name,
                        target
                    ));
                }
            }
        }
        for trigger in &self.triggers {
            if trigger.name.trim().is_empty() {
                return Err(anyhow!("workflow trigger names must be non-empty"));
            }
            if trigger.watch.is_empty() {
                return Err(anyhow!(
                    "workflow trigger {:?} watches no files",
                    trigger.name
                ));
            }
            for task in &trigger.tasks {
                if !names.contains(task.as_str()) {
                    return Err(anyhow!(
                        "workflow trigger {:?} refers to unknown task {:?}",
                        trigger.name,
                        task
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl BuildkitConfig {
    pub fn validate(&self) -> Result<()> {
        self.release.validate()?;
        self.workflow.validate()
    }
}

fn require_relative_dir(field: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(anyhow!("{field} must be non-empty"));
    }
    // These directories get wiped; keep them inside the project root.
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(anyhow!(
            "{field} must be a relative path inside the project ({})",
            path.display()
        ));
    }
    Ok(())
}

fn validate_timeout(field: &str, secs: Option<u64>) -> Result<()> {
    if secs == Some(0) {
        return Err(anyhow!("{field} must be > 0 when set"));
    }
    Ok(())
}

/// Resolve the config path: explicit override, else `buildkit.toml` under `root`.
pub fn config_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => root.join(CONFIG_FILE_NAME),
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BuildkitConfig::default()`.
pub fn load_config(path: &Path) -> Result<BuildkitConfig> {
    if !path.exists() {
        let cfg = BuildkitConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BuildkitConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BuildkitConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, BuildkitConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        let mut cfg = BuildkitConfig::default();
        cfg.release.command_timeout_secs = Some(600);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn default_release_flags_match_stock_build() {
        let cfg = ReleaseConfig::default();
        assert_eq!(cfg.generate_flags, "-DCMAKE_BUILD_TYPE=Release");
        assert_eq!(cfg.build_flags, "-j8");
        let paths: Vec<&Path> = cfg.executables.iter().map(|c| c.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("build/PBRV.exe"),
                Path::new("build/Debug/PBRV.exe"),
                Path::new("build/PBRV"),
            ]
        );
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[release]\nbuild_flags = \"-j2\"\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.release.build_flags, "-j2");
        assert_eq!(cfg.release.generate_flags, "-DCMAKE_BUILD_TYPE=Release");
        assert_eq!(cfg.workflow, WorkflowConfig::default());
    }

    #[test]
    fn parses_inline_step_tables() {
        let raw = r#"
[workflow]
project = "Demo"
triggers = []

[[workflow.tasks]]
name = "prepare"
steps = [
  { ensure_dir = "out" },
  { refresh_copy = { from = "data", to = "out/data" } },
  { shell = "echo ready" },
]

[[workflow.tasks]]
name = "all"
steps = [{ task = "prepare" }]
"#;
        let cfg: BuildkitConfig = toml::from_str(raw).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.workflow.tasks.len(), 2);
        assert_eq!(
            cfg.workflow.tasks[0].steps,
            vec![
                StepConfig::EnsureDir(PathBuf::from("out")),
                StepConfig::RefreshCopy {
                    from: PathBuf::from("data"),
                    to: PathBuf::from("out/data"),
                },
                StepConfig::Shell("echo ready".to_string()),
            ]
        );
        assert_eq!(
            cfg.workflow.tasks[1].steps,
            vec![StepConfig::Task("prepare".to_string())]
        );
        assert!(cfg.workflow.triggers.is_empty());
    }

    #[test]
    fn rejects_dangling_task_reference() {
        let mut cfg = WorkflowConfig::default();
        cfg.triggers[0].tasks = vec!["regenerate".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown task"));
    }

    #[test]
    fn rejects_duplicate_task_names() {
        let mut cfg = WorkflowConfig::default();
        let dup = cfg.tasks[0].clone();
        cfg.tasks.push(dup);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_output_dir_outside_project() {
        let mut cfg = ReleaseConfig::default();
        cfg.output_dir = PathBuf::from("../elsewhere");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("relative path"));
    }

    #[test]
    fn rejects_output_name_with_separator() {
        let mut cfg = ReleaseConfig::default();
        cfg.executables[0].output_name = "bin/PBRV.exe".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("plain file name"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut cfg = WorkflowConfig::default();
        cfg.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_path_prefers_explicit_override() {
        let root = Path::new("/project");
        assert_eq!(
            config_path(root, None),
            PathBuf::from("/project/buildkit.toml")
        );
        assert_eq!(
            config_path(root, Some(Path::new("/etc/custom.toml"))),
            PathBuf::from("/etc/custom.toml")
        );
    }
}
