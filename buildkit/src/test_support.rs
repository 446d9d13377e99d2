//! Test-only helpers: a recording shell and throwaway project directories.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::io::shell::{Shell, ShellOutcome, ShellRequest};

type Hook = Box<dyn Fn(&ShellRequest) -> Result<()>>;

/// Shell that records every request instead of spawning a process.
///
/// Exit codes are consumed from a queue (missing entries mean success) and an
/// optional hook can fake side effects such as a compiler writing a binary.
#[derive(Default)]
pub struct RecordingShell {
    requests: RefCell<Vec<ShellRequest>>,
    exit_codes: RefCell<VecDeque<i32>>,
    hook: Option<Hook>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue exit codes for the next invocations, in order.
    pub fn with_exit_codes(self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.exit_codes.borrow_mut().extend(codes);
        self
    }

    /// Run `hook` for every request before reporting the outcome.
    pub fn with_hook(mut self, hook: impl Fn(&ShellRequest) -> Result<()> + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.borrow().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.command.clone())
            .collect()
    }
}

impl Shell for RecordingShell {
    fn run(&self, request: &ShellRequest) -> Result<ShellOutcome> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(hook) = &self.hook {
            hook(request)?;
        }
        let code = self.exit_codes.borrow_mut().pop_front().unwrap_or(0);
        Ok(ShellOutcome {
            code: Some(code),
            timed_out: false,
        })
    }
}

/// A temporary project root with a small `assets` tree.
pub struct TestProject {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().to_path_buf();
        let project = Self { _temp: temp, root };
        project.write("assets/shaders/pbr.vert", "#version 450\n");
        project.write("assets/shaders/pbr.frag", "#version 450\n");
        project.write("assets/textures/brdf_lut.png", "png");
        project.write("CMakeLists.txt", "project(PBRV)\n");
        project.write("thirdparty/CMakeLists.txt", "add_subdirectory(bmx)\n");
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `contents` to a path relative to the project root.
    pub fn write(&self, rel: &str, contents: &str) {
        write_file(&self.root.join(rel), contents);
    }
}

/// Write a file, creating parent directories. Panics on failure.
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

/// Assert that two directory trees contain the same relative files and bytes.
pub fn assert_same_tree(expected: &Path, actual: &Path) {
    assert_eq!(snapshot(expected), snapshot(actual));
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry.expect("walk tree");
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .expect("relative path")
                .to_path_buf();
            files.insert(rel, fs::read(entry.path()).expect("read file"));
        }
    }
    files
}
