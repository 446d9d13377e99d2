//! Trigger matching: which tasks a batch of changed files should run.

use std::path::{Path, PathBuf};

/// Runs `tasks` when any file in `watch` (relative to the project root) changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub watch: Vec<PathBuf>,
    pub tasks: Vec<String>,
}

impl Trigger {
    pub fn matches(&self, root: &Path, changed: &Path) -> bool {
        self.watch.iter().any(|watched| root.join(watched) == changed)
    }
}

/// Result of matching one batch of file changes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Fired trigger names, in registration order.
    pub fired: Vec<String>,
    /// Tasks to run, in order, each at most once.
    pub tasks: Vec<String>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Match a batch of changed paths against `triggers`.
///
/// A trigger fires at most once per batch no matter how many of its files
/// changed, and a task named by several fired triggers runs once.
pub fn plan_dispatch(triggers: &[Trigger], root: &Path, changed: &[PathBuf]) -> Dispatch {
    let mut dispatch = Dispatch::default();
    for trigger in triggers {
        if !changed.iter().any(|path| trigger.matches(root, path)) {
            continue;
        }
        dispatch.fired.push(trigger.name.clone());
        for task in &trigger.tasks {
            if !dispatch.tasks.contains(task) {
                dispatch.tasks.push(task.clone());
            }
        }
    }
    dispatch
}

/// Directories to poll: the parent of every watched file, deduplicated.
///
/// Parents are watched instead of the files so editors that save by
/// replacing the file are still seen.
pub fn watch_dirs(triggers: &[Trigger], root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for watched in triggers.iter().flat_map(|trigger| &trigger.watch) {
        let dir = match root.join(watched).parent() {
            Some(parent) => parent.to_path_buf(),
            None => root.to_path_buf(),
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmake_trigger() -> Trigger {
        Trigger {
            name: "cmake-generate-support".to_string(),
            watch: vec![
                PathBuf::from("CMakeLists.txt"),
                PathBuf::from("thirdparty/CMakeLists.txt"),
            ],
            tasks: vec!["generate".to_string()],
        }
    }

    #[test]
    fn either_descriptor_fires_generate() {
        let root = Path::new("/project");
        let triggers = vec![cmake_trigger()];

        for changed in ["/project/CMakeLists.txt", "/project/thirdparty/CMakeLists.txt"] {
            let dispatch = plan_dispatch(&triggers, root, &[PathBuf::from(changed)]);
            assert_eq!(dispatch.fired, vec!["cmake-generate-support"]);
            assert_eq!(dispatch.tasks, vec!["generate"]);
        }
    }

    #[test]
    fn both_descriptors_in_one_batch_fire_once() {
        let root = Path::new("/project");
        let changed = vec![
            PathBuf::from("/project/CMakeLists.txt"),
            PathBuf::from("/project/thirdparty/CMakeLists.txt"),
            PathBuf::from("/project/CMakeLists.txt"),
        ];

        let dispatch = plan_dispatch(&[cmake_trigger()], root, &changed);

        assert_eq!(dispatch.fired.len(), 1);
        assert_eq!(dispatch.tasks, vec!["generate"]);
    }

    #[test]
    fn unrelated_files_fire_nothing() {
        let root = Path::new("/project");
        let changed = vec![
            PathBuf::from("/project/src/main.cxx"),
            PathBuf::from("/project/thirdparty/bmx/CMakeLists.txt"),
            PathBuf::from("/elsewhere/CMakeLists.txt"),
        ];

        let dispatch = plan_dispatch(&[cmake_trigger()], root, &changed);

        assert!(dispatch.is_empty());
        assert!(dispatch.tasks.is_empty());
    }

    #[test]
    fn shared_tasks_run_once_in_trigger_order() {
        let root = Path::new("/project");
        let triggers = vec![
            cmake_trigger(),
            Trigger {
                name: "shaders".to_string(),
                watch: vec![PathBuf::from("assets/shaders/pbr.frag")],
                tasks: vec!["generate".to_string(), "build".to_string()],
            },
        ];
        let changed = vec![
            PathBuf::from("/project/assets/shaders/pbr.frag"),
            PathBuf::from("/project/CMakeLists.txt"),
        ];

        let dispatch = plan_dispatch(&triggers, root, &changed);

        assert_eq!(dispatch.fired, vec!["cmake-generate-support", "shaders"]);
        assert_eq!(dispatch.tasks, vec!["generate", "build"]);
    }

    #[test]
    fn watch_dirs_are_parents_without_duplicates() {
        let root = Path::new("/project");
        let mut second = cmake_trigger();
        second.name = "again".to_string();

        let dirs = watch_dirs(&[cmake_trigger(), second], root);

        assert_eq!(
            dirs,
            vec![PathBuf::from("/project"), PathBuf::from("/project/thirdparty")]
        );
    }
}
