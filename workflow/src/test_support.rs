//! Test-only engine that records registrations instead of running anything.

use std::path::PathBuf;

use anyhow::Result;

use crate::engine::{Engine, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Project(String),
    Task { name: String, steps: Vec<String> },
    Trigger {
        name: String,
        watch: Vec<PathBuf>,
        tasks: Vec<String>,
    },
}

/// Records every call; steps are kept as their display strings.
#[derive(Default)]
pub struct RecordingEngine {
    pub registrations: Vec<Registration>,
    pub launched: bool,
}

impl Engine for RecordingEngine {
    fn new_project(&mut self, name: &str) {
        self.registrations
            .push(Registration::Project(name.to_string()));
    }

    fn add_task(&mut self, name: &str, steps: Vec<Step>) -> Result<()> {
        self.registrations.push(Registration::Task {
            name: name.to_string(),
            steps: steps.iter().map(|step| step.to_string()).collect(),
        });
        Ok(())
    }

    fn add_trigger(&mut self, name: &str, watched: Vec<PathBuf>, tasks: Vec<String>) -> Result<()> {
        self.registrations.push(Registration::Trigger {
            name: name.to_string(),
            watch: watched,
            tasks,
        });
        Ok(())
    }

    fn do_task(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        self.launched = true;
        Ok(())
    }
}
