//! I/O helpers for the build tools.

pub mod config;
pub mod fs;
pub mod process;
pub mod shell;
