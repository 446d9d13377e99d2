//! Shared plumbing for the project build tools.
//!
//! Both entry points (`release` and `workflow`) are thin orchestration over
//! CMake and the filesystem. This crate holds what they have in common:
//!
//! - **[`io`]**: Side-effecting operations (configuration, shell commands,
//!   directory and tree copies). The [`io::shell::Shell`] trait isolates
//!   subprocesses so callers can be tested without spawning anything.
//! - **[`logging`]** and **[`exit_codes`]**: ambient CLI conventions.

pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
