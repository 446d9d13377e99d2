//! Task-based development workflow for a CMake project.
//!
//! - **[`engine`]**: The [`engine::Engine`] registration/dispatch surface and
//!   the in-process [`engine::LocalEngine`].
//! - **[`trigger`]**: Pure matching of changed files to tasks.
//! - **[`watch`]**: The blocking loop behind `launch` (polling watcher +
//!   stdin console).
//! - **[`project`]**: Registers the configured workflow (PBR Viewer by default).

pub mod console;
pub mod engine;
pub mod project;
#[cfg(test)]
mod test_support;
pub mod trigger;
pub mod watch;
