//! Stable exit codes for the build tool CLIs.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, I/O errors or other errors.
pub const INVALID: i32 = 1;
/// `release` found no executable in the build directory after building.
pub const MISSING_EXECUTABLE: i32 = 2;
/// A subprocess exited non-zero or timed out.
pub const COMMAND_FAILED: i32 = 3;
