//! scaffold-testkit: end-to-end test support for operator scaffolding
//!
//! The core is [`file_patcher`]: verified, atomic text edits on generated
//! project files that fail loudly when their target is missing. Around it sit
//! thin wrappers for the cluster tooling the suites shell out to, and the
//! per-run [`TestContext`] that tracks which prerequisites a run installed.

pub mod capability;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod diff_formatter;
pub mod error;
pub mod error_helpers;
pub mod file_patcher;
pub mod logger;
pub mod prerequisites;

// Re-export commonly used types for convenience
pub use capability::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use context::{PrerequisiteState, TestContext};
pub use error::{PatchError, ToolError};
pub use file_patcher::{
    prepend_to_file, replace_in_file, replace_regex_in_file, uncomment_code, Patch, PatchPreview,
};
pub use prerequisites::{install_prerequisites, uninstall_prerequisites};
