//! Error helper functions for creating actionable error messages

use std::io;
use std::path::Path;

use crate::error::{PatchError, ToolError};

/// Check if an IO error is a permission denied error
pub fn is_permission_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Check if an IO error is a "not found" error
pub fn is_not_found(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
}

/// Create an enhanced error message for file permission issues
pub fn permission_error(path: &Path) -> String {
    let parent_dir = path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());

    format!(
        "Permission denied when patching '{}'\n\n\
         Possible fixes:\n\
         1. Check file permissions: ls -l '{}'\n\
         2. The directory must be writable for the atomic rename: chmod u+w '{}'",
        path.display(),
        path.display(),
        parent_dir
    )
}

/// Create an enhanced error message for file not found issues
pub fn not_found_error(path: &Path) -> String {
    format!(
        "File not found: '{}'\n\n\
         Possible fixes:\n\
         1. Check the file path is correct\n\
         2. Make sure the project was scaffolded before patching it",
        path.display()
    )
}

/// Human-facing description of a patch failure, with hints where they help
pub fn describe_patch_error(err: &PatchError) -> String {
    match err {
        PatchError::Io { path, source } if is_permission_denied(source) => permission_error(path),
        PatchError::Io { path, source } if is_not_found(source) => not_found_error(path),
        PatchError::NoEffectiveChange { .. } => format!(
            "{}\n\nNote: a substitution that rewrites its match to identical text is also reported this way.",
            err
        ),
        _ => err.to_string(),
    }
}

/// Human-facing description of a tool failure
pub fn describe_tool_error(err: &ToolError) -> String {
    match err {
        ToolError::Patch(inner) => describe_patch_error(inner),
        ToolError::ToolNotFound { tool } => format!(
            "{}\n\n\
             Possible fixes:\n\
             1. Install {} and make sure it is on PATH\n\
             2. Point the [tools] section of the config at the right executable",
            err, tool
        ),
        _ => err.to_string(),
    }
}
